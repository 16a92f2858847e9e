//! Pluggable per-vertex payload types.
//!
//! A model stores opaque [`CustomData`] values in its slots. To read a model
//! back, the payload's type name must map to a [`CustomDataType`] in the
//! process-wide registry, which supplies the binary and text decoders.
//! Payload crates register themselves once, before any model holding their
//! payload is read.

use std::any::Any;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::codec::TextReader;
use crate::error::MeshError;

/// Opaque payload stored at one vertex/layer slot.
pub trait CustomData: Send + Sync + core::fmt::Debug {
    /// Registered type name of this payload.
    fn data_type(&self) -> &'static str;

    /// Encode this payload.
    fn write_binary(&self, out: &mut dyn Write) -> Result<(), MeshError>;

    /// Encode this payload as text lines.
    fn write_text(&self, out: &mut dyn Write) -> Result<(), MeshError>;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a payload.
pub type CustomDataRef = Arc<dyn CustomData>;

/// Binary decoder for a payload type.
pub type BinaryReader = fn(&mut dyn Read) -> Result<CustomDataRef, MeshError>;

/// Text decoder for a payload type.
pub type TextDecoder = fn(&mut TextReader<'_>) -> Result<CustomDataRef, MeshError>;

/// Descriptor of a registered payload type.
#[derive(Debug, Clone, Copy)]
pub struct CustomDataType {
    /// Type name, as returned by [`CustomData::data_type`].
    pub name: &'static str,
    /// Decoder for [`CustomData::write_binary`] output.
    pub read_binary: BinaryReader,
    /// Decoder for [`CustomData::write_text`] output.
    pub read_text: TextDecoder,
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, CustomDataType>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register (or replace) a payload type.
pub fn register_custom_data_type(descriptor: CustomDataType) {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if registry.insert(descriptor.name, descriptor).is_none() {
        debug!(data_type = descriptor.name, "Custom data type registered");
    }
}

/// Look up a registered payload type by name.
pub fn custom_data_type(name: &str) -> Option<CustomDataType> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .copied()
}

/// Look up a payload type, failing if it was never registered.
pub fn require_custom_data_type(name: &str) -> Result<CustomDataType, MeshError> {
    custom_data_type(name).ok_or_else(|| MeshError::UnregisteredDataType(name.to_owned()))
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn registered_type_is_found() {
        test_payload::register();
        let descriptor = require_custom_data_type(test_payload::NAME).unwrap();
        assert_eq!(descriptor.name, test_payload::NAME);

        let mut buf = Vec::new();
        test_payload::Scalar(2.5).write_binary(&mut buf).unwrap();
        let back = (descriptor.read_binary)(&mut buf.as_slice()).unwrap();
        let back = back.as_any().downcast_ref::<test_payload::Scalar>().unwrap();
        assert_eq!(back, &test_payload::Scalar(2.5));
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(matches!(
            require_custom_data_type("NoSuchPayload"),
            Err(MeshError::UnregisteredDataType(name)) if name == "NoSuchPayload"
        ));
    }
}
