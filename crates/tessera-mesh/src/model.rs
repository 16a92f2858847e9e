//! A tessellated grid with named depth layers and one payload slot per
//! vertex and layer.
//!
//! Slots are stored vertex-major (`vertex * layers + layer`), so a contiguous
//! vertex range owns a contiguous slice of slots. [`GeoModel::split_vertex_ranges`]
//! hands out disjoint mutable views, which is how parallel writers fill a
//! model without locking.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::{self, TextReader};
use crate::custom::{CustomDataRef, require_custom_data_type};
use crate::error::MeshError;
use crate::grid::TessellatedGrid;

/// Magic prefix of a binary model file.
const MAGIC: &[u8; 8] = b"TESSMODL";

/// Header line of a text model file.
const TEXT_HEADER: &str = "tessera-model";

/// Model file format version.
const VERSION: u32 = 1;

/// A named depth layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Layer name, e.g. `CRUST`.
    pub name: String,
    /// Depth of the layer's center below the surface.
    pub center_depth_km: f64,
}

impl Layer {
    /// Create a layer.
    pub fn new(name: impl Into<String>, center_depth_km: f64) -> Self {
        Self {
            name: name.into(),
            center_depth_km,
        }
    }
}

/// Descriptive metadata carried by a model file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    /// Free-text description.
    pub description: String,
    /// Depth layers, outermost first.
    pub layers: Vec<Layer>,
    /// Registered type name of every payload in the model.
    pub data_type: String,
}

/// Grid plus layered payload slots.
#[derive(Debug, Clone)]
pub struct GeoModel {
    grid: Arc<TessellatedGrid>,
    metadata: ModelMetadata,
    slots: Vec<Option<CustomDataRef>>,
}

impl GeoModel {
    /// Create a model with every slot empty.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidTessellation`] when `metadata` has no layers.
    pub fn new(grid: Arc<TessellatedGrid>, metadata: ModelMetadata) -> Result<Self, MeshError> {
        if metadata.layers.is_empty() {
            return Err(MeshError::InvalidTessellation(String::from("model has no layers")));
        }
        let count = grid.vertex_count().saturating_mul(metadata.layers.len());
        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, || None);
        Ok(Self { grid, metadata, slots })
    }

    /// The underlying grid.
    pub fn grid(&self) -> &Arc<TessellatedGrid> {
        &self.grid
    }

    /// Model metadata.
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.grid.vertex_count()
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.metadata.layers.len()
    }

    /// One layer's description.
    pub fn layer(&self, layer: usize) -> Option<&Layer> {
        self.metadata.layers.get(layer)
    }

    fn slot_index(&self, vertex: usize, layer: usize) -> Result<usize, MeshError> {
        let layers = self.layer_count();
        if vertex >= self.vertex_count() || layer >= layers {
            return Err(MeshError::IndexOutOfRange { vertex, layer });
        }
        vertex
            .checked_mul(layers)
            .and_then(|base| base.checked_add(layer))
            .ok_or(MeshError::IndexOutOfRange { vertex, layer })
    }

    /// Payload at a slot; `None` if the slot is empty or out of range.
    pub fn payload(&self, vertex: usize, layer: usize) -> Option<&CustomDataRef> {
        self.slot_index(vertex, layer)
            .ok()
            .and_then(|idx| self.slots.get(idx))
            .and_then(Option::as_ref)
    }

    /// Store a payload at one slot.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::IndexOutOfRange`] or [`MeshError::DataTypeMismatch`].
    pub fn set_payload(&mut self, vertex: usize, layer: usize, data: CustomDataRef) -> Result<(), MeshError> {
        check_data_type(&self.metadata.data_type, &data)?;
        let idx = self.slot_index(vertex, layer)?;
        let slot = self
            .slots
            .get_mut(idx)
            .ok_or(MeshError::IndexOutOfRange { vertex, layer })?;
        *slot = Some(data);
        Ok(())
    }

    /// Split the vertices into consecutive ranges of the given sizes and
    /// return a disjoint mutable view over each range's slots.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Format`] unless `sizes` sums to the vertex count.
    pub fn split_vertex_ranges(&mut self, sizes: &[usize]) -> Result<Vec<VertexRangeMut<'_>>, MeshError> {
        let total = sizes.iter().try_fold(0usize, |acc, s| acc.checked_add(*s));
        if total != Some(self.vertex_count()) {
            return Err(MeshError::Format(format!(
                "vertex shares {sizes:?} do not cover {} vertices",
                self.vertex_count()
            )));
        }
        let layers = self.layer_count();
        let data_type = self.metadata.data_type.as_str();
        let mut rest: &mut [Option<CustomDataRef>] = &mut self.slots;
        let mut first = 0usize;
        let mut views = Vec::with_capacity(sizes.len());
        for &size in sizes {
            let len = size.saturating_mul(layers);
            let (head, tail) = rest.split_at_mut(len.min(rest.len()));
            rest = tail;
            let end = first.saturating_add(size);
            views.push(VertexRangeMut {
                vertices: first..end,
                layers,
                data_type,
                slots: head,
            });
            first = end;
        }
        Ok(views)
    }

    // -----------------------------------------------------------------------
    // Binary I/O
    // -----------------------------------------------------------------------

    /// Write the whole model in binary form.
    pub fn write_binary(&self, out: &mut dyn Write) -> Result<(), MeshError> {
        out.write_all(MAGIC)?;
        codec::write_u32(out, VERSION)?;
        codec::write_str(out, &self.grid.grid_id())?;
        self.grid.write_binary(out)?;
        codec::write_str(out, &self.metadata.description)?;
        codec::write_count(out, self.metadata.layers.len())?;
        for layer in &self.metadata.layers {
            codec::write_str(out, &layer.name)?;
            codec::write_f64(out, layer.center_depth_km)?;
        }
        codec::write_str(out, &self.metadata.data_type)?;
        for slot in &self.slots {
            match slot {
                Some(data) => {
                    codec::write_u8(out, 1)?;
                    data.write_binary(out)?;
                }
                None => codec::write_u8(out, 0)?,
            }
        }
        Ok(())
    }

    /// Read a model written by [`write_binary`](Self::write_binary).
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, malformed content, or a payload type that has not
    /// been registered.
    pub fn read_binary(input: &mut dyn Read) -> Result<Self, MeshError> {
        codec::expect_magic(input, MAGIC, "model")?;
        let version = codec::read_u32(input)?;
        if version != VERSION {
            return Err(MeshError::UnsupportedVersion {
                what: "model",
                found: version,
                supported: VERSION,
            });
        }
        let grid_id = codec::read_str(input)?;
        let grid = TessellatedGrid::read_binary(input)?;
        verify_grid_id(&grid, grid_id)?;
        let description = codec::read_str(input)?;
        let n_layers = codec::read_count(input)?;
        let mut layers = Vec::with_capacity(n_layers.min(1024));
        for _ in 0..n_layers {
            let name = codec::read_str(input)?;
            layers.push(Layer::new(name, codec::read_f64(input)?));
        }
        let data_type = codec::read_str(input)?;
        let descriptor = require_custom_data_type(&data_type)?;

        let mut model = Self::new(
            Arc::new(grid),
            ModelMetadata {
                description,
                layers,
                data_type,
            },
        )?;
        for slot in &mut model.slots {
            *slot = match codec::read_u8(input)? {
                0 => None,
                1 => Some((descriptor.read_binary)(input)?),
                flag => return Err(MeshError::Format(format!("bad slot flag {flag}"))),
            };
        }
        Ok(model)
    }

    // -----------------------------------------------------------------------
    // Text I/O
    // -----------------------------------------------------------------------

    /// Write the whole model as text.
    pub fn write_text(&self, out: &mut dyn Write) -> Result<(), MeshError> {
        writeln!(out, "{TEXT_HEADER} {VERSION}")?;
        writeln!(out, "grid {}", self.grid.grid_id())?;
        self.grid.write_text(out)?;
        writeln!(out, "description {}", self.metadata.description.replace('\n', " "))?;
        writeln!(out, "layers {}", self.metadata.layers.len())?;
        for layer in &self.metadata.layers {
            writeln!(out, "{} {}", layer.name, layer.center_depth_km)?;
        }
        writeln!(out, "datatype {}", self.metadata.data_type)?;
        for slot in &self.slots {
            match slot {
                Some(data) => {
                    writeln!(out, "slot")?;
                    data.write_text(out)?;
                }
                None => writeln!(out, "empty")?,
            }
        }
        Ok(())
    }

    /// Read a model written by [`write_text`](Self::write_text).
    pub fn read_text(input: &mut dyn Read) -> Result<Self, MeshError> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        let mut reader = TextReader::new(&text);

        let version: u32 = {
            let rest = reader.keyword(TEXT_HEADER)?;
            reader.parse(rest, "version")?
        };
        if version != VERSION {
            return Err(MeshError::UnsupportedVersion {
                what: "model",
                found: version,
                supported: VERSION,
            });
        }
        let grid_id = reader.keyword("grid")?.to_owned();
        let grid = TessellatedGrid::read_text(&mut reader)?;
        verify_grid_id(&grid, grid_id)?;
        let description = reader.keyword("description")?.to_owned();
        let n_layers: usize = {
            let rest = reader.keyword("layers")?;
            reader.parse(rest, "layer count")?
        };
        let mut layers = Vec::with_capacity(n_layers.min(1024));
        for _ in 0..n_layers {
            let line = reader.next_line()?;
            let (name, depth) = line
                .rsplit_once(' ')
                .ok_or_else(|| reader.error("expected '<name> <depth>'"))?;
            layers.push(Layer::new(name, reader.parse(depth, "layer depth")?));
        }
        let data_type = reader.keyword("datatype")?.to_owned();
        let descriptor = require_custom_data_type(&data_type)?;

        let mut model = Self::new(
            Arc::new(grid),
            ModelMetadata {
                description,
                layers,
                data_type,
            },
        )?;
        for slot in &mut model.slots {
            *slot = match reader.next_line()? {
                "empty" => None,
                "slot" => Some((descriptor.read_text)(&mut reader)?),
                other => return Err(reader.error(format!("expected slot marker, found '{other}'"))),
            };
        }
        Ok(model)
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Save to a file. `.txt` and `.ascii` extensions select the text form.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MeshError> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        if is_text_path(path) {
            self.write_text(&mut out)?;
        } else {
            self.write_binary(&mut out)?;
        }
        out.flush()?;
        info!(
            path = %path.display(),
            vertices = self.vertex_count(),
            layers = self.layer_count(),
            "Model saved"
        );
        Ok(())
    }

    /// Load from a file written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MeshError> {
        let path = path.as_ref();
        let mut input = BufReader::new(File::open(path)?);
        let model = if is_text_path(path) {
            Self::read_text(&mut input)?
        } else {
            Self::read_binary(&mut input)?
        };
        debug!(path = %path.display(), vertices = model.vertex_count(), "Model loaded");
        Ok(model)
    }
}

/// Exclusive view over the slots of one contiguous vertex range.
#[derive(Debug)]
pub struct VertexRangeMut<'a> {
    vertices: Range<usize>,
    layers: usize,
    data_type: &'a str,
    slots: &'a mut [Option<CustomDataRef>],
}

impl VertexRangeMut<'_> {
    /// Absolute vertex indices covered by this view.
    pub fn vertices(&self) -> Range<usize> {
        self.vertices.clone()
    }

    /// Number of layers per vertex.
    pub const fn layer_count(&self) -> usize {
        self.layers
    }

    /// Store a payload at an absolute vertex index inside this range.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::IndexOutOfRange`] for a vertex outside the view,
    /// or [`MeshError::DataTypeMismatch`].
    pub fn set_payload(&mut self, vertex: usize, layer: usize, data: CustomDataRef) -> Result<(), MeshError> {
        check_data_type(self.data_type, &data)?;
        let idx = vertex
            .checked_sub(self.vertices.start)
            .filter(|_| self.vertices.contains(&vertex) && layer < self.layers)
            .and_then(|local| local.checked_mul(self.layers))
            .and_then(|base| base.checked_add(layer))
            .ok_or(MeshError::IndexOutOfRange { vertex, layer })?;
        let slot = self
            .slots
            .get_mut(idx)
            .ok_or(MeshError::IndexOutOfRange { vertex, layer })?;
        *slot = Some(data);
        Ok(())
    }
}

fn check_data_type(expected: &str, data: &CustomDataRef) -> Result<(), MeshError> {
    if data.data_type() == expected {
        Ok(())
    } else {
        Err(MeshError::DataTypeMismatch {
            expected: expected.to_owned(),
            found: data.data_type().to_owned(),
        })
    }
}

fn verify_grid_id(grid: &TessellatedGrid, expected: String) -> Result<(), MeshError> {
    let found = grid.grid_id();
    if found == expected {
        Ok(())
    } else {
        Err(MeshError::GridIdMismatch { expected, found })
    }
}

fn is_text_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("ascii"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::custom::test_payload::{self, Scalar};

    fn make_model() -> GeoModel {
        test_payload::register();
        let grid = Arc::new(TessellatedGrid::icosahedral(0).unwrap());
        GeoModel::new(
            grid,
            ModelMetadata {
                description: String::from("test model"),
                layers: vec![Layer::new("CRUST", 15.0), Layer::new("MANTLE", 80.0)],
                data_type: String::from(test_payload::NAME),
            },
        )
        .unwrap()
    }

    fn scalar_at(model: &GeoModel, vertex: usize, layer: usize) -> Option<f64> {
        model
            .payload(vertex, layer)
            .and_then(|p| p.as_any().downcast_ref::<Scalar>())
            .map(|s| s.0)
    }

    // -----------------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------------

    #[test]
    fn new_model_is_empty() {
        let model = make_model();
        assert_eq!(model.vertex_count(), 12);
        assert_eq!(model.layer_count(), 2);
        assert!(model.payload(0, 0).is_none());
        assert!(model.payload(12, 0).is_none());
    }

    #[test]
    fn set_and_get_payload() {
        let mut model = make_model();
        model.set_payload(3, 1, Arc::new(Scalar(9.5))).unwrap();
        assert_eq!(scalar_at(&model, 3, 1), Some(9.5));
        assert_eq!(scalar_at(&model, 3, 0), None);
        assert!(matches!(
            model.set_payload(3, 2, Arc::new(Scalar(1.0))),
            Err(MeshError::IndexOutOfRange { vertex: 3, layer: 2 })
        ));
    }

    #[test]
    fn split_views_are_disjoint() {
        let mut model = make_model();
        {
            let mut views = model.split_vertex_ranges(&[5, 4, 3]).unwrap();
            assert_eq!(views.len(), 3);
            assert_eq!(views[1].vertices(), 5..9);
            for view in &mut views {
                for v in view.vertices() {
                    view.set_payload(v, 0, Arc::new(Scalar(v as f64))).unwrap();
                }
            }
            // A view refuses vertices owned by another view.
            assert!(views[0].set_payload(5, 0, Arc::new(Scalar(0.0))).is_err());
        }
        for v in 0..12 {
            assert_eq!(scalar_at(&model, v, 0), Some(v as f64));
        }
    }

    #[test]
    fn split_must_cover_all_vertices() {
        let mut model = make_model();
        assert!(model.split_vertex_ranges(&[5, 5]).is_err());
    }

    // -----------------------------------------------------------------------
    // I/O
    // -----------------------------------------------------------------------

    #[test]
    fn binary_round_trip() {
        let mut model = make_model();
        model.set_payload(0, 0, Arc::new(Scalar(-0.0))).unwrap();
        model.set_payload(11, 1, Arc::new(Scalar(1.0e-300))).unwrap();
        let mut buf = Vec::new();
        model.write_binary(&mut buf).unwrap();
        let back = GeoModel::read_binary(&mut buf.as_slice()).unwrap();
        assert_eq!(back.metadata(), model.metadata());
        assert_eq!(scalar_at(&back, 0, 0).unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(scalar_at(&back, 11, 1), Some(1.0e-300));
        assert!(back.payload(5, 0).is_none());
    }

    #[test]
    fn text_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        let mut model = make_model();
        model.set_payload(7, 0, Arc::new(Scalar(0.1 + 0.2))).unwrap();
        model.save(&path).unwrap();
        let back = GeoModel::load(&path).unwrap();
        assert_eq!(back.metadata(), model.metadata());
        assert_eq!(scalar_at(&back, 7, 0), Some(0.1 + 0.2));
    }

    #[test]
    fn unregistered_payload_type_fails_to_load() {
        let grid = Arc::new(TessellatedGrid::icosahedral(0).unwrap());
        let model = GeoModel::new(
            grid,
            ModelMetadata {
                description: String::new(),
                layers: vec![Layer::new("CRUST", 15.0)],
                data_type: String::from("Unregistered"),
            },
        )
        .unwrap();
        let mut buf = Vec::new();
        model.write_binary(&mut buf).unwrap();
        assert!(matches!(
            GeoModel::read_binary(&mut buf.as_slice()),
            Err(MeshError::UnregisteredDataType(_))
        ));
    }
}
