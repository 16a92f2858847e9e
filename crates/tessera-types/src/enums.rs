//! Enumeration types shared across the workspace.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

// ---------------------------------------------------------------------------
// Phase types
// ---------------------------------------------------------------------------

/// A seismic, hydroacoustic or infrasound phase label.
///
/// Variant order is the precedence used to break travel-time ties when
/// ordering the phases recorded for one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhaseType {
    // --- Compressional ---
    /// Teleseismic or regional direct P.
    P,
    /// Regional P refracted along the Moho.
    Pn,
    /// Regional crustal P.
    Pg,
    /// P refracted along the Conrad discontinuity.
    Pb,
    /// P reflected from the core-mantle boundary.
    PcP,
    /// P traversing the outer core.
    #[serde(rename = "PKP")]
    Pkp,

    // --- Shear ---
    /// Teleseismic or regional direct S.
    S,
    /// Regional S refracted along the Moho.
    Sn,
    /// Regional crustal S.
    Sg,
    /// S refracted along the Conrad discontinuity.
    Sb,
    /// S reflected from the core-mantle boundary.
    ScS,
    /// Crustal guided shear wave.
    Lg,

    // --- Surface ---
    /// Short-period Rayleigh wave.
    Rg,
    /// Long-period Rayleigh wave.
    #[serde(rename = "LR")]
    Lr,

    // --- Other technologies ---
    /// Infrasound arrival.
    I,
    /// Hydroacoustic arrival.
    H,
}

impl PhaseType {
    /// Every variant, in precedence order.
    pub const ALL: [Self; 16] = [
        Self::P,
        Self::Pn,
        Self::Pg,
        Self::Pb,
        Self::PcP,
        Self::Pkp,
        Self::S,
        Self::Sn,
        Self::Sg,
        Self::Sb,
        Self::ScS,
        Self::Lg,
        Self::Rg,
        Self::Lr,
        Self::I,
        Self::H,
    ];

    /// The conventional IASPEI label for this phase.
    pub const fn label(self) -> &'static str {
        match self {
            Self::P => "P",
            Self::Pn => "Pn",
            Self::Pg => "Pg",
            Self::Pb => "Pb",
            Self::PcP => "PcP",
            Self::Pkp => "PKP",
            Self::S => "S",
            Self::Sn => "Sn",
            Self::Sg => "Sg",
            Self::Sb => "Sb",
            Self::ScS => "ScS",
            Self::Lg => "Lg",
            Self::Rg => "Rg",
            Self::Lr => "LR",
            Self::I => "I",
            Self::H => "H",
        }
    }

    /// Whether this is a body-wave compressional phase.
    pub const fn is_compressional(self) -> bool {
        matches!(
            self,
            Self::P | Self::Pn | Self::Pg | Self::Pb | Self::PcP | Self::Pkp
        )
    }
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PhaseType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|phase| phase.label() == s)
            .ok_or_else(|| TypeError::UnknownPhaseType(s.to_owned()))
    }
}
