//! Tunable parameters of the global-grid associator.

use serde::{Deserialize, Serialize};
use tessera_types::PhaseType;

use crate::error::AssociationError;

/// Association parameters, read from JSON or YAML with camelCase keys.
///
/// Only `sigmaSlowness`, `sigmaTime`, `phases` and `numFirstSta` drive the
/// candidate search and corroboration in this crate; the rest describe the
/// grid the definition was tuned for and travel with it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatorDefinition {
    /// Upper bound on stations kept per grid node.
    #[serde(default = "default_max_stations_per_grid")]
    pub max_stations_per_grid: u32,

    /// Multiplier on the observed slowness uncertainty.
    #[serde(default = "default_sigma")]
    pub sigma_slowness: f64,

    /// Phases a corroborating detection may carry.
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseType>,

    /// Phases predicted when the grid was populated.
    #[serde(default = "default_phases")]
    pub forward_transformation_phases: Vec<PhaseType>,

    /// Minimum belief for a candidate to survive downstream scoring, in `[0, 1]`.
    #[serde(default)]
    pub belief_threshold: f64,

    /// Whether a secondary phase may only associate after its primary did.
    #[serde(default)]
    pub primary_phase_required_for_secondary: bool,

    /// Multiplier on the observed arrival-time uncertainty.
    #[serde(default = "default_sigma")]
    pub sigma_time: f64,

    /// Chi-square acceptance limit for downstream location.
    #[serde(default = "default_chi_limit")]
    pub chi_limit: f64,

    /// Whether beam-point arrivals are held fixed downstream.
    #[serde(default)]
    pub freeze_arrivals_at_beam_points: bool,

    /// Grid cylinder radius the model was populated with, degrees.
    #[serde(default = "default_radius_degrees")]
    pub grid_cylinder_radius_degrees: f64,

    /// Grid layer depth the model was populated with, km.
    #[serde(default = "default_depth_km")]
    pub grid_cylinder_depth_km: f64,

    /// Grid cylinder height the model was populated with, km.
    #[serde(default = "default_height_km")]
    pub grid_cylinder_height_km: f64,

    /// Smallest magnitude the grid was populated to detect.
    #[serde(default = "default_minimum_magnitude")]
    pub minimum_magnitude: f64,

    /// Worker threads for building the first-arrival index.
    #[serde(default = "default_num_first_sta")]
    pub num_first_sta: usize,
}

impl Default for AssociatorDefinition {
    fn default() -> Self {
        Self {
            max_stations_per_grid: default_max_stations_per_grid(),
            sigma_slowness: default_sigma(),
            phases: default_phases(),
            forward_transformation_phases: default_phases(),
            belief_threshold: 0.0,
            primary_phase_required_for_secondary: false,
            sigma_time: default_sigma(),
            chi_limit: default_chi_limit(),
            freeze_arrivals_at_beam_points: false,
            grid_cylinder_radius_degrees: default_radius_degrees(),
            grid_cylinder_depth_km: default_depth_km(),
            grid_cylinder_height_km: default_height_km(),
            minimum_magnitude: default_minimum_magnitude(),
            num_first_sta: default_num_first_sta(),
        }
    }
}

impl AssociatorDefinition {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AssociationError::InvalidParameter`] naming the first
    /// out-of-range field.
    pub fn validate(&self) -> Result<(), AssociationError> {
        non_negative("sigmaSlowness", self.sigma_slowness)?;
        non_negative("sigmaTime", self.sigma_time)?;
        non_negative("chiLimit", self.chi_limit)?;
        non_negative("minimumMagnitude", self.minimum_magnitude)?;
        if !(0.0..=1.0).contains(&self.belief_threshold) {
            return Err(AssociationError::InvalidParameter {
                name: "beliefThreshold",
                reason: format!("{} is outside [0, 1]", self.belief_threshold),
            });
        }
        positive("gridCylinderRadiusDegrees", self.grid_cylinder_radius_degrees)?;
        positive("gridCylinderHeightKm", self.grid_cylinder_height_km)?;
        if self.phases.is_empty() {
            return Err(AssociationError::InvalidParameter {
                name: "phases",
                reason: String::from("at least one phase is required"),
            });
        }
        Ok(())
    }
}

pub(crate) fn non_negative(name: &'static str, value: f64) -> Result<(), AssociationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AssociationError::InvalidParameter {
            name,
            reason: format!("{value} is not a finite non-negative number"),
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), AssociationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AssociationError::InvalidParameter {
            name,
            reason: format!("{value} is not a finite positive number"),
        })
    }
}

const fn default_max_stations_per_grid() -> u32 {
    4
}

const fn default_sigma() -> f64 {
    1.0
}

fn default_phases() -> Vec<PhaseType> {
    vec![PhaseType::P]
}

const fn default_chi_limit() -> f64 {
    3.5
}

const fn default_radius_degrees() -> f64 {
    2.0
}

const fn default_depth_km() -> f64 {
    50.0
}

const fn default_height_km() -> f64 {
    100.0
}

const fn default_minimum_magnitude() -> f64 {
    3.5
}

const fn default_num_first_sta() -> usize {
    1
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn camel_case_json_parses() {
        let json = r#"{
            "maxStationsPerGrid": 4,
            "sigmaSlowness": 1.0,
            "phases": ["S", "P"],
            "forwardTransformationPhases": ["S", "P", "PKP"],
            "beliefThreshold": 0.5,
            "primaryPhaseRequiredForSecondary": false,
            "sigmaTime": 1.2,
            "chiLimit": 1.3,
            "freezeArrivalsAtBeamPoints": true,
            "gridCylinderRadiusDegrees": 1.0,
            "gridCylinderDepthKm": 50.0,
            "gridCylinderHeightKm": 100.0,
            "minimumMagnitude": 3.5,
            "numFirstSta": 5
        }"#;
        let definition: AssociatorDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.phases, vec![PhaseType::S, PhaseType::P]);
        assert_eq!(definition.forward_transformation_phases.last(), Some(&PhaseType::Pkp));
        assert_eq!(definition.num_first_sta, 5);
        assert!(definition.freeze_arrivals_at_beam_points);
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn missing_keys_take_defaults() {
        let definition: AssociatorDefinition = serde_json::from_str(r#"{"sigmaTime": 2.0}"#).unwrap();
        assert!((definition.sigma_time - 2.0).abs() < f64::EPSILON);
        assert_eq!(definition.phases, AssociatorDefinition::default().phases);
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn negative_sigma_is_rejected() {
        let definition = AssociatorDefinition {
            sigma_slowness: -0.1,
            ..AssociatorDefinition::default()
        };
        assert!(matches!(
            definition.validate(),
            Err(AssociationError::InvalidParameter { name: "sigmaSlowness", .. })
        ));
    }

    #[test]
    fn belief_outside_unit_interval_is_rejected() {
        let definition = AssociatorDefinition {
            belief_threshold: 1.5,
            ..AssociatorDefinition::default()
        };
        assert!(definition.validate().is_err());
    }
}
