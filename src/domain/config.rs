//! Run configuration.

use serde::{Deserialize, Serialize};

use super::environment::EnvironmentParameters;
use crate::lbm_error::LbmError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub environment: EnvironmentParameters,
    /// Anisotropic lattice nodes per occupancy voxel.
    pub scale: [f64; 3],
    /// Void layers added on each side of the occupied box.
    pub padding: [usize; 3],
    /// Stop after this many steps; 0 runs until halted.
    pub max_steps: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentParameters::default(),
            scale: [1.0; 3],
            padding: [0; 3],
            max_steps: 0,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), LbmError> {
        self.environment.validate()?;
        const NAMES: [&str; 3] = ["scale_x", "scale_y", "scale_z"];
        for (a, s) in self.scale.iter().enumerate() {
            if !s.is_finite() || *s <= 0.0 {
                return Err(LbmError::InvalidParameter {
                    name: NAMES[a],
                    value: *s,
                });
            }
        }
        Ok(())
    }
}
