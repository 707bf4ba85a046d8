//! Physical constants every rank applies during a step.

use serde::{Deserialize, Serialize};

use crate::lbm_error::LbmError;

/// Snapshot of the fluid parameters. The orchestrator owns the current value
/// and every rank keeps its own copy, replaced only by an acknowledged
/// `UpdateEnvironment` broadcast.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentParameters {
    /// Initial and reset density of fluid cells.
    pub density: f64,
    /// Momentum increment applied at the inlet and outlet layers.
    pub acceleration: f64,
    /// Inverse BGK relaxation time (omega).
    pub relaxation: f64,
    /// Steps between sampling passes.
    pub update_rate: u32,
    /// Forcing is skipped for a cell when any west-going component would end
    /// below this value.
    pub forcing_guard: f64,
}

impl Default for EnvironmentParameters {
    fn default() -> Self {
        Self {
            density: 0.5,
            acceleration: 0.05,
            relaxation: 1.85,
            update_rate: 10,
            forcing_guard: 0.0,
        }
    }
}

impl EnvironmentParameters {
    /// Reject out-of-range values; nothing is clamped.
    pub fn validate(&self) -> Result<(), LbmError> {
        let bad = |name: &'static str, value: f64| -> Result<(), LbmError> {
            Err(LbmError::InvalidParameter { name, value })
        };
        if !self.density.is_finite() || self.density <= 0.0 {
            return bad("density", self.density);
        }
        if !self.relaxation.is_finite() || self.relaxation <= 0.0 || self.relaxation >= 2.0 {
            return bad("relaxation", self.relaxation);
        }
        if !self.acceleration.is_finite() || self.acceleration < 0.0 {
            return bad("acceleration", self.acceleration);
        }
        if self.update_rate == 0 {
            return bad("update_rate", 0.0);
        }
        if !self.forcing_guard.is_finite() || self.forcing_guard < 0.0 {
            return bad("forcing_guard", self.forcing_guard);
        }
        Ok(())
    }
}
