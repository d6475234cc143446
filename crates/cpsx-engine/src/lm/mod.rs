//! Levenberg-Marquardt driver
//!
//! The bundled driver solves explorations as nonlinear least squares over
//! the coordinates of every unlocked point. Residuals are the concatenated
//! costs of all instance entries; the Jacobian is assembled from analytic
//! derivatives where a functor provides them and from central finite
//! differences elsewhere, touching only the relationships that contain the
//! perturbed point.

mod problem;
mod solver;
mod state;

use std::sync::Arc;

use cpsx_core::Result;
use cpsx_core_types::{AttribKind, ScalarType};

use crate::driver::{Driver, DriverInitParams, DriverSolver};
use crate::exploration::ExplorationData;

pub use solver::LmStatus;
pub use state::LmSolver;

/// Module name the driver is registered under
pub const LM_MODULE: &str = "lm";

/// Levenberg-Marquardt driver
#[derive(Debug, Default)]
pub struct LmDriver;

impl Driver for LmDriver {
    fn name(&self) -> &str {
        LM_MODULE
    }

    fn supports(&self, attrib: AttribKind, scalar: ScalarType) -> bool {
        match attrib {
            AttribKind::Coords => scalar.is_float(),
            AttribKind::LockStatus => true,
        }
    }

    fn prepare(&self, data: Arc<ExplorationData>) -> Result<Box<dyn DriverSolver>> {
        Ok(Box::new(LmSolver::new(data)?))
    }
}

/// Entry point of the bundled module
///
/// # Errors
/// Never fails.
pub fn lm_driver_entry(init: &DriverInitParams) -> Result<Box<dyn Driver>> {
    tracing::debug!(module = %init.module, "lm driver loaded");
    Ok(Box::new(LmDriver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_float_coords_only() {
        let driver = LmDriver;
        assert!(driver.supports(AttribKind::Coords, ScalarType::F32));
        assert!(driver.supports(AttribKind::Coords, ScalarType::F64));
        assert!(!driver.supports(AttribKind::Coords, ScalarType::U8));
        assert!(driver.supports(AttribKind::LockStatus, ScalarType::U8));
    }
}
