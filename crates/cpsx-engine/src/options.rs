//! Solve options
//!
//! Options travel with the exploration parameters and can be loaded from a
//! TOML document. Missing keys take their defaults:
//!
//! ```toml
//! max_iterations = 200
//! ftol = 1e-10
//! max_convergence_tries = 2
//! ```

use cpsx_core::{CpsError, Result};
use serde::{Deserialize, Serialize};

/// Levenberg-Marquardt tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolveOptions {
    /// Outer iterations per try
    pub max_iterations: u32,

    /// Residual evaluations per try, finite differences excluded
    pub max_function_evaluations: u32,

    /// Relative reduction of the squared norm below which a step counts as
    /// converged
    pub ftol: f64,

    /// Relative step size below which a step counts as converged
    pub xtol: f64,

    /// Gradient infinity norm below which the start point counts as converged
    pub gtol: f64,

    /// Relative central-difference step
    pub fd_step: f64,

    /// Initial damping, relative to the largest diagonal entry of `JᵀJ`
    pub initial_damping: f64,

    /// Full solves attempted by `solve` before giving up on convergence;
    /// each retry restarts from the latest point
    pub max_convergence_tries: u32,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_function_evaluations: 2000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 1e-12,
            fd_step: 6.055e-6,
            initial_damping: 1e-3,
            max_convergence_tries: 1,
        }
    }
}

impl SolveOptions {
    /// Parse and validate options from a TOML document
    ///
    /// # Errors
    /// * `BadArg` - the document does not parse or an option is invalid
    pub fn from_toml_str(doc: &str) -> Result<Self> {
        let options: SolveOptions = toml::from_str(doc)?;
        options.validate()?;
        Ok(options)
    }

    /// # Errors
    /// * `BadArg` - a tolerance or step is non-finite or non-positive, or an
    ///   iteration cap is zero
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("ftol", self.ftol),
            ("xtol", self.xtol),
            ("gtol", self.gtol),
            ("fd_step", self.fd_step),
            ("initial_damping", self.initial_damping),
        ];
        for (option, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(CpsError::InvalidOption {
                    option,
                    reason: format!("must be finite and positive, got {value}"),
                });
            }
        }
        let caps = [
            ("max_iterations", self.max_iterations),
            ("max_function_evaluations", self.max_function_evaluations),
            ("max_convergence_tries", self.max_convergence_tries),
        ];
        for (option, value) in caps {
            if value == 0 {
                return Err(CpsError::InvalidOption {
                    option,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SolveOptions::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = SolveOptions::from_toml_str("max_iterations = 7\nftol = 1e-6\n").unwrap();
        assert_eq!(options.max_iterations, 7);
        assert_eq!(options.ftol, 1e-6);
        assert_eq!(options.xtol, SolveOptions::default().xtol);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SolveOptions::from_toml_str("gtol = -1.0").unwrap_err();
        assert!(matches!(err, CpsError::InvalidOption { option: "gtol", .. }));

        let err = SolveOptions::from_toml_str("max_convergence_tries = 0").unwrap_err();
        assert!(matches!(err, CpsError::InvalidOption { option: "max_convergence_tries", .. }));
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = SolveOptions::from_toml_str("max_iters = 3").unwrap_err();
        assert!(matches!(err, CpsError::Config { .. }));
    }
}
