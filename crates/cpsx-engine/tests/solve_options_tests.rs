#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{lm_driver, target_cps, RGB};
use cpsx_core::{CpsError, ResultCode};
use cpsx_engine::{ExplorationContext, ExplorationParams, SolveOptions};
use proptest::prelude::*;

const OPTIONS_TOML: &str = r#"
# tighter tolerances for a small palette
max_iterations = 250
ftol = 1e-12
xtol = 1e-12
max_convergence_tries = 2
"#;

#[test]
fn test_toml_options_travel_with_the_exploration() {
    // GIVEN options loaded from a document
    let options = SolveOptions::from_toml_str(OPTIONS_TOML).unwrap();
    let (cps, _) = target_cps(&[[0.5, 0.5, 0.5]]);
    let (_device, driver) = lm_driver();

    // WHEN they are handed to an exploration
    let ctx = ExplorationContext::create(
        &cps,
        &driver,
        ExplorationParams::new(RGB).with_options(options.clone()),
    )
    .unwrap();

    // THEN the exploration keeps them, defaults filling the gaps
    assert_eq!(ctx.options(), &options);
    assert_eq!(ctx.options().max_iterations, 250);
    assert_eq!(ctx.options().gtol, SolveOptions::default().gtol);
}

#[test]
fn test_malformed_document_is_bad_arg() {
    let err = SolveOptions::from_toml_str("max_iterations = \"many\"").unwrap_err();

    assert!(matches!(err, CpsError::Config { .. }));
    assert_eq!(err.code(), ResultCode::BadArg);
}

proptest! {
    #[test]
    fn prop_non_positive_tolerances_rejected(ftol in -1.0e3f64..=0.0) {
        let options = SolveOptions {
            ftol,
            ..SolveOptions::default()
        };
        let err = options.validate().unwrap_err();
        let is_ftol = matches!(err, CpsError::InvalidOption { option: "ftol", .. });
        prop_assert!(is_ftol);
    }

    #[test]
    fn prop_positive_settings_accepted(
        max_iterations in 1u32..10_000,
        fd_step in 1e-12f64..1e-2,
        tries in 1u32..8,
    ) {
        let options = SolveOptions {
            max_iterations,
            fd_step,
            max_convergence_tries: tries,
            ..SolveOptions::default()
        };
        prop_assert!(options.validate().is_ok());
    }
}
