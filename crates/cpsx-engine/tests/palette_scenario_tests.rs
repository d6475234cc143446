// Three colors pushed apart in CIE Lab while an RGB gamut penalty keeps
// them displayable. Exercises conversion caching, finite differences
// through a non-identity pspace and EXCLUSIVE relationships.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::{
    coords_of, lab_to_rgb, lab_values, lm_driver, palette_cps, rgb_to_lab, rgb_values,
    spread_cps, LabRgbConversion, LAB, RGB,
};
use cpsx_core::{CpsError, ResultCode};
use cpsx_engine::{ExplorationContext, ExplorationParams, SolveOptions, SolveStatus};

const PRIMARIES: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

const START: [f64; 9] = [0.50, 0.50, 0.50, 0.52, 0.50, 0.50, 0.50, 0.48, 0.50];

fn lab_distance(a: &[f64], b: &[f64]) -> f64 {
    let (la, lb) = (rgb_to_lab(a), rgb_to_lab(b));
    la.iter()
        .zip(&lb)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn min_pairwise(points: &[Vec<f64>]) -> f64 {
    let mut min = f64::INFINITY;
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            min = min.min(lab_distance(&points[i], &points[j]));
        }
    }
    min
}

#[test]
fn test_conversion_round_trips_in_gamut() {
    let rgb = [0.25, 0.5, 0.75];
    let back = common::lab_to_rgb(&rgb_to_lab(&rgb));
    for (a, b) in rgb.iter().zip(&back) {
        assert!((a - b).abs() < 1e-6, "{rgb:?} came back as {back:?}");
    }
}

#[test]
fn test_palette_spreads_within_gamut() {
    // GIVEN three nearly identical grays
    let (cps, points) = palette_cps();
    let (_device, driver) = lm_driver();
    let options = SolveOptions {
        max_iterations: 200,
        ..SolveOptions::default()
    };
    let params = ExplorationParams::new(RGB)
        .with_conversion(Arc::new(LabRgbConversion))
        .with_options(options);
    let ctx = ExplorationContext::create(&cps, &driver, params).unwrap();
    let (values, attribs) = rgb_values(&cps, &points, &START);
    let before: Vec<Vec<f64>> = START.chunks(3).map(<[f64]>::to_vec).collect();

    // WHEN solved
    let result = ctx.solve(&values);

    // THEN the solve either converges or stops at its iteration cap
    match result {
        Ok(report) => {
            assert_eq!(report.status, SolveStatus::Converged);
            ctx.last_results_retrieve(&values).unwrap();
            let after: Vec<Vec<f64>> = points.iter().map(|p| coords_of(&attribs, *p)).collect();

            // AND the colors moved apart while staying displayable
            assert!(min_pairwise(&after) > min_pairwise(&before));
            for c in after.iter().flatten() {
                assert!((-1e-2..=1.0 + 1e-2).contains(c), "{after:?} left the gamut");
            }
        }
        Err(CpsError::NotConverged { .. }) => {
            assert_eq!(ctx.status(), SolveStatus::NotConverged);
        }
        Err(e) => panic!("unexpected error {e}"),
    }
}

#[test]
fn test_locked_anchor_stays_put() {
    // GIVEN the first gray locked as an anchor
    let (cps, points) = palette_cps();
    let (_device, driver) = lm_driver();
    let params = ExplorationParams::new(RGB).with_conversion(Arc::new(LabRgbConversion));
    let ctx = ExplorationContext::create(&cps, &driver, params).unwrap();
    let (values, attribs) = rgb_values(&cps, &points, &START);
    common::lock_point(&attribs, points[0]);

    // WHEN solved
    let result = ctx.solve(&values);

    // THEN whatever the outcome, a published result keeps the anchor
    if result.is_ok() {
        ctx.last_results_retrieve(&values).unwrap();
    }
    assert_eq!(coords_of(&attribs, points[0]), START[..3].to_vec());
}

#[test]
fn test_primaries_explored_in_lab_stay_displayable() {
    // GIVEN pure red, green and blue spread apart in LAB by one EXCLUSIVE
    // relationship over every point, with an RGB gamut penalty
    let (cps, points) = spread_cps();
    let (_device, driver) = lm_driver();
    let params = ExplorationParams::new(LAB).with_conversion(Arc::new(LabRgbConversion));
    let ctx = ExplorationContext::create(&cps, &driver, params).unwrap();
    assert_eq!(ctx.instance().relationships()[0].points.len(), 3);
    let (values, attribs) = lab_values(&cps, &points, &PRIMARIES);

    // WHEN solved
    let result = ctx.solve(&values);

    // THEN it converges or reports NotConverged, never anything else
    match result {
        Ok(report) => {
            assert_eq!(report.status, SolveStatus::Converged);
            ctx.last_results_retrieve(&values).unwrap();

            // AND every color converted back to RGB lies within [0, 1]
            for p in &points {
                let rgb = lab_to_rgb(&coords_of(&attribs, *p));
                for c in rgb {
                    assert!((-1e-2..=1.0 + 1e-2).contains(&c), "{rgb:?} left the gamut");
                }
            }
        }
        Err(CpsError::NotConverged { .. }) => {
            assert_eq!(ctx.status(), SolveStatus::NotConverged);
            let err = ctx.last_results_retrieve(&values).unwrap_err();
            assert_eq!(err.code(), ResultCode::NotReady);
        }
        Err(e) => panic!("unexpected error {e}"),
    }
}
