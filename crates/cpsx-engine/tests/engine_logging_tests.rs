// Boundary logging of engine operations. Every test binary shares one
// global capture, so assertions count at least one matching event.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{lm_driver, rgb_values, target_cps, RGB};
use cpsx_core::logging_facility::test_capture::init_test_capture;
use cpsx_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_COST, FIELD_COSTS_NEEDED, FIELD_DRIVER,
    FIELD_DURATION_MS, FIELD_ERR_CODE, FIELD_ERR_KIND, FIELD_ITERATION, FIELD_POINT_COUNT,
    FIELD_PSPACE, FIELD_RELSHP_COUNT, FIELD_STATUS,
};
use cpsx_engine::{ExplorationContext, ExplorationParams};

#[test]
fn test_solve_emits_start_and_end_events() {
    let capture = init_test_capture();
    let (cps, points) = target_cps(&[[0.2, 0.3, 0.4]]);
    let (_device, driver) = lm_driver();

    let ctx = ExplorationContext::create(&cps, &driver, ExplorationParams::new(RGB)).unwrap();
    let (values, _) = rgb_values(&cps, &points, &[0.0; 3]);
    ctx.solve(&values).unwrap();

    capture.assert_event_exists("exploration_create", EVENT_START);
    capture.assert_event_exists("exploration_create", EVENT_END);
    capture.assert_event_exists("exploration_solve", EVENT_START);
    capture.assert_event_exists("driver_load", EVENT_END);

    let end = capture
        .events_for_op("exploration_solve")
        .into_iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END))
        .expect("solve end event");
    assert!(end.field(FIELD_DURATION_MS).is_some());
    assert!(end.field(FIELD_ITERATION).is_some());
    assert!(end.field(FIELD_COST).is_some());
    assert_eq!(end.field(FIELD_STATUS), Some("Converged"));

    let create_end = capture
        .events_for_op("exploration_create")
        .into_iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END))
        .expect("create end event");
    assert_eq!(create_end.field(FIELD_POINT_COUNT), Some("1"));
    assert_eq!(create_end.field(FIELD_RELSHP_COUNT), Some("1"));
    assert_eq!(create_end.field(FIELD_COSTS_NEEDED), Some("3"));

    let create_start = capture
        .events_for_op("exploration_create")
        .into_iter()
        .find(|e| e.event.as_deref() == Some(EVENT_START))
        .expect("create start event");
    assert_eq!(create_start.field(FIELD_PSPACE), Some(RGB.to_string().as_str()));
    assert_eq!(create_start.field(FIELD_DRIVER), Some("lm"));
}

#[test]
fn test_failed_step_emits_error_event_with_code() {
    let capture = init_test_capture();
    let (cps, _) = target_cps(&[[0.2, 0.3, 0.4]]);
    let (_device, driver) = lm_driver();
    let ctx = ExplorationContext::create(&cps, &driver, ExplorationParams::new(RGB)).unwrap();

    assert!(ctx.step().is_err());

    let error = capture
        .events_for_op("exploration_step")
        .into_iter()
        .find(|e| e.event.as_deref() == Some(EVENT_END_ERROR))
        .expect("step error event");
    assert_eq!(error.field(FIELD_ERR_CODE), Some("CPSX_NOT_READY"));
    assert_eq!(error.field(FIELD_ERR_KIND), Some("NotReady"));
    assert_eq!(error.level, tracing::Level::ERROR);
}
