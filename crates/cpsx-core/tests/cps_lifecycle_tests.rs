#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{cps_with_points, RGB};
use cpsx_core::{CpsError, InMemoryAttribs, LockMode, ResultCode, Values, ValuesStorage};

#[test]
fn test_release_requires_children_released_first() {
    // GIVEN a CPS with a live Values child
    let (cps, _) = cps_with_points(1);
    let values = Values::create(&cps, RGB, ValuesStorage::Global(Box::new(InMemoryAttribs::new()))).unwrap();

    // WHEN the CPS handle is released first
    let err = cps.clone().release().unwrap_err();

    // THEN release is refused
    assert!(matches!(err, CpsError::ChildrenAlive { count: 1 }));
    assert_eq!(err.code(), ResultCode::Invalid);

    // AND releasing the child first lets the CPS go
    drop(values);
    assert!(cps.release().is_ok());
}

#[test]
fn test_destroy_forces_children_down() {
    // GIVEN a Values child holding a lock
    let (cps, points) = cps_with_points(2);
    let values = Values::create(&cps, RGB, ValuesStorage::Global(Box::new(InMemoryAttribs::new()))).unwrap();
    let h = values.lock(LockMode::ReadWrite).unwrap();

    // WHEN the CPS is destroyed
    let survivor = cps.clone();
    cps.destroy();

    // THEN every later child operation fails with a defined code
    let err = values
        .set_f64(&h, cpsx_core_types::AttribKind::Coords, &points, &[0.0; 6])
        .unwrap_err();
    assert!(matches!(err, CpsError::CpsDestroyed));
    assert!(values.lock(LockMode::Read).is_err());

    // AND the store is unusable through other handles
    assert!(survivor.is_destroyed());
    assert_eq!(survivor.points_live().unwrap_err().code(), ResultCode::Invalid);
    assert_eq!(survivor.child_count(), 0);
}

#[test]
fn test_values_after_release_of_all_handles() {
    // A child keeps the store alive after the caller dropped its handle
    let (cps, points) = cps_with_points(1);
    let values = Values::create(&cps, RGB, ValuesStorage::Global(Box::new(InMemoryAttribs::new()))).unwrap();
    drop(cps);

    let h = values.lock(LockMode::ReadWrite).unwrap();
    values
        .set_f64(&h, cpsx_core_types::AttribKind::Coords, &points, &[1.0, 2.0, 3.0])
        .unwrap();
    assert_eq!(values.cps().points_live().unwrap(), points);
}
