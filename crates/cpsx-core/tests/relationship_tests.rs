#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{cps_with_points, register_const};
use cpsx_core::{CostBinding, CpsError, RelshpKind, RelshpParams, ResultCode};
use cpsx_core_types::{PointId, RelshpGroupUid, VariationUid};
use serde_json::json;

#[test]
fn test_params_round_trip() {
    // GIVEN a mix of inclusive and exclusive relationships
    let (cps, points) = cps_with_points(4);
    let f = register_const(&cps, 1);
    let g = register_const(&cps, 2);
    let supplied = vec![
        RelshpParams::inclusive(
            vec![points[2], points[0]],
            vec![
                CostBinding::with_config(f, json!({"weight": 2.5})),
                CostBinding::new(g),
            ],
        )
        .with_variations([VariationUid::new(3)]),
        RelshpParams::exclusive(vec![points[1]], vec![CostBinding::new(g)])
            .in_group(RelshpGroupUid::new(9))
            .disabled(),
    ];

    // WHEN they are added and read back
    let ids = cps.relationships_add(supplied.clone()).unwrap();
    let read = cps.relationships_params_get(&ids).unwrap();

    // THEN the parameters are exactly those supplied
    assert_eq!(read, supplied);
    assert_eq!(cps.relationships_state_get(&ids).unwrap(), vec![true, false]);
}

#[test]
fn test_batch_with_dead_point_commits_nothing() {
    // GIVEN a valid relationship followed by one naming a removed point
    let (cps, points) = cps_with_points(3);
    let f = register_const(&cps, 1);
    cps.points_remove(&[points[2]]).unwrap();
    let batch = vec![
        RelshpParams::inclusive(vec![points[0]], vec![CostBinding::new(f)]),
        RelshpParams::inclusive(vec![points[1], points[2]], vec![CostBinding::new(f)]),
    ];

    // WHEN the batch is added
    let err = cps.relationships_add(batch).unwrap_err();

    // THEN the whole batch is rejected
    assert!(matches!(err, CpsError::PointNotFound { id } if id == points[2]));
    assert!(cps.relationships_live().unwrap().is_empty());
}

#[test]
fn test_batch_with_dead_functor_commits_nothing() {
    let (cps, points) = cps_with_points(2);
    let f = register_const(&cps, 1);
    let batch = vec![
        RelshpParams::inclusive(points.clone(), vec![CostBinding::new(f)]),
        RelshpParams::inclusive(
            points.clone(),
            vec![CostBinding::new(cpsx_core_types::CostFunctorId::new(40))],
        ),
    ];
    let err = cps.relationships_add(batch).unwrap_err();
    assert_eq!(err.code(), ResultCode::NotFound);
    assert!(cps.relationships_live().unwrap().is_empty());
}

#[test]
fn test_shape_errors_are_bad_arg() {
    let (cps, points) = cps_with_points(2);
    let f = register_const(&cps, 1);

    let no_bindings = RelshpParams::inclusive(points.clone(), vec![]);
    let no_points = RelshpParams::inclusive(vec![], vec![CostBinding::new(f)]);
    let invalid_group =
        RelshpParams::inclusive(points.clone(), vec![CostBinding::new(f)]).in_group(RelshpGroupUid::INVALID);

    for params in [no_bindings, no_points, invalid_group] {
        let err = cps.relationships_add(vec![params]).unwrap_err();
        assert_eq!(err.code(), ResultCode::BadArg);
    }
    assert!(cps.relationships_add(vec![]).is_err());
}

#[test]
fn test_state_set_is_all_or_nothing() {
    let (cps, points) = cps_with_points(2);
    let f = register_const(&cps, 1);
    let ids = cps
        .relationships_add(vec![RelshpParams::inclusive(points, vec![CostBinding::new(f)])])
        .unwrap();

    let dead = cpsx_core_types::RelshpId::new(17);
    assert!(cps.relationships_state_set(&[ids[0], dead], false).is_err());
    assert_eq!(cps.relationships_state_get(&ids).unwrap(), vec![true]);

    cps.relationships_state_set(&ids, false).unwrap();
    assert_eq!(cps.relationships_state_get(&ids).unwrap(), vec![false]);
}

#[test]
fn test_clear_relationships_drops_groups() {
    let (cps, points) = cps_with_points(2);
    let f = register_const(&cps, 1);
    cps.relationships_add(vec![
        RelshpParams::inclusive(points.clone(), vec![CostBinding::new(f)]).in_group(RelshpGroupUid::new(1)),
    ])
    .unwrap();

    cps.relationships_clear().unwrap();

    assert!(cps.relationships_live().unwrap().is_empty());
    assert!(matches!(
        cps.group_state_get(RelshpGroupUid::new(1)),
        Err(CpsError::GroupNotFound { .. })
    ));
}

#[test]
fn test_exclusive_kind_survives_serde() {
    let params = RelshpParams::exclusive(vec![PointId::new(4)], vec![]);
    let json = serde_json::to_string(&params).unwrap();
    let back: RelshpParams = serde_json::from_str(&json).unwrap();
    assert_eq!(back.kind, RelshpKind::Exclusive);
    assert_eq!(back, params);
}
