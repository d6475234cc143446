use cpsx_core::errors::{CpsError, ResultCode};
use cpsx_core_types::{AttribKind, PSpaceUid, PointId, ScalarType};

#[test]
fn test_not_found_verifiable_by_code() {
    let err = CpsError::PointNotFound { id: PointId::new(3) };

    assert_eq!(err.code(), ResultCode::NotFound);
    assert_eq!(err.code().code(), "CPSX_NOT_FOUND");
    assert!(err.to_string().contains("ppoint:3"));
}

#[test]
fn test_already_exists_distinct_from_not_found() {
    let err = CpsError::PSpaceAlreadyExists { uid: PSpaceUid::new(1) };

    assert_eq!(err.code(), ResultCode::AlreadyExists);
    assert_ne!(err.code(), ResultCode::NotFound);
}

#[test]
fn test_shape_errors_carry_structured_fields() {
    let err = CpsError::BufferShapeMismatch {
        attrib: AttribKind::Coords,
        expected: 6,
        found: 5,
    };
    assert_eq!(err.code(), ResultCode::BadArg);
    assert!(err.to_string().contains("expected 6"));

    let err = CpsError::ScalarTypeMismatch {
        attrib: AttribKind::LockStatus,
        expected: ScalarType::U8,
        found: ScalarType::F32,
    };
    assert_eq!(err.code(), ResultCode::BadArg);
}

#[test]
fn test_result_code_mapping() {
    // Each kind has a stable, unique code
    let kinds = vec![
        (ResultCode::BadArg, "CPSX_BAD_ARG"),
        (ResultCode::MemErr, "CPSX_MEM_ERR"),
        (ResultCode::NotFound, "CPSX_NOT_FOUND"),
        (ResultCode::AlreadyExists, "CPSX_ALREADY_EXISTS"),
        (ResultCode::Busy, "CPSX_BUSY"),
        (ResultCode::NotReady, "CPSX_NOT_READY"),
        (ResultCode::NotAuthorized, "CPSX_NOT_AUTHORIZED"),
        (ResultCode::NotSupported, "CPSX_NOT_SUPPORTED"),
        (ResultCode::NotConverged, "CPSX_NOT_CONVERGED"),
        (ResultCode::NumericalIssue, "CPSX_NUMERICAL_ISSUE"),
        (ResultCode::Invalid, "CPSX_INVALID"),
        (ResultCode::Internal, "CPSX_INTERNAL"),
        (ResultCode::IoErr, "CPSX_IO_ERR"),
    ];

    for (kind, expected_code) in &kinds {
        assert_eq!(kind.code(), *expected_code);
        assert_eq!(kind.to_string(), *expected_code);
    }

    let mut codes: Vec<_> = kinds.iter().map(|(_, c)| *c).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), kinds.len());
}

#[test]
fn test_retryable_kinds() {
    assert!(CpsError::ExplorationBusy { reason: "solve in flight" }.code().is_retryable());
    assert!(CpsError::NotReady { reason: "nothing published" }.code().is_retryable());
    assert!(!CpsError::NotConverged { tries: 3 }.code().is_retryable());
}

#[test]
fn test_toml_error_maps_to_bad_arg() {
    let err: CpsError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
    assert_eq!(err.code(), ResultCode::BadArg);
}
