use cpsx_core_types::{
    AttribKind, CostFunctorId, CostFunctorUid, PSpaceUid, PointId, RelshpGroupUid, RelshpId,
    ScalarType,
};
use thiserror::Error;

/// Result type alias using CpsError
pub type Result<T> = std::result::Result<T, CpsError>;

// ========== Error Facility ==========

/// Canonical result code taxonomy
///
/// A flat classification shared by every cpsx operation. Each code maps to a
/// stable string that callers can match on programmatically and that the
/// logging facility records as `err.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Missing, malformed or shape-mismatched input
    BadArg,
    /// Allocation failure
    MemErr,
    /// Unknown or no longer live identifier
    NotFound,
    /// Duplicate declaration
    AlreadyExists,
    /// Non-blocking claim lost against another holder; retry
    Busy,
    /// Requested data has not been produced yet; retry later
    NotReady,
    /// Access mode does not permit the operation
    NotAuthorized,
    /// Capability not offered by the driver
    NotSupported,
    /// Solver stopped before meeting its convergence criteria
    NotConverged,
    /// Solver hit a numerical breakdown
    NumericalIssue,
    /// Object used in a state that forbids the operation
    Invalid,
    /// Broken internal invariant
    Internal,
    /// Input/output failure at an external boundary
    IoErr,
}

impl ResultCode {
    /// Get the stable code string for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ResultCode::BadArg => "CPSX_BAD_ARG",
            ResultCode::MemErr => "CPSX_MEM_ERR",
            ResultCode::NotFound => "CPSX_NOT_FOUND",
            ResultCode::AlreadyExists => "CPSX_ALREADY_EXISTS",
            ResultCode::Busy => "CPSX_BUSY",
            ResultCode::NotReady => "CPSX_NOT_READY",
            ResultCode::NotAuthorized => "CPSX_NOT_AUTHORIZED",
            ResultCode::NotSupported => "CPSX_NOT_SUPPORTED",
            ResultCode::NotConverged => "CPSX_NOT_CONVERGED",
            ResultCode::NumericalIssue => "CPSX_NUMERICAL_ISSUE",
            ResultCode::Invalid => "CPSX_INVALID",
            ResultCode::Internal => "CPSX_INTERNAL",
            ResultCode::IoErr => "CPSX_IO_ERR",
        }
    }

    /// Conditions inherent to the non-blocking primitives: expected under
    /// contention and cleared by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResultCode::Busy | ResultCode::NotReady)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for cpsx operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CpsError {
    // ===== Argument Errors =====
    /// Generic malformed input
    #[error("Bad argument: {reason}")]
    BadArg { reason: String },

    /// The same id appears twice in one batch
    #[error("Duplicate id in batch: {id}")]
    DuplicateInBatch { id: String },

    /// Buffer width does not match `ids × components`
    #[error("Buffer shape mismatch for {attrib:?}: expected {expected} scalars, found {found}")]
    BufferShapeMismatch {
        attrib: AttribKind,
        expected: usize,
        found: usize,
    },

    /// Buffer scalar type does not match the pspace layout
    #[error("Scalar type mismatch for {attrib:?}: expected {expected:?}, found {found:?}")]
    ScalarTypeMismatch {
        attrib: AttribKind,
        expected: ScalarType,
        found: ScalarType,
    },

    /// Solve options failed validation
    #[error("Invalid solve option {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    /// Configuration document could not be parsed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Unlock on a Values object that is not locked
    #[error("Values object is not locked")]
    NotLocked,

    // ===== Lookup Errors =====
    #[error("Parameter space not found: {uid}")]
    PSpaceNotFound { uid: PSpaceUid },

    #[error("Point not found: {id}")]
    PointNotFound { id: PointId },

    #[error("Cost functor registration not found: {id}")]
    CostFunctorNotFound { id: CostFunctorId },

    #[error("No cost functor registered under {uid}")]
    CostFunctorUidNotFound { uid: CostFunctorUid },

    #[error("Relationship not found: {id}")]
    RelshpNotFound { id: RelshpId },

    #[error("Relationship group not found: {uid}")]
    GroupNotFound { uid: RelshpGroupUid },

    #[error("Driver module not found: {name}")]
    DriverNotFound { name: String },

    // ===== Duplicate Errors =====
    #[error("Parameter space already declared: {uid}")]
    PSpaceAlreadyExists { uid: PSpaceUid },

    // ===== Resource Errors =====
    #[error("Out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },

    // ===== Concurrency Errors =====
    /// Values lock already held
    #[error("Values object is locked by another holder")]
    ValuesBusy,

    /// Exploration internal lock already held or a solve already in flight
    #[error("Exploration context busy: {reason}")]
    ExplorationBusy { reason: &'static str },

    #[error("Not ready: {reason}")]
    NotReady { reason: &'static str },

    // ===== Authorization Errors =====
    #[error("Lock mode does not grant {needed} access")]
    LockModeDenied { needed: &'static str },

    // ===== Capability Errors =====
    #[error("Not supported: {reason}")]
    NotSupported { reason: String },

    // ===== Solver Outcomes =====
    #[error("Solver did not converge after {tries} tries")]
    NotConverged { tries: u32 },

    #[error("Numerical issue: {reason}")]
    NumericalIssue { reason: String },

    // ===== State Errors =====
    /// Unlock with a handle that was not issued by the current lock
    #[error("Lock handle does not match the current lock")]
    ForeignLockHandle,

    #[error("Parameter space {uid} is still expected by cost functor {functor}")]
    PSpaceInUse {
        uid: PSpaceUid,
        functor: CostFunctorId,
    },

    #[error("Cost functor {id} is still bound by relationship {relshp}")]
    CostFunctorInUse { id: CostFunctorId, relshp: RelshpId },

    #[error("CPS still has {count} live children")]
    ChildrenAlive { count: usize },

    #[error("Owning CPS was destroyed")]
    CpsDestroyed,

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    // ===== Generic Errors =====
    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CpsError {
    /// Map this error onto the flat result code taxonomy
    pub fn code(&self) -> ResultCode {
        match self {
            CpsError::BadArg { .. }
            | CpsError::DuplicateInBatch { .. }
            | CpsError::BufferShapeMismatch { .. }
            | CpsError::ScalarTypeMismatch { .. }
            | CpsError::InvalidOption { .. }
            | CpsError::Config { .. }
            | CpsError::NotLocked => ResultCode::BadArg,

            CpsError::PSpaceNotFound { .. }
            | CpsError::PointNotFound { .. }
            | CpsError::CostFunctorNotFound { .. }
            | CpsError::CostFunctorUidNotFound { .. }
            | CpsError::RelshpNotFound { .. }
            | CpsError::GroupNotFound { .. }
            | CpsError::DriverNotFound { .. } => ResultCode::NotFound,

            CpsError::PSpaceAlreadyExists { .. } => ResultCode::AlreadyExists,

            CpsError::OutOfMemory { .. } => ResultCode::MemErr,

            CpsError::ValuesBusy | CpsError::ExplorationBusy { .. } => ResultCode::Busy,
            CpsError::NotReady { .. } => ResultCode::NotReady,

            CpsError::LockModeDenied { .. } => ResultCode::NotAuthorized,
            CpsError::NotSupported { .. } => ResultCode::NotSupported,

            CpsError::NotConverged { .. } => ResultCode::NotConverged,
            CpsError::NumericalIssue { .. } => ResultCode::NumericalIssue,

            CpsError::ForeignLockHandle
            | CpsError::PSpaceInUse { .. }
            | CpsError::CostFunctorInUse { .. }
            | CpsError::ChildrenAlive { .. }
            | CpsError::CpsDestroyed
            | CpsError::InvalidState { .. } => ResultCode::Invalid,

            CpsError::Io { .. } => ResultCode::IoErr,
            CpsError::Internal { .. } => ResultCode::Internal,
        }
    }

    pub fn bad_arg(reason: impl Into<String>) -> Self {
        CpsError::BadArg {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CpsError::Internal {
            message: message.into(),
        }
    }
}

impl From<std::collections::TryReserveError> for CpsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        CpsError::OutOfMemory { what: "table" }
    }
}

impl From<serde_json::Error> for CpsError {
    fn from(err: serde_json::Error) -> Self {
        CpsError::Internal {
            message: format!("serialization failed: {err}"),
        }
    }
}

impl From<toml::de::Error> for CpsError {
    fn from(err: toml::de::Error) -> Self {
        CpsError::Config {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CpsError {
    fn from(err: std::io::Error) -> Self {
        CpsError::Io {
            message: err.to_string(),
        }
    }
}
