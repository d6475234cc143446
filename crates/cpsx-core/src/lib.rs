//! cpsx Core - Constrained parameter space bookkeeping
//!
//! This crate provides the in-memory kernel the exploration engine works on:
//! - Parameter spaces, points, cost functor registrations and relationships
//!   with reusable ids and validate-then-mutate batch operations
//! - Relationship groups with bulk state control
//! - The shared [`Cps`] handle and its child registry
//! - [`Values`], a locked accessor view over point attributes
//! - Immutable instance snapshots with a semantic digest
//! - The error and logging facilities shared by every cpsx crate

pub mod cps;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod ops;
pub mod snapshot;
pub mod values;

pub use cpsx_core_types::schema;

// Re-export commonly used types
pub use cps::{ChildLink, Cps, CpsChild};
pub use errors::{CpsError, Result, ResultCode};
pub use model::{
    BatchRelshp, ContextInit, ContextTypeInfo, CostArity, CostBinding, CostContexts, CostEval,
    CostFunctor, CostFunctorParams, GroupState, PSpaceParams, RelshpKind, RelshpParams,
};
pub use ops::CpsStore;
pub use snapshot::{FunctorEntry, Instance, InstanceRelshp, InstanceRequest};
pub use values::{
    AttribAccessor, ComponentAccessor, InMemoryAttribs, LockMode, Values, ValuesLock,
    ValuesStorage,
};
