//! Core types shared across cpsx crates
//!
//! This crate provides the vocabulary used by the CPS store, the exploration
//! engine and the logging facility:
//!
//! - **Identifiers**: caller-chosen UIDs and pool-minted ids, each with an
//!   `INVALID` sentinel
//! - **Attributes**: attribute kinds, scalar types, layouts and tagged buffers
//! - **Schema constants**: Canonical field keys and event names

pub mod attrib;
pub mod ids;
pub mod schema;

pub use attrib::{
    AttribDesc, AttribKind, AttribLayout, ScalarBuf, ScalarSlice, ScalarSliceMut, ScalarType,
};
pub use ids::{
    CostFunctorId, CostFunctorUid, PSpaceUid, PointId, RelshpGroupUid, RelshpId, VariationUid,
};
