//! Immutable instance snapshots of a CPS.
//!
//! An instance is a point-in-time copy of everything an exploration needs:
//! pspaces, live points, enabled relationships with resolved membership,
//! and the cost functor entries fanned out per variation. It never observes
//! later CPS mutations; build a new one to pick them up.

pub mod digest;
pub mod instance;

pub use digest::compute_instance_digest;
pub use instance::{FunctorEntry, Instance, InstanceRelshp, InstanceRequest};
