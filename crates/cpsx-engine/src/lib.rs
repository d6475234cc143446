//! cpsx Engine - Exploration and solving
//!
//! Turns a CPS into a nonlinear least-squares problem and solves it through a
//! replaceable driver:
//! - [`Device`] owns the registry of driver modules and loads drivers
//! - [`ExplorationContext`] snapshots a CPS, allocates cost contexts and
//!   owns the driver-side solver
//! - [`lm`] is the bundled dense Levenberg-Marquardt driver
//!
//! ## Logging Ownership
//!
//! This crate owns lifecycle logging (`log_op_start!` / `log_op_end!` /
//! `log_op_error!`) for driver loading and every exploration operation.
//! `cpsx-core` only emits `tracing::debug!` events.

pub mod device;
pub mod driver;
pub mod exploration;
pub mod lm;
pub mod options;

pub use device::{Device, DeviceParams, DriverHandle};
pub use driver::{
    Driver, DriverEntryPoint, DriverInitParams, DriverSolver, SolveReport, SolveStatus,
    DRIVER_ENTRY_POINT,
};
pub use exploration::{
    ExplorationContext, ExplorationData, ExplorationParams, PSpaceConversion, VariationApply,
};
pub use options::SolveOptions;
