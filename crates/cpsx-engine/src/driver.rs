//! Driver abstraction
//!
//! A driver is the replaceable backend doing the numerical solve. The engine
//! talks to it through two traits: [`Driver`], loaded once per device module,
//! and [`DriverSolver`], built by [`Driver::prepare`] for one exploration.
//!
//! Modules expose a single entry point of type [`DriverEntryPoint`]. A
//! dynamic-library host would resolve it under [`DRIVER_ENTRY_POINT`]; the
//! [`crate::Device`] registry maps module names straight to entry points.

use std::sync::Arc;

use cpsx_core::logging_facility::Profile;
use cpsx_core::{ResultCode, Result, Values};
use cpsx_core_types::{AttribKind, ScalarType};

use crate::exploration::ExplorationData;

/// Symbol name a driver library exports its entry point under
pub const DRIVER_ENTRY_POINT: &str = "cpsx_driver_entry";

/// Parameters handed to a driver entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInitParams {
    /// Module name the driver is loaded under
    pub module: String,
    /// Logging profile of the loading device
    pub log_profile: Option<Profile>,
}

/// Driver module entry point
pub type DriverEntryPoint = fn(&DriverInitParams) -> Result<Box<dyn Driver>>;

/// Solver backend
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the driver can read and write `attrib` stored as `scalar`
    fn supports(&self, attrib: AttribKind, scalar: ScalarType) -> bool;

    /// Build a solver for one exploration
    ///
    /// # Errors
    /// Driver specific; `BadArg` for an exploration the driver cannot handle.
    fn prepare(&self, data: Arc<ExplorationData>) -> Result<Box<dyn DriverSolver>>;

    /// Release driver-wide resources; called once when the driver is unloaded
    fn clean(&self) {}
}

/// Engine-level solve status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    NotStarted,
    Running,
    Converged,
    NotConverged,
    Failed(ResultCode),
}

impl SolveStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, SolveStatus::NotStarted | SolveStatus::Running)
    }
}

/// Summary of a finished solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    /// Outer iterations of the final try
    pub iterations: u32,
    /// Residual evaluations of the final try
    pub evaluations: u32,
    /// Sum of squared costs at the returned point
    pub cost: f64,
    /// Tries used, counting the final one
    pub tries: u32,
}

/// Driver-side solver for one exploration
///
/// Every method takes `&self`: the solver coordinates concurrent callers
/// itself and never blocks. Contention surfaces as `Busy`, missing results
/// as `NotReady`.
pub trait DriverSolver: Send + Sync {
    /// Begin, step until finished, end; retried from the latest point on
    /// non-convergence up to the configured number of tries
    fn solve(&self, values: &Values) -> Result<SolveReport>;

    /// Read the start point through `values` and claim a result slot
    fn begin(&self, values: &Values) -> Result<()>;

    /// Run one iteration of the solve in flight
    fn step(&self) -> Result<SolveStatus>;

    /// Finish the solve in flight, publishing its result only on convergence
    fn end(&self) -> Result<SolveReport>;

    /// Write the coordinates of the last published result through `values`
    fn last_results_retrieve(&self, values: &Values) -> Result<()>;

    fn status(&self) -> SolveStatus;
}
