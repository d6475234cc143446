//! Exploration contexts with boundary logging.
//!
//! An exploration context snapshots a CPS into an immutable
//! [`Instance`], allocates one contiguous cost-context batch per
//! (cost functor, variation) entry, and owns the driver-side solver built
//! from that data. Later CPS mutations never reach an existing context;
//! create a new one to observe them.
//!
//! ## Logging Ownership
//!
//! Every public operation here is an engine boundary:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

use cpsx_core::{
    log_op_end, log_op_error, log_op_start, ChildLink, ContextInit, CostContexts, Cps, CpsChild,
    CpsError, Instance, InstanceRequest, PSpaceParams, Result, Values,
};
use cpsx_core_types::{AttribKind, PSpaceUid, VariationUid};

use crate::device::DriverHandle;
use crate::driver::{DriverSolver, SolveReport, SolveStatus};
use crate::options::SolveOptions;

/// Coordinate conversion between pspaces
pub trait PSpaceConversion: Send + Sync {
    /// Convert the points packed in `src` from `from` to `to`
    ///
    /// `src` holds `k × from.components()` scalars and `dst` exactly
    /// `k × to.components()`, for the same `k` points in the same order.
    fn convert(&self, from: &PSpaceParams, to: &PSpaceParams, src: &[f64], dst: &mut [f64])
        -> Result<()>;
}

/// Variation application on coordinates expressed in `pspace`
pub trait VariationApply: Send + Sync {
    /// Transform the packed points of `coords` in place
    fn apply(&self, pspace: &PSpaceParams, variation: VariationUid, coords: &mut [f64])
        -> Result<()>;
}

/// Exploration parameters
#[derive(Clone)]
pub struct ExplorationParams {
    /// Pspace the optimization runs in; Values objects must use it too
    pub pspace: PSpaceUid,
    /// Required as soon as more than one pspace is declared
    pub conversion: Option<Arc<dyn PSpaceConversion>>,
    /// Required when `variations` is non-empty
    pub variation_apply: Option<Arc<dyn VariationApply>>,
    /// Variations to explore besides the plain coordinates
    pub variations: Vec<VariationUid>,
    pub options: SolveOptions,
}

impl ExplorationParams {
    pub fn new(pspace: PSpaceUid) -> Self {
        Self {
            pspace,
            conversion: None,
            variation_apply: None,
            variations: Vec::new(),
            options: SolveOptions::default(),
        }
    }

    pub fn with_conversion(mut self, conversion: Arc<dyn PSpaceConversion>) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn with_variations(
        mut self,
        apply: Arc<dyn VariationApply>,
        variations: impl IntoIterator<Item = VariationUid>,
    ) -> Self {
        self.variation_apply = Some(apply);
        self.variations = variations.into_iter().collect();
        self
    }

    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }
}

impl std::fmt::Debug for ExplorationParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorationParams")
            .field("pspace", &self.pspace)
            .field("conversion", &self.conversion.is_some())
            .field("variation_apply", &self.variation_apply.is_some())
            .field("variations", &self.variations)
            .field("options", &self.options)
            .finish()
    }
}

/// Everything a driver needs to solve one exploration
///
/// Shared between the context and its driver solver. Cost contexts are
/// cleaned exactly once, when the data drops or its CPS is destroyed.
pub struct ExplorationData {
    cps: Cps,
    pspace: PSpaceParams,
    instance: Instance,
    params: ExplorationParams,
    /// One batch per instance entry; `None` once cleaned
    contexts: RwLock<Option<Vec<CostContexts>>>,
}

impl ExplorationData {
    pub fn cps(&self) -> &Cps {
        &self.cps
    }

    /// Exploration pspace
    pub fn pspace(&self) -> &PSpaceParams {
        &self.pspace
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn params(&self) -> &ExplorationParams {
        &self.params
    }

    pub fn options(&self) -> &SolveOptions {
        &self.params.options
    }

    /// Convert packed points from the exploration pspace to `target`, then
    /// apply `variation`
    ///
    /// # Errors
    /// * `BadArg` - a conversion or variation callback is needed but missing
    /// * whatever the callbacks return
    pub fn convert_from_explored(
        &self,
        src: &[f64],
        target: &PSpaceParams,
        variation: Option<VariationUid>,
        dst: &mut [f64],
    ) -> Result<()> {
        if target.uid == self.pspace.uid {
            dst.copy_from_slice(src);
        } else {
            let conversion = self.params.conversion.as_ref().ok_or_else(|| CpsError::BadArg {
                reason: format!("no conversion from {} to {}", self.pspace.uid, target.uid),
            })?;
            conversion.convert(&self.pspace, target, src, dst)?;
        }
        if let Some(variation) = variation {
            let apply = self.params.variation_apply.as_ref().ok_or_else(|| CpsError::BadArg {
                reason: format!("no variation callback for {variation}"),
            })?;
            apply.apply(target, variation, dst)?;
        }
        Ok(())
    }

    /// Run `f` over the cost-context batches
    ///
    /// # Errors
    /// * `Invalid` - the batches were cleaned because the CPS was destroyed
    /// * whatever `f` returns
    pub fn with_contexts<R>(&self, f: impl FnOnce(&[CostContexts]) -> Result<R>) -> Result<R> {
        let guard = self
            .contexts
            .read()
            .map_err(|_| CpsError::internal("cost context lock poisoned"))?;
        match guard.as_deref() {
            Some(batches) => f(batches),
            None => Err(CpsError::CpsDestroyed),
        }
    }

    fn clean_contexts(&self) {
        let taken = match self.contexts.write() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(mut batches) = taken {
            clean_batches(&self.instance, &mut batches);
        }
    }
}

impl Drop for ExplorationData {
    fn drop(&mut self) {
        self.clean_contexts();
    }
}

impl std::fmt::Debug for ExplorationData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorationData")
            .field("pspace", &self.pspace.uid)
            .field("points", &self.instance.points().len())
            .field("entries", &self.instance.entries().len())
            .finish_non_exhaustive()
    }
}

fn clean_batches(instance: &Instance, batches: &mut [CostContexts]) {
    for (entry, batch) in instance.entries().iter().zip(batches.iter_mut()) {
        entry.params.functor.contexts_clean(batch);
    }
}

/// Allocate and seed one context batch per entry
///
/// On failure the batches seeded so far are cleaned before returning.
fn init_contexts(instance: &Instance) -> Result<Vec<CostContexts>> {
    let entries = instance.entries();
    let mut batches = Vec::new();
    batches.try_reserve_exact(entries.len())?;
    for entry in entries {
        batches.push(entry.params.alloc_contexts(entry.relationships.len())?);
    }

    for (i, (entry, batch)) in entries.iter().zip(batches.iter_mut()).enumerate() {
        let init = ContextInit {
            pspace: entry.params.pspace,
            variation: entry.variation,
            relationships: &entry.relationships,
        };
        if let Err(e) = entry.params.functor.contexts_init(&init, batch) {
            tracing::debug!(entry = i, "cost context init failed, rolling back");
            clean_batches(instance, &mut batches[..i]);
            return Err(e);
        }
    }
    Ok(batches)
}

struct ExplorationShared {
    data: Arc<ExplorationData>,
    solver: Box<dyn DriverSolver>,
    driver: String,
    torn_down: AtomicBool,
    link: ChildLink,
}

impl CpsChild for ExplorationShared {
    fn kind(&self) -> &'static str {
        "exploration"
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::Release);
        self.data.clean_contexts();
    }
}

/// Exploration of one CPS snapshot through one driver
pub struct ExplorationContext {
    shared: Arc<ExplorationShared>,
}

impl ExplorationContext {
    /// Snapshot `cps` and prepare a solver on `driver`
    ///
    /// # Errors
    /// * `BadArg` - no pspace declared, several pspaces without a conversion
    ///   callback, variations without an application callback, or invalid
    ///   solve options
    /// * `NotFound` - the exploration pspace is not declared
    /// * `NotSupported` - the driver cannot handle the pspace's attribute types
    /// * `Invalid` - the CPS was destroyed
    /// * `MemErr` - instance or context allocation failed
    pub fn create(cps: &Cps, driver: &DriverHandle, params: ExplorationParams) -> Result<Self> {
        log_op_start!(
            "exploration_create",
            pspace = %params.pspace,
            driver = driver.module()
        );
        let start = Instant::now();

        let result = Self::create_impl(cps, driver, params).map_err(|e| {
            log_op_error!(
                "exploration_create",
                e,
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        let instance = result.instance();
        log_op_end!(
            "exploration_create",
            duration_ms = start.elapsed().as_millis() as u64,
            point_count = instance.points().len(),
            relshp_count = instance.relationships().len(),
            costs_needed = instance.costs_needed()
        );
        Ok(result)
    }

    fn create_impl(cps: &Cps, driver: &DriverHandle, params: ExplorationParams) -> Result<Self> {
        params.options.validate()?;

        let (pspace, instance) = {
            let store = cps.read()?;
            let declared = store.pspaces();
            if declared.is_empty() {
                return Err(CpsError::BadArg {
                    reason: "no pspace declared".to_string(),
                });
            }
            if declared.len() > 1 && params.conversion.is_none() {
                return Err(CpsError::BadArg {
                    reason: format!(
                        "{} pspaces declared but no conversion callback supplied",
                        declared.len()
                    ),
                });
            }
            if !params.variations.is_empty() && params.variation_apply.is_none() {
                return Err(CpsError::BadArg {
                    reason: "variations requested without a variation callback".to_string(),
                });
            }
            let pspace = store.pspace(params.pspace)?.clone();
            let request = InstanceRequest {
                variations: params.variations.clone(),
            };
            (pspace, Instance::build(&store, &request)?)
        };

        let engine = driver.driver();
        for attrib in AttribKind::ALL {
            let scalar = pspace.layout.desc(attrib).scalar;
            if !engine.supports(attrib, scalar) {
                return Err(CpsError::NotSupported {
                    reason: format!(
                        "driver {} cannot handle {attrib:?} stored as {scalar:?}",
                        engine.name()
                    ),
                });
            }
        }

        let contexts = init_contexts(&instance)?;
        let data = Arc::new(ExplorationData {
            cps: cps.clone(),
            pspace,
            instance,
            params,
            contexts: RwLock::new(Some(contexts)),
        });

        let solver = engine.prepare(Arc::clone(&data))?;
        let link = cps.attach_child("exploration")?;
        let shared = Arc::new(ExplorationShared {
            data,
            solver,
            driver: driver.module().to_string(),
            torn_down: AtomicBool::new(false),
            link,
        });
        let weak: Weak<dyn CpsChild> = Arc::downgrade(&shared) as Weak<dyn CpsChild>;
        shared.link.bind(weak);
        Ok(Self { shared })
    }

    pub fn instance(&self) -> &Instance {
        self.shared.data.instance()
    }

    pub fn data(&self) -> &Arc<ExplorationData> {
        &self.shared.data
    }

    /// Exploration pspace
    pub fn pspace(&self) -> PSpaceUid {
        self.shared.data.pspace.uid
    }

    pub fn params(&self) -> &ExplorationParams {
        self.shared.data.params()
    }

    pub fn options(&self) -> &SolveOptions {
        self.shared.data.options()
    }

    /// Semantic digest of the instance
    pub fn digest(&self) -> &str {
        self.shared.data.instance.digest()
    }

    pub fn driver(&self) -> &str {
        &self.shared.driver
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shared.torn_down.load(Ordering::Acquire) {
            return Err(CpsError::CpsDestroyed);
        }
        self.shared.link.ensure_alive()
    }

    fn check_values(&self, values: &Values) -> Result<()> {
        self.ensure_alive()?;
        if !values.cps().same_as(&self.shared.data.cps) {
            return Err(CpsError::BadArg {
                reason: "values belong to another CPS".to_string(),
            });
        }
        if values.pspace() != self.pspace() {
            return Err(CpsError::BadArg {
                reason: format!(
                    "values use {} but the exploration runs in {}",
                    values.pspace(),
                    self.pspace()
                ),
            });
        }
        Ok(())
    }

    /// Monolithic solve starting from the coordinates in `values`
    ///
    /// # Errors
    /// * `BadArg` - `values` belong to another CPS or pspace
    /// * `Busy` - `values` is locked, or another solve is in flight
    /// * `NotConverged` / `NumericalIssue` - solver outcome after every try
    pub fn solve(&self, values: &Values) -> Result<SolveReport> {
        log_op_start!("exploration_solve", pspace = %self.pspace());
        let start = Instant::now();

        let result = self
            .check_values(values)
            .and_then(|()| self.shared.solver.solve(values))
            .map_err(|e| {
                log_op_error!(
                    "exploration_solve",
                    e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;

        log_op_end!(
            "exploration_solve",
            duration_ms = start.elapsed().as_millis() as u64,
            iteration = result.iterations,
            cost = result.cost,
            status = ?result.status
        );
        Ok(result)
    }

    /// Start an iterative solve from the coordinates in `values`
    ///
    /// # Errors
    /// * `BadArg` - `values` belong to another CPS or pspace
    /// * `Busy` - `values` is locked, or a solve is already in flight
    /// * `NumericalIssue` - the start point evaluates to non-finite costs
    pub fn begin(&self, values: &Values) -> Result<()> {
        log_op_start!("exploration_begin", pspace = %self.pspace());
        let start = Instant::now();

        self.check_values(values)
            .and_then(|()| self.shared.solver.begin(values))
            .map_err(|e| {
                log_op_error!(
                    "exploration_begin",
                    e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;

        log_op_end!(
            "exploration_begin",
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(())
    }

    /// Run one solver iteration
    ///
    /// # Errors
    /// * `NotReady` - no solve in flight
    /// * `Busy` - another caller is stepping or ending the same solve
    pub fn step(&self) -> Result<SolveStatus> {
        log_op_start!("exploration_step");
        let start = Instant::now();

        let status = self
            .ensure_alive()
            .and_then(|()| self.shared.solver.step())
            .map_err(|e| {
                log_op_error!(
                    "exploration_step",
                    e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;

        log_op_end!(
            "exploration_step",
            duration_ms = start.elapsed().as_millis() as u64,
            status = ?status
        );
        Ok(status)
    }

    /// Finish the solve in flight; its result is published only on convergence
    ///
    /// # Errors
    /// * `NotReady` - no solve in flight
    /// * `Busy` - the solve is being stepped concurrently
    /// * `NotConverged` / `NumericalIssue` / `BadArg` - solver outcome
    pub fn end(&self) -> Result<SolveReport> {
        log_op_start!("exploration_end");
        let start = Instant::now();

        let report = self
            .ensure_alive()
            .and_then(|()| self.shared.solver.end())
            .map_err(|e| {
                log_op_error!(
                    "exploration_end",
                    e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;

        log_op_end!(
            "exploration_end",
            duration_ms = start.elapsed().as_millis() as u64,
            iteration = report.iterations,
            cost = report.cost
        );
        Ok(report)
    }

    /// Write the last published coordinates through `values`
    ///
    /// # Errors
    /// * `BadArg` - `values` belong to another CPS or pspace
    /// * `NotReady` - nothing has been published yet
    /// * `Busy` - `values` is locked or the result slot is momentarily claimed
    pub fn last_results_retrieve(&self, values: &Values) -> Result<()> {
        log_op_start!("exploration_retrieve");
        let start = Instant::now();

        self.check_values(values)
            .and_then(|()| self.shared.solver.last_results_retrieve(values))
            .map_err(|e| {
                log_op_error!(
                    "exploration_retrieve",
                    e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;

        log_op_end!(
            "exploration_retrieve",
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(())
    }

    pub fn status(&self) -> SolveStatus {
        self.shared.solver.status()
    }
}

impl std::fmt::Debug for ExplorationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorationContext")
            .field("driver", &self.shared.driver)
            .field("data", &self.shared.data)
            .field("status", &self.status())
            .finish()
    }
}
