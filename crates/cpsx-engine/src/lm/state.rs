//! Triple-buffered solver state
//!
//! Three run slots rotate between three roles: the run in flight (`curr`),
//! the last converged run (`last`) and the one before it (`prev_last`). The
//! role indices only change while the internal flag is held; the flag is
//! claimed with a compare-and-swap and never waited on. Slot contents are
//! guarded by per-slot mutexes that are only ever `try_lock`ed, so every
//! contention surfaces as `Busy` instead of blocking.
//!
//! A reader of `last` claims its slot under the flag and copies outside it.
//! `begin` never reuses `last` or `prev_last`, so a reader that grabbed the
//! previous result cannot collide with a new solve. `solve` owns its run
//! from begin to end and spins on the flag and on its slot instead of
//! failing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use cpsx_core::{CpsError, LockMode, ResultCode, Result, Values};
use cpsx_core_types::AttribKind;

use super::problem::Problem;
use super::solver::LmRun;
use crate::driver::{DriverSolver, SolveReport, SolveStatus};
use crate::exploration::ExplorationData;

const NONE: usize = usize::MAX;
const SLOTS: usize = 3;

type Slot = Mutex<Option<LmRun>>;

/// How to claim the internal flag and the slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// Fail with `Busy` on contention
    Try,
    /// Spin until released; only used by `solve`, which owns the run in flight
    Spin,
}

/// Held while the role indices are read or changed
struct InternalGuard<'a>(&'a AtomicBool);

impl Drop for InternalGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Levenberg-Marquardt solver of one exploration
pub struct LmSolver {
    problem: Problem,
    slots: [Slot; SLOTS],
    internal: AtomicBool,
    curr: AtomicUsize,
    last: AtomicUsize,
    prev_last: AtomicUsize,
    status: Mutex<SolveStatus>,
}

impl LmSolver {
    /// # Errors
    /// * `NotFound` / `Internal` - the instance layout is inconsistent
    pub fn new(data: Arc<ExplorationData>) -> Result<Self> {
        Ok(Self {
            problem: Problem::new(data)?,
            slots: [Mutex::new(None), Mutex::new(None), Mutex::new(None)],
            internal: AtomicBool::new(false),
            curr: AtomicUsize::new(NONE),
            last: AtomicUsize::new(NONE),
            prev_last: AtomicUsize::new(NONE),
            status: Mutex::new(SolveStatus::NotStarted),
        })
    }

    fn data(&self) -> &ExplorationData {
        self.problem.data()
    }

    fn lock_internal(&self, claim: Claim) -> Result<InternalGuard<'_>> {
        while self
            .internal
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            if claim == Claim::Try {
                return Err(CpsError::ExplorationBusy {
                    reason: "solver state claimed by another caller",
                });
            }
            std::hint::spin_loop();
        }
        Ok(InternalGuard(&self.internal))
    }

    fn claim_slot(&self, index: usize, claim: Claim) -> Result<MutexGuard<'_, Option<LmRun>>> {
        loop {
            match self.slots[index].try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) if claim == Claim::Spin => std::hint::spin_loop(),
                Err(TryLockError::WouldBlock) => {
                    return Err(CpsError::ExplorationBusy {
                        reason: "result slot in use",
                    })
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(CpsError::internal("result slot poisoned"))
                }
            }
        }
    }

    fn set_status(&self, status: SolveStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    /// Coordinates and unlocked dense indices read through `values`
    fn read_start(&self, values: &Values) -> Result<(Vec<f64>, Vec<usize>)> {
        let points = self.data().instance().points();
        let handle = values.lock(LockMode::Read)?;
        let read = values
            .get_f64(&handle, AttribKind::Coords, points)
            .and_then(|coords| {
                values
                    .get_f64(&handle, AttribKind::LockStatus, points)
                    .map(|locks| (coords, locks))
            });
        values.unlock(&handle)?;
        let (coords, locks) = read?;

        let lc = values.pspace_params().layout.lock_status.count;
        let unlocked = (0..points.len()).filter(|i| locks[i * lc] == 0.0).collect();
        Ok((coords, unlocked))
    }

    fn begin_from(&self, full: Vec<f64>, unlocked: Vec<usize>, claim: Claim) -> Result<()> {
        if self.curr.load(Ordering::Acquire) != NONE {
            return Err(CpsError::ExplorationBusy {
                reason: "a solve is already in flight",
            });
        }
        let run = LmRun::start(&self.problem, full, unlocked, self.data().options())?;
        let status = run.status.solve_status();

        let _guard = self.lock_internal(claim)?;
        if self.curr.load(Ordering::Acquire) != NONE {
            return Err(CpsError::ExplorationBusy {
                reason: "a solve is already in flight",
            });
        }
        let last = self.last.load(Ordering::Acquire);
        let prev_last = self.prev_last.load(Ordering::Acquire);
        let index = (0..SLOTS)
            .find(|i| *i != last && *i != prev_last)
            .ok_or_else(|| CpsError::internal("no free result slot"))?;
        *self.claim_slot(index, claim)? = Some(run);
        self.curr.store(index, Ordering::Release);
        self.set_status(status);
        tracing::debug!(slot = index, "solve started");
        Ok(())
    }

    /// Close the run in flight; returns its report and final coordinates
    fn end_run(&self, claim: Claim) -> Result<(SolveReport, Vec<f64>)> {
        let _guard = self.lock_internal(claim)?;
        let index = self.curr.load(Ordering::Acquire);
        if index == NONE {
            return Err(CpsError::NotReady {
                reason: "no solve in flight",
            });
        }
        let mut slot = self.claim_slot(index, claim)?;
        let run = slot
            .as_ref()
            .ok_or_else(|| CpsError::internal("solve in flight has an empty slot"))?;

        let status = match run.status.solve_status() {
            SolveStatus::Running | SolveStatus::NotStarted => SolveStatus::NotConverged,
            other => other,
        };
        let report = SolveReport {
            status,
            iterations: run.iterations,
            evaluations: run.evaluations,
            cost: run.cost(),
            tries: 1,
        };
        let full = run.full.clone();

        if status == SolveStatus::Converged {
            self.prev_last
                .store(self.last.load(Ordering::Acquire), Ordering::Release);
            self.last.store(index, Ordering::Release);
            tracing::debug!(slot = index, "result published");
        } else {
            *slot = None;
        }
        self.curr.store(NONE, Ordering::Release);
        self.set_status(status);
        Ok((report, full))
    }

    fn outcome(report: SolveReport) -> Result<SolveReport> {
        match report.status {
            SolveStatus::Converged => Ok(report),
            SolveStatus::Failed(ResultCode::NumericalIssue) => Err(CpsError::NumericalIssue {
                reason: format!("non-finite costs after {} iterations", report.iterations),
            }),
            SolveStatus::Failed(_) => Err(CpsError::bad_arg(
                "exploration has no unlocked coordinates or no costs",
            )),
            _ => Err(CpsError::NotConverged {
                tries: report.tries,
            }),
        }
    }

    fn step_run(&self, claim: Claim) -> Result<SolveStatus> {
        let guard = self.lock_internal(claim)?;
        let index = self.curr.load(Ordering::Acquire);
        if index == NONE {
            return Err(CpsError::NotReady {
                reason: "no solve in flight",
            });
        }
        let mut slot = self.claim_slot(index, claim)?;
        drop(guard);

        let run = slot
            .as_mut()
            .ok_or_else(|| CpsError::internal("solve in flight has an empty slot"))?;
        let status = run.step(&self.problem, self.data().options())?.solve_status();
        self.set_status(status);
        Ok(status)
    }

    fn run_to_end(&self) -> Result<()> {
        while !self.step_run(Claim::Spin)?.is_finished() {}
        Ok(())
    }
}

impl DriverSolver for LmSolver {
    fn solve(&self, values: &Values) -> Result<SolveReport> {
        let (mut full, unlocked) = self.read_start(values)?;
        let max_tries = self.data().options().max_convergence_tries;
        let mut tries = 0;
        loop {
            tries += 1;
            self.begin_from(full, unlocked.clone(), Claim::Spin)?;
            if let Err(e) = self.run_to_end() {
                if let Err(cleanup) = self.end_run(Claim::Spin) {
                    tracing::debug!(error = %cleanup, "failed run left in flight");
                }
                return Err(e);
            }
            let (mut report, latest) = self.end_run(Claim::Spin)?;
            report.tries = tries;
            if report.status == SolveStatus::NotConverged && tries < max_tries {
                tracing::debug!(tries, "not converged, retrying from latest point");
                full = latest;
                continue;
            }
            return Self::outcome(report);
        }
    }

    fn begin(&self, values: &Values) -> Result<()> {
        let (full, unlocked) = self.read_start(values)?;
        self.begin_from(full, unlocked, Claim::Try)
    }

    fn step(&self) -> Result<SolveStatus> {
        self.step_run(Claim::Try)
    }

    fn end(&self) -> Result<SolveReport> {
        let (report, _) = self.end_run(Claim::Try)?;
        Self::outcome(report)
    }

    fn last_results_retrieve(&self, values: &Values) -> Result<()> {
        let guard = self.lock_internal(Claim::Try)?;
        let index = self.last.load(Ordering::Acquire);
        if index == NONE {
            return Err(CpsError::NotReady {
                reason: "no converged result published",
            });
        }
        let slot = self.claim_slot(index, Claim::Try)?;
        drop(guard);
        let full = slot
            .as_ref()
            .map(|run| run.full.clone())
            .ok_or_else(|| CpsError::internal("published slot is empty"))?;
        drop(slot);

        let points = self.data().instance().points();
        let handle = values.lock(LockMode::Write)?;
        let written = values.set_f64(&handle, AttribKind::Coords, points, &full);
        values.unlock(&handle)?;
        written
    }

    fn status(&self) -> SolveStatus {
        self.status
            .lock()
            .map(|s| *s)
            .unwrap_or(SolveStatus::Failed(ResultCode::Internal))
    }
}

impl std::fmt::Debug for LmSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmSolver")
            .field("problem", &self.problem)
            .field("curr", &self.curr.load(Ordering::Relaxed))
            .field("last", &self.last.load(Ordering::Relaxed))
            .field("status", &self.status())
            .finish()
    }
}
