//! Locked accessor view over point attributes
//!
//! A [`Values`] object never stores attribute data itself. It forwards every
//! read and write to caller-supplied accessors, guarded by a single-owner
//! non-blocking lock: [`Values::lock`] performs one compare-and-swap and
//! fails with `Busy` immediately if another holder owns the lock.

mod memory;

pub use memory::InMemoryAttribs;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use cpsx_core_types::{AttribKind, PSpaceUid, PointId, ScalarBuf, ScalarSlice, ScalarSliceMut};

use crate::cps::{ChildLink, Cps, CpsChild};
use crate::errors::{CpsError, Result};
use crate::model::PSpaceParams;

/// Accessor serving every attribute through one pair of callbacks
pub trait AttribAccessor: Send {
    /// Fill `out` with `ids.len() × components` scalars of `attrib`, in id order
    fn get(&mut self, attrib: AttribKind, ids: &[PointId], out: ScalarSliceMut<'_>) -> Result<()>;

    /// Store `ids.len() × components` scalars of `attrib`, in id order
    fn set(&mut self, attrib: AttribKind, ids: &[PointId], data: ScalarSlice<'_>) -> Result<()>;
}

/// Accessor dedicated to a single attribute
pub trait ComponentAccessor: Send {
    fn get(&mut self, ids: &[PointId], out: ScalarSliceMut<'_>) -> Result<()>;
    fn set(&mut self, ids: &[PointId], data: ScalarSlice<'_>) -> Result<()>;
}

/// Storage discriminator
pub enum ValuesStorage {
    Global(Box<dyn AttribAccessor>),
    PerAttribute {
        coords: Box<dyn ComponentAccessor>,
        lock_status: Box<dyn ComponentAccessor>,
    },
}

impl ValuesStorage {
    fn get(&mut self, attrib: AttribKind, ids: &[PointId], out: ScalarSliceMut<'_>) -> Result<()> {
        match self {
            ValuesStorage::Global(accessor) => accessor.get(attrib, ids, out),
            ValuesStorage::PerAttribute {
                coords,
                lock_status,
            } => match attrib {
                AttribKind::Coords => coords.get(ids, out),
                AttribKind::LockStatus => lock_status.get(ids, out),
            },
        }
    }

    fn set(&mut self, attrib: AttribKind, ids: &[PointId], data: ScalarSlice<'_>) -> Result<()> {
        match self {
            ValuesStorage::Global(accessor) => accessor.set(attrib, ids, data),
            ValuesStorage::PerAttribute {
                coords,
                lock_status,
            } => match attrib {
                AttribKind::Coords => coords.set(ids, data),
                AttribKind::LockStatus => lock_status.set(ids, data),
            },
        }
    }
}

/// Access requested when locking
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LockMode {
    Read,
    Write,
    ReadWrite,
}

impl LockMode {
    pub fn can_read(self) -> bool {
        matches!(self, LockMode::Read | LockMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, LockMode::Write | LockMode::ReadWrite)
    }
}

/// Handle proving ownership of a [`Values`] lock
///
/// Only the exact handle returned by [`Values::lock`] unlocks it.
#[derive(Debug, PartialEq, Eq)]
pub struct ValuesLock {
    token: u64,
    mode: LockMode,
}

impl ValuesLock {
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

/// Tokens are unique across every Values object of the process, so a handle
/// issued by one object never unlocks another.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

const UNLOCKED: u64 = 0;

struct ValuesShared {
    pspace: PSpaceParams,
    /// Token of the current holder, or `UNLOCKED`
    owner: AtomicU64,
    storage: Mutex<ValuesStorage>,
    torn_down: AtomicBool,
    link: ChildLink,
}

impl CpsChild for ValuesShared {
    fn kind(&self) -> &'static str {
        "values"
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::Release);
    }
}

/// Point attribute view bound to one pspace of one CPS
///
/// Cloning shares the same lock and storage.
#[derive(Clone)]
pub struct Values {
    shared: Arc<ValuesShared>,
}

impl Values {
    /// Create a Values object over `storage` for points expressed in `pspace`
    ///
    /// # Errors
    /// * `NotFound` - `pspace` is not declared in `cps`
    /// * `Invalid` - `cps` was destroyed
    pub fn create(cps: &Cps, pspace: PSpaceUid, storage: ValuesStorage) -> Result<Self> {
        let params = cps.pspace_get(pspace)?;
        let link = cps.attach_child("values")?;
        let shared = Arc::new(ValuesShared {
            pspace: params,
            owner: AtomicU64::new(UNLOCKED),
            storage: Mutex::new(storage),
            torn_down: AtomicBool::new(false),
            link,
        });
        let weak: Weak<dyn CpsChild> = Arc::downgrade(&shared) as Weak<dyn CpsChild>;
        shared.link.bind(weak);
        Ok(Self { shared })
    }

    pub fn pspace(&self) -> PSpaceUid {
        self.shared.pspace.uid
    }

    pub fn pspace_params(&self) -> &PSpaceParams {
        &self.shared.pspace
    }

    pub fn cps(&self) -> &Cps {
        self.shared.link.cps()
    }

    pub fn is_locked(&self) -> bool {
        self.shared.owner.load(Ordering::Acquire) != UNLOCKED
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shared.torn_down.load(Ordering::Acquire) {
            return Err(CpsError::CpsDestroyed);
        }
        self.shared.link.ensure_alive()
    }

    /// Claim the lock without waiting
    ///
    /// # Errors
    /// * `Busy` - another holder owns the lock
    /// * `Invalid` - the owning CPS was destroyed
    pub fn lock(&self, mode: LockMode) -> Result<ValuesLock> {
        self.ensure_alive()?;
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.shared
            .owner
            .compare_exchange(UNLOCKED, token, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CpsError::ValuesBusy)?;
        Ok(ValuesLock { token, mode })
    }

    /// Release the lock held by `handle`
    ///
    /// # Errors
    /// * `BadArg` - the object is not locked
    /// * `Invalid` - `handle` was not issued by the current lock
    pub fn unlock(&self, handle: &ValuesLock) -> Result<()> {
        match self.shared.owner.compare_exchange(
            handle.token,
            UNLOCKED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(UNLOCKED) => {
                tracing::error!("unlock of a Values object that is not locked");
                Err(CpsError::NotLocked)
            }
            Err(_) => {
                tracing::error!("unlock with a foreign or stale lock handle");
                Err(CpsError::ForeignLockHandle)
            }
        }
    }

    fn check_handle(&self, handle: &ValuesLock) -> Result<()> {
        match self.shared.owner.load(Ordering::Acquire) {
            UNLOCKED => Err(CpsError::NotLocked),
            token if token == handle.token => Ok(()),
            _ => Err(CpsError::ForeignLockHandle),
        }
    }

    fn check_buffer(
        &self,
        attrib: AttribKind,
        ids: &[PointId],
        scalar: cpsx_core_types::ScalarType,
        len: usize,
    ) -> Result<()> {
        let desc = self.shared.pspace.layout.desc(attrib);
        if scalar != desc.scalar {
            return Err(CpsError::ScalarTypeMismatch {
                attrib,
                expected: desc.scalar,
                found: scalar,
            });
        }
        let expected = ids.len() * desc.count;
        if len != expected {
            return Err(CpsError::BufferShapeMismatch {
                attrib,
                expected,
                found: len,
            });
        }
        Ok(())
    }

    /// Read `attrib` of `ids` into `out`
    ///
    /// # Errors
    /// * `BadArg` - wrong buffer width or scalar type, or not locked
    /// * `NotAuthorized` - the lock was taken without read access
    /// * `Invalid` - foreign handle, or the owning CPS was destroyed
    pub fn get(
        &self,
        handle: &ValuesLock,
        attrib: AttribKind,
        ids: &[PointId],
        out: ScalarSliceMut<'_>,
    ) -> Result<()> {
        self.ensure_alive()?;
        self.check_handle(handle)?;
        if !handle.mode.can_read() {
            return Err(CpsError::LockModeDenied { needed: "read" });
        }
        self.check_buffer(attrib, ids, out.scalar_type(), out.len())?;
        self.shared
            .storage
            .lock()
            .map_err(|_| CpsError::internal("values storage lock poisoned"))?
            .get(attrib, ids, out)
    }

    /// Write `data` as `attrib` of `ids`
    ///
    /// # Errors
    /// * `BadArg` - wrong buffer width or scalar type, or not locked
    /// * `NotAuthorized` - the lock was taken without write access
    /// * `Invalid` - foreign handle, or the owning CPS was destroyed
    pub fn set(
        &self,
        handle: &ValuesLock,
        attrib: AttribKind,
        ids: &[PointId],
        data: ScalarSlice<'_>,
    ) -> Result<()> {
        self.ensure_alive()?;
        self.check_handle(handle)?;
        if !handle.mode.can_write() {
            return Err(CpsError::LockModeDenied { needed: "write" });
        }
        self.check_buffer(attrib, ids, data.scalar_type(), data.len())?;
        self.shared
            .storage
            .lock()
            .map_err(|_| CpsError::internal("values storage lock poisoned"))?
            .set(attrib, ids, data)
    }

    /// Read `attrib` of `ids`, widened to `f64`
    ///
    /// # Errors
    /// Same as [`Values::get`].
    pub fn get_f64(&self, handle: &ValuesLock, attrib: AttribKind, ids: &[PointId]) -> Result<Vec<f64>> {
        let desc = self.shared.pspace.layout.desc(attrib);
        let mut buf = ScalarBuf::zeroed(desc.scalar, ids.len() * desc.count);
        self.get(handle, attrib, ids, buf.as_mut_slice())?;
        Ok(buf.to_f64_vec())
    }

    /// Write `values`, narrowed to the layout's scalar type, as `attrib` of `ids`
    ///
    /// # Errors
    /// Same as [`Values::set`].
    pub fn set_f64(
        &self,
        handle: &ValuesLock,
        attrib: AttribKind,
        ids: &[PointId],
        values: &[f64],
    ) -> Result<()> {
        let desc = self.shared.pspace.layout.desc(attrib);
        let buf = ScalarBuf::from_f64(desc.scalar, values);
        self.set(handle, attrib, ids, buf.as_slice())
    }
}

impl std::fmt::Debug for Values {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Values")
            .field("pspace", &self.shared.pspace.uid)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}
