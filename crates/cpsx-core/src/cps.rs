//! Shared CPS handle
//!
//! [`Cps`] wraps a [`CpsStore`] behind a reader/writer lock and keeps a
//! registry of the children (Values objects, exploration contexts) holding a
//! strong reference to it. Children register through [`Cps::attach_child`]
//! and unregister when their [`ChildLink`] drops.
//!
//! Two ways to let go of a CPS:
//!
//! - [`Cps::release`] drops one handle and refuses while children are
//!   registered; children must be released first.
//! - [`Cps::destroy`] tears down every registered child and marks the store
//!   destroyed, so every later operation through any handle or child fails
//!   with `CpsDestroyed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use cpsx_core_types::{
    CostFunctorId, CostFunctorUid, PSpaceUid, PointId, RelshpGroupUid, RelshpId,
};

use crate::errors::{CpsError, Result};
use crate::model::{CostFunctorParams, GroupState, PSpaceParams, RelshpParams};
use crate::ops::{functor_ops, group_ops, point_ops, pspace_ops, relshp_ops, CpsStore};

/// Object owned by a CPS that must be torn down when the CPS is destroyed
pub trait CpsChild: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Release every resource held by the child. Called at most once.
    fn teardown(&self);
}

struct ChildEntry {
    kind: &'static str,
    target: Option<Weak<dyn CpsChild>>,
}

struct CpsShared {
    store: RwLock<CpsStore>,
    children: Mutex<HashMap<u64, ChildEntry>>,
    next_child: AtomicU64,
    destroyed: AtomicBool,
}

/// Shared, cloneable handle to a constrained parameter space
#[derive(Clone)]
pub struct Cps {
    shared: Arc<CpsShared>,
}

impl Default for Cps {
    fn default() -> Self {
        Self::new()
    }
}

impl Cps {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(CpsShared {
                store: RwLock::new(CpsStore::new()),
                children: Mutex::new(HashMap::new()),
                next_child: AtomicU64::new(1),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// True when both handles refer to the same CPS
    pub fn same_as(&self, other: &Cps) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Number of registered children
    pub fn child_count(&self) -> usize {
        self.shared
            .children
            .lock()
            .map(|children| children.len())
            .unwrap_or(0)
    }

    /// Register a new child; keep the returned link alive as long as the child
    ///
    /// # Errors
    /// * `Invalid` - the CPS was destroyed
    /// * `Internal` - the registry lock is poisoned
    pub fn attach_child(&self, kind: &'static str) -> Result<ChildLink> {
        self.ensure_alive()?;
        let key = self.shared.next_child.fetch_add(1, Ordering::Relaxed);
        let mut children = self
            .shared
            .children
            .lock()
            .map_err(|_| CpsError::internal("child registry lock poisoned"))?;
        children.try_reserve(1)?;
        children.insert(key, ChildEntry { kind, target: None });
        Ok(ChildLink {
            cps: self.clone(),
            key,
        })
    }

    /// Drop this handle
    ///
    /// # Errors
    /// * `Invalid` - children are still registered; the store stays alive
    ///   through their handles until they are released
    pub fn release(self) -> Result<()> {
        let count = self.child_count();
        if count > 0 {
            let err = CpsError::ChildrenAlive { count };
            tracing::error!(count, "CPS released while children are still registered");
            return Err(err);
        }
        Ok(())
    }

    /// Force-destroy the CPS and every registered child
    pub fn destroy(self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<ChildEntry> = match self.shared.children.lock() {
            Ok(mut children) => children.drain().map(|(_, entry)| entry).collect(),
            Err(_) => Vec::new(),
        };
        for entry in &drained {
            if let Some(child) = entry.target.as_ref().and_then(Weak::upgrade) {
                tracing::debug!(kind = entry.kind, "tearing down CPS child");
                child.teardown();
            }
        }
        if let Ok(mut store) = self.shared.store.write() {
            *store = CpsStore::new();
        }
        tracing::debug!(children = drained.len(), "CPS destroyed");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(CpsError::CpsDestroyed)
        } else {
            Ok(())
        }
    }

    /// Shared access to the store
    ///
    /// # Errors
    /// * `Invalid` - the CPS was destroyed
    pub fn read(&self) -> Result<RwLockReadGuard<'_, CpsStore>> {
        self.ensure_alive()?;
        self.shared
            .store
            .read()
            .map_err(|_| CpsError::internal("CPS store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CpsStore>> {
        self.ensure_alive()?;
        self.shared
            .store
            .write()
            .map_err(|_| CpsError::internal("CPS store lock poisoned"))
    }

    pub fn revision(&self) -> Result<u64> {
        Ok(self.read()?.revision())
    }

    // ----- pspaces -----

    pub fn pspaces_declare(&self, params: &[PSpaceParams]) -> Result<()> {
        pspace_ops::declare_pspaces(&mut *self.write()?, params)
    }

    pub fn pspaces_forget(&self, uids: &[PSpaceUid]) -> Result<()> {
        pspace_ops::forget_pspaces(&mut *self.write()?, uids)
    }

    pub fn pspace_get(&self, uid: PSpaceUid) -> Result<PSpaceParams> {
        self.read()?.pspace(uid).cloned()
    }

    pub fn pspaces_list(&self) -> Result<Vec<PSpaceParams>> {
        Ok(self.read()?.pspaces().to_vec())
    }

    // ----- points -----

    pub fn points_add(&self, count: usize) -> Result<Vec<PointId>> {
        point_ops::add_points(&mut *self.write()?, count)
    }

    pub fn points_remove(&self, ids: &[PointId]) -> Result<()> {
        point_ops::remove_points(&mut *self.write()?, ids)
    }

    pub fn points_clear(&self) -> Result<()> {
        point_ops::clear_points(&mut *self.write()?);
        Ok(())
    }

    pub fn points_live(&self) -> Result<Vec<PointId>> {
        Ok(self.read()?.points_live())
    }

    pub fn point_is_live(&self, id: PointId) -> Result<bool> {
        Ok(self.read()?.point_is_live(id))
    }

    // ----- cost functors -----

    pub fn cost_functors_register(
        &self,
        params: Vec<CostFunctorParams>,
    ) -> Result<Vec<CostFunctorId>> {
        functor_ops::register_cost_functors(&mut *self.write()?, params)
    }

    pub fn cost_functors_unregister(&self, ids: &[CostFunctorId]) -> Result<()> {
        functor_ops::unregister_cost_functors(&mut *self.write()?, ids)
    }

    pub fn cost_functor_id_of(&self, uid: CostFunctorUid) -> Result<CostFunctorId> {
        self.read()?.cost_functor_id_of(uid)
    }

    pub fn cost_functors_live(&self) -> Result<Vec<CostFunctorId>> {
        Ok(self.read()?.cost_functors_live())
    }

    // ----- relationships -----

    pub fn relationships_add(&self, params: Vec<RelshpParams>) -> Result<Vec<RelshpId>> {
        relshp_ops::add_relationships(&mut *self.write()?, params)
    }

    pub fn relationships_remove(&self, ids: &[RelshpId]) -> Result<()> {
        relshp_ops::remove_relationships(&mut *self.write()?, ids)
    }

    pub fn relationships_clear(&self) -> Result<()> {
        relshp_ops::clear_relationships(&mut *self.write()?);
        Ok(())
    }

    pub fn relationships_live(&self) -> Result<Vec<RelshpId>> {
        Ok(self.read()?.relationships_live())
    }

    pub fn relationships_params_get(&self, ids: &[RelshpId]) -> Result<Vec<RelshpParams>> {
        relshp_ops::relationships_params_get(&*self.read()?, ids)
    }

    pub fn relationships_state_get(&self, ids: &[RelshpId]) -> Result<Vec<bool>> {
        relshp_ops::relationships_state_get(&*self.read()?, ids)
    }

    pub fn relationships_state_set(&self, ids: &[RelshpId], enabled: bool) -> Result<()> {
        relshp_ops::relationships_state_set(&mut *self.write()?, ids, enabled)
    }

    // ----- groups -----

    pub fn group_relationships(&self, uid: RelshpGroupUid) -> Result<Vec<RelshpId>> {
        group_ops::group_relationships(&*self.read()?, uid)
    }

    pub fn group_remove(&self, uid: RelshpGroupUid) -> Result<Vec<RelshpId>> {
        group_ops::remove_group(&mut *self.write()?, uid)
    }

    pub fn group_state_set(&self, uid: RelshpGroupUid, enabled: bool) -> Result<()> {
        group_ops::set_group_state(&mut *self.write()?, uid, enabled)
    }

    pub fn group_state_get(&self, uid: RelshpGroupUid) -> Result<GroupState> {
        group_ops::group_state(&*self.read()?, uid)
    }
}

impl std::fmt::Debug for Cps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cps")
            .field("destroyed", &self.is_destroyed())
            .field("children", &self.child_count())
            .finish_non_exhaustive()
    }
}

/// Registration of one child with its CPS
///
/// Holds a strong reference to the CPS. Dropping the link unregisters the
/// child.
pub struct ChildLink {
    cps: Cps,
    key: u64,
}

impl ChildLink {
    pub fn cps(&self) -> &Cps {
        &self.cps
    }

    /// Point the registry at the child object torn down by [`Cps::destroy`]
    pub fn bind(&self, target: Weak<dyn CpsChild>) {
        if let Ok(mut children) = self.cps.shared.children.lock() {
            if let Some(entry) = children.get_mut(&self.key) {
                entry.target = Some(target);
            }
        }
    }

    /// # Errors
    /// * `Invalid` - the owning CPS was destroyed
    pub fn ensure_alive(&self) -> Result<()> {
        self.cps.ensure_alive()
    }
}

impl Drop for ChildLink {
    fn drop(&mut self) {
        if let Ok(mut children) = self.cps.shared.children.lock() {
            children.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for ChildLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildLink").field("key", &self.key).finish()
    }
}
