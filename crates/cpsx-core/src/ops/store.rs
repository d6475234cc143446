use std::collections::HashMap;

use cpsx_core_types::{
    CostFunctorId, CostFunctorUid, PSpaceUid, PointId, RelshpGroupUid, RelshpId,
};

use super::id_pool::SlotTable;
use crate::errors::{CpsError, Result};
use crate::model::{CostFunctorParams, PSpaceParams, RelshpParams};

/// Constrained parameter space tables
///
/// Growable slot tables for points, cost functor registrations and
/// relationships, plus the declared pspaces and the relationship groups.
/// Not synchronized: the shared [`crate::cps::Cps`] handle puts it behind a
/// lock. All mutation goes through the `*_ops` modules, which validate a
/// whole batch before touching any table.
#[derive(Clone, Default)]
pub struct CpsStore {
    /// Declared pspaces, in declaration order
    pub(crate) pspaces: Vec<PSpaceParams>,
    /// Live points; points carry no payload
    pub(crate) points: SlotTable<PointId, ()>,
    pub(crate) functors: SlotTable<CostFunctorId, CostFunctorParams>,
    pub(crate) functor_by_uid: HashMap<CostFunctorUid, CostFunctorId>,
    pub(crate) relshps: SlotTable<RelshpId, RelshpParams>,
    /// Group uid to member relationships, in insertion order
    pub(crate) groups: HashMap<RelshpGroupUid, Vec<RelshpId>>,
    /// Bumped on every committed mutation
    pub(crate) revision: u64,
}

impl CpsStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic mutation counter
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump(&mut self) {
        self.revision += 1;
    }

    /// Get a declared pspace
    ///
    /// # Errors
    /// * `NotFound` - the pspace is not declared
    pub fn pspace(&self, uid: PSpaceUid) -> Result<&PSpaceParams> {
        self.pspaces
            .iter()
            .find(|p| p.uid == uid)
            .ok_or(CpsError::PSpaceNotFound { uid })
    }

    pub fn pspaces(&self) -> &[PSpaceParams] {
        &self.pspaces
    }

    pub fn has_pspace(&self, uid: PSpaceUid) -> bool {
        self.pspaces.iter().any(|p| p.uid == uid)
    }

    pub fn point_is_live(&self, id: PointId) -> bool {
        self.points.contains(id)
    }

    /// Live point ids, ascending
    pub fn points_live(&self) -> Vec<PointId> {
        self.points.ids()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// # Errors
    /// * `NotFound` - the registration is not live
    pub fn cost_functor(&self, id: CostFunctorId) -> Result<&CostFunctorParams> {
        self.functors
            .get(id)
            .ok_or(CpsError::CostFunctorNotFound { id })
    }

    /// Registration id currently holding `uid`
    ///
    /// # Errors
    /// * `NotFound` - nothing is registered under `uid`
    pub fn cost_functor_id_of(&self, uid: CostFunctorUid) -> Result<CostFunctorId> {
        self.functor_by_uid
            .get(&uid)
            .copied()
            .ok_or(CpsError::CostFunctorUidNotFound { uid })
    }

    pub fn cost_functors_live(&self) -> Vec<CostFunctorId> {
        self.functors.ids()
    }

    /// # Errors
    /// * `NotFound` - the relationship is not live
    pub fn relationship(&self, id: RelshpId) -> Result<&RelshpParams> {
        self.relshps.get(id).ok_or(CpsError::RelshpNotFound { id })
    }

    pub(crate) fn relationship_mut(&mut self, id: RelshpId) -> Result<&mut RelshpParams> {
        self.relshps
            .get_mut(id)
            .ok_or(CpsError::RelshpNotFound { id })
    }

    pub fn relationships_live(&self) -> Vec<RelshpId> {
        self.relshps.ids()
    }

    pub fn relationship_count(&self) -> usize {
        self.relshps.len()
    }

    /// Live relationships with their parameters, ascending id order
    pub fn relationships(&self) -> impl Iterator<Item = (RelshpId, &RelshpParams)> {
        self.relshps.iter()
    }

    /// Live cost functor registrations, ascending id order
    pub fn cost_functors(&self) -> impl Iterator<Item = (CostFunctorId, &CostFunctorParams)> {
        self.functors.iter()
    }

    /// Members of a group, in insertion order
    ///
    /// # Errors
    /// * `NotFound` - no live relationship belongs to `uid`
    pub fn group_members(&self, uid: RelshpGroupUid) -> Result<&[RelshpId]> {
        self.groups
            .get(&uid)
            .map(Vec::as_slice)
            .ok_or(CpsError::GroupNotFound { uid })
    }

    pub fn groups(&self) -> Vec<RelshpGroupUid> {
        let mut uids: Vec<_> = self.groups.keys().copied().collect();
        uids.sort_unstable();
        uids
    }

    /// Detach `id` from its group, dropping the group once empty
    pub(crate) fn unlink_group_member(&mut self, group: RelshpGroupUid, id: RelshpId) {
        if let Some(members) = self.groups.get_mut(&group) {
            members.retain(|m| *m != id);
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
    }
}

impl std::fmt::Debug for CpsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpsStore")
            .field("pspaces", &self.pspaces.len())
            .field("points", &self.points.len())
            .field("functors", &self.functors.len())
            .field("relshps", &self.relshps.len())
            .field("groups", &self.groups.len())
            .field("revision", &self.revision)
            .finish()
    }
}

/// Reject the first id appearing twice in a batch
pub(crate) fn check_unique<I: Copy + Ord + std::fmt::Display>(ids: &[I]) -> Result<()> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    match sorted.windows(2).find(|w| w[0] == w[1]) {
        Some(w) => Err(CpsError::DuplicateInBatch {
            id: w[0].to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store() {
        let store = CpsStore::new();
        assert_eq!(store.point_count(), 0);
        assert_eq!(store.relationship_count(), 0);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_get_unknown_entities() {
        let store = CpsStore::new();
        assert!(matches!(
            store.pspace(PSpaceUid::new(1)),
            Err(CpsError::PSpaceNotFound { .. })
        ));
        assert!(matches!(
            store.relationship(RelshpId::new(0)),
            Err(CpsError::RelshpNotFound { .. })
        ));
        assert!(matches!(
            store.group_members(RelshpGroupUid::new(4)),
            Err(CpsError::GroupNotFound { .. })
        ));
    }

    #[test]
    fn test_check_unique() {
        assert!(check_unique(&[PointId::new(1), PointId::new(2)]).is_ok());
        assert!(check_unique(&[PointId::new(2), PointId::new(2)]).is_err());
    }
}
