use cpsx_core_types::{RelshpGroupUid, RelshpId};

use super::relshp_ops;
use super::store::CpsStore;
use crate::errors::{CpsError, Result};
use crate::model::GroupState;

/// Members of a group, in insertion order
///
/// # Errors
/// * `NotFound` - the group has no live member
pub fn group_relationships(store: &CpsStore, uid: RelshpGroupUid) -> Result<Vec<RelshpId>> {
    store.group_members(uid).map(<[RelshpId]>::to_vec)
}

/// Remove exactly the relationships belonging to a group
///
/// Returns the removed ids.
///
/// # Errors
/// * `NotFound` - the group has no live member
pub fn remove_group(store: &mut CpsStore, uid: RelshpGroupUid) -> Result<Vec<RelshpId>> {
    let members = group_relationships(store, uid)?;
    relshp_ops::remove_relationships(store, &members)?;
    Ok(members)
}

/// Enable or disable every member of a group
///
/// # Errors
/// * `NotFound` - the group has no live member
pub fn set_group_state(store: &mut CpsStore, uid: RelshpGroupUid, enabled: bool) -> Result<()> {
    let members = group_relationships(store, uid)?;
    relshp_ops::relationships_state_set(store, &members, enabled)
}

/// Aggregate state of a group, computed by scanning its members
///
/// # Errors
/// * `NotFound` - the group has no live member
pub fn group_state(store: &CpsStore, uid: RelshpGroupUid) -> Result<GroupState> {
    let members = store.group_members(uid)?;
    let states = members
        .iter()
        .map(|id| store.relationship(*id).map(|r| r.enabled))
        .collect::<Result<Vec<_>>>()?;
    GroupState::aggregate(states).ok_or(CpsError::GroupNotFound { uid })
}
