use cpsx_core_types::RelshpId;

use super::store::{check_unique, CpsStore};
use crate::errors::{CpsError, Result};
use crate::model::RelshpParams;

/// Add a batch of relationships
///
/// Every referenced point and cost functor registration must be live. The
/// whole batch is validated before the first relationship is stored.
///
/// # Errors
/// * `BadArg` - a relationship fails shape validation or the batch is empty
/// * `NotFound` - a referenced point or cost functor is not live
/// * `MemErr` - the relationship table could not grow; nothing is committed
pub fn add_relationships(store: &mut CpsStore, params: Vec<RelshpParams>) -> Result<Vec<RelshpId>> {
    if params.is_empty() {
        return Err(CpsError::bad_arg("no relationships to add"));
    }
    for p in &params {
        p.validate_shape()?;
        if let Some(id) = p.points.iter().find(|id| !store.point_is_live(**id)) {
            return Err(CpsError::PointNotFound { id: *id });
        }
        for binding in &p.bindings {
            store.cost_functor(binding.functor)?;
        }
    }

    let groups: Vec<_> = params.iter().map(|p| p.group).collect();
    store.groups.try_reserve(groups.iter().flatten().count())?;
    let ids = store.relshps.insert_many(params)?;
    for (id, group) in ids.iter().zip(groups) {
        if let Some(group) = group {
            store.groups.entry(group).or_default().push(*id);
        }
    }
    store.bump();

    tracing::debug!(count = ids.len(), "relationships added");
    Ok(ids)
}

/// Remove a batch of relationships
///
/// # Errors
/// * `BadArg` - an id appears twice
/// * `NotFound` - an id is not live
pub fn remove_relationships(store: &mut CpsStore, ids: &[RelshpId]) -> Result<()> {
    check_unique(ids)?;
    for id in ids {
        store.relationship(*id)?;
    }

    for id in ids {
        if let Some(params) = store.relshps.remove(*id) {
            if let Some(group) = params.group {
                store.unlink_group_member(group, *id);
            }
        }
    }
    store.bump();

    tracing::debug!(count = ids.len(), "relationships removed");
    Ok(())
}

/// Remove every relationship and every group
pub fn clear_relationships(store: &mut CpsStore) {
    store.relshps.clear();
    store.groups.clear();
    store.bump();
}

/// Parameters of a batch of relationships, in request order
///
/// # Errors
/// * `NotFound` - an id is not live
pub fn relationships_params_get(store: &CpsStore, ids: &[RelshpId]) -> Result<Vec<RelshpParams>> {
    ids.iter()
        .map(|id| store.relationship(*id).cloned())
        .collect()
}

/// Enabled flags of a batch of relationships, in request order
///
/// # Errors
/// * `NotFound` - an id is not live
pub fn relationships_state_get(store: &CpsStore, ids: &[RelshpId]) -> Result<Vec<bool>> {
    ids.iter()
        .map(|id| store.relationship(*id).map(|r| r.enabled))
        .collect()
}

/// Enable or disable a batch of relationships
///
/// # Errors
/// * `NotFound` - an id is not live; no state changes
pub fn relationships_state_set(store: &mut CpsStore, ids: &[RelshpId], enabled: bool) -> Result<()> {
    for id in ids {
        store.relationship(*id)?;
    }
    for id in ids {
        store.relationship_mut(*id)?.enabled = enabled;
    }
    store.bump();
    Ok(())
}
