use cpsx_core_types::PointId;

use super::store::{check_unique, CpsStore};
use crate::errors::{CpsError, Result};

/// Add `count` points, reusing released ids before minting new ones
///
/// # Errors
/// * `MemErr` - the point table could not grow; no point is added
pub fn add_points(store: &mut CpsStore, count: usize) -> Result<Vec<PointId>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let ids = store.points.insert_many(vec![(); count])?;
    store.bump();

    tracing::debug!(count, "points added");
    Ok(ids)
}

/// Remove a batch of points
///
/// Removed ids are also pruned from every relationship's point list, so a
/// recycled id never silently joins a relationship that named its previous
/// holder.
///
/// # Errors
/// * `BadArg` - an id appears twice in the batch
/// * `NotFound` - an id is not live
pub fn remove_points(store: &mut CpsStore, ids: &[PointId]) -> Result<()> {
    check_unique(ids)?;
    if let Some(id) = ids.iter().find(|id| !store.point_is_live(**id)) {
        return Err(CpsError::PointNotFound { id: *id });
    }

    for id in ids {
        store.points.remove(*id);
    }
    for (_, relshp) in store.relshps.iter_mut() {
        relshp.points.retain(|p| !ids.contains(p));
    }
    store.bump();

    tracing::debug!(count = ids.len(), "points removed");
    Ok(())
}

/// Remove every point; relationship point lists are emptied accordingly
pub fn clear_points(store: &mut CpsStore) {
    store.points.clear();
    for (_, relshp) in store.relshps.iter_mut() {
        relshp.points.clear();
    }
    store.bump();
}
