use std::collections::HashMap;

use cpsx_core_types::{CostFunctorId, CostFunctorUid};

use super::store::{check_unique, CpsStore};
use crate::errors::{CpsError, Result};
use crate::model::CostFunctorParams;

/// Register a batch of cost functors
///
/// A uid that is already registered (or repeated inside the batch) is
/// replaced in place: the last registration wins and keeps the existing id.
/// Returned ids follow the order of `params`.
///
/// # Errors
/// * `BadArg` - a registration fails validation or the batch is empty
/// * `NotFound` - a registration expects an undeclared pspace
/// * `MemErr` - the registration table could not grow; nothing is committed
pub fn register_cost_functors(
    store: &mut CpsStore,
    params: Vec<CostFunctorParams>,
) -> Result<Vec<CostFunctorId>> {
    if params.is_empty() {
        return Err(CpsError::bad_arg("no cost functors to register"));
    }
    for p in &params {
        p.validate()?;
        store.pspace(p.pspace)?;
    }

    let mut fresh_uids: Vec<CostFunctorUid> = params
        .iter()
        .map(|p| p.uid)
        .filter(|uid| !store.functor_by_uid.contains_key(uid))
        .collect();
    fresh_uids.sort_unstable();
    fresh_uids.dedup();
    store.functors.reserve(fresh_uids.len())?;
    store.functor_by_uid.try_reserve(fresh_uids.len())?;

    let mut assigned: HashMap<CostFunctorUid, CostFunctorId> = HashMap::new();
    let mut ids = Vec::with_capacity(params.len());
    for p in params {
        let uid = p.uid;
        let existing = assigned
            .get(&uid)
            .copied()
            .or_else(|| store.functor_by_uid.get(&uid).copied());
        let id = match existing {
            Some(id) => {
                let slot = store.functors.get_mut(id).ok_or_else(|| {
                    CpsError::internal(format!("uid map points at dead registration {id}"))
                })?;
                *slot = p;
                id
            }
            None => store.functors.insert(p)?,
        };
        store.functor_by_uid.insert(uid, id);
        assigned.insert(uid, id);
        ids.push(id);
    }
    store.bump();

    tracing::debug!(count = ids.len(), "cost functors registered");
    Ok(ids)
}

/// Unregister a batch of cost functors
///
/// # Errors
/// * `BadArg` - an id appears twice
/// * `NotFound` - an id is not live
/// * `Invalid` - a live relationship still binds one of the functors
pub fn unregister_cost_functors(store: &mut CpsStore, ids: &[CostFunctorId]) -> Result<()> {
    check_unique(ids)?;
    for id in ids {
        store.cost_functor(*id)?;
        let bound = store
            .relshps
            .iter()
            .find(|(_, r)| r.bindings.iter().any(|b| b.functor == *id));
        if let Some((relshp, _)) = bound {
            return Err(CpsError::CostFunctorInUse { id: *id, relshp });
        }
    }

    for id in ids {
        if let Some(params) = store.functors.remove(*id) {
            store.functor_by_uid.remove(&params.uid);
        }
    }
    store.bump();

    tracing::debug!(count = ids.len(), "cost functors unregistered");
    Ok(())
}
