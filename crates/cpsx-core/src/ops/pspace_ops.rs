use cpsx_core_types::PSpaceUid;

use super::store::{check_unique, CpsStore};
use crate::errors::{CpsError, Result};
use crate::model::PSpaceParams;

/// Declare a batch of parameter spaces
///
/// Nothing is declared unless every descriptor is valid and new.
///
/// # Errors
/// * `BadArg` - a descriptor fails validation or the batch is empty
/// * `AlreadyExists` - a uid is already declared, or appears twice in the batch
/// * `MemErr` - the pspace table could not grow
pub fn declare_pspaces(store: &mut CpsStore, params: &[PSpaceParams]) -> Result<()> {
    if params.is_empty() {
        return Err(CpsError::bad_arg("no pspaces to declare"));
    }
    for (i, p) in params.iter().enumerate() {
        p.validate()?;
        if store.has_pspace(p.uid) || params[..i].iter().any(|q| q.uid == p.uid) {
            return Err(CpsError::PSpaceAlreadyExists { uid: p.uid });
        }
    }

    store.pspaces.try_reserve(params.len())?;
    store.pspaces.extend(params.iter().cloned());
    store.bump();

    tracing::debug!(count = params.len(), "pspaces declared");
    Ok(())
}

/// Forget a batch of parameter spaces (and the variations they declare)
///
/// # Errors
/// * `BadArg` - a uid appears twice
/// * `NotFound` - a uid is not declared
/// * `Invalid` - a registered cost functor still expects one of the pspaces
pub fn forget_pspaces(store: &mut CpsStore, uids: &[PSpaceUid]) -> Result<()> {
    check_unique(uids)?;
    for uid in uids {
        store.pspace(*uid)?;
        if let Some((functor, _)) = store.functors.iter().find(|(_, f)| f.pspace == *uid) {
            return Err(CpsError::PSpaceInUse { uid: *uid, functor });
        }
    }

    store.pspaces.retain(|p| !uids.contains(&p.uid));
    store.bump();

    tracing::debug!(count = uids.len(), "pspaces forgotten");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpsx_core_types::{AttribLayout, ScalarType};

    fn rgb(uid: u32) -> PSpaceParams {
        PSpaceParams::new(PSpaceUid::new(uid), AttribLayout::with_coords(3, ScalarType::F32))
    }

    #[test]
    fn test_declare_then_duplicate_fails() {
        let mut store = CpsStore::new();
        declare_pspaces(&mut store, &[rgb(1)]).unwrap();
        let err = declare_pspaces(&mut store, &[rgb(2), rgb(1)]).unwrap_err();
        assert!(matches!(err, CpsError::PSpaceAlreadyExists { .. }));
        // nothing from the failed batch was committed
        assert!(!store.has_pspace(PSpaceUid::new(2)));
    }

    #[test]
    fn test_duplicate_within_batch() {
        let mut store = CpsStore::new();
        let err = declare_pspaces(&mut store, &[rgb(3), rgb(3)]).unwrap_err();
        assert!(matches!(err, CpsError::PSpaceAlreadyExists { .. }));
        assert!(store.pspaces().is_empty());
    }

    #[test]
    fn test_forget_unknown() {
        let mut store = CpsStore::new();
        declare_pspaces(&mut store, &[rgb(1)]).unwrap();
        let err = forget_pspaces(&mut store, &[PSpaceUid::new(1), PSpaceUid::new(9)]).unwrap_err();
        assert!(matches!(err, CpsError::PSpaceNotFound { .. }));
        assert!(store.has_pspace(PSpaceUid::new(1)));
    }
}
