use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cpsx_core_types::{AttribKind, AttribLayout, PointId, ScalarSlice, ScalarSliceMut};

use super::AttribAccessor;
use crate::errors::{CpsError, Result};

#[derive(Debug, Default)]
struct Tables {
    coords: HashMap<PointId, Vec<f64>>,
    lock_status: HashMap<PointId, Vec<f64>>,
}

impl Tables {
    fn table(&mut self, attrib: AttribKind) -> &mut HashMap<PointId, Vec<f64>> {
        match attrib {
            AttribKind::Coords => &mut self.coords,
            AttribKind::LockStatus => &mut self.lock_status,
        }
    }
}

/// Hash-map backed global accessor
///
/// Scalars are kept widened to `f64` and narrowed on read. Points never
/// written read back as zeros (unlocked, at the origin). Clones share the
/// same tables, so a caller can keep a handle to inspect what an exploration
/// wrote through a [`super::Values`] object.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttribs {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryAttribs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Components of `attrib` stored for `id`, if any were written
    pub fn snapshot(&self, attrib: AttribKind, id: PointId) -> Option<Vec<f64>> {
        self.tables
            .lock()
            .ok()
            .and_then(|mut t| t.table(attrib).get(&id).cloned())
    }

    /// Seed `attrib` of `id` directly, bypassing any Values lock
    pub fn insert(&self, attrib: AttribKind, id: PointId, components: Vec<f64>) {
        if let Ok(mut t) = self.tables.lock() {
            t.table(attrib).insert(id, components);
        }
    }

    /// Seed coordinates of `ids` from a flat buffer laid out as `layout` says
    pub fn seed_coords(&self, layout: &AttribLayout, ids: &[PointId], flat: &[f64]) {
        let n = layout.coords.count;
        for (id, chunk) in ids.iter().zip(flat.chunks(n)) {
            self.insert(AttribKind::Coords, *id, chunk.to_vec());
        }
    }
}

impl AttribAccessor for InMemoryAttribs {
    fn get(&mut self, attrib: AttribKind, ids: &[PointId], mut out: ScalarSliceMut<'_>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let n = out.len() / ids.len();
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| CpsError::internal("in-memory attribute lock poisoned"))?;
        let table = tables.table(attrib);
        for (i, id) in ids.iter().enumerate() {
            let stored = table.get(id);
            for c in 0..n {
                let v = stored.and_then(|s| s.get(c)).copied().unwrap_or(0.0);
                out.set_f64(i * n + c, v);
            }
        }
        Ok(())
    }

    fn set(&mut self, attrib: AttribKind, ids: &[PointId], data: ScalarSlice<'_>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let n = data.len() / ids.len();
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| CpsError::internal("in-memory attribute lock poisoned"))?;
        let table = tables.table(attrib);
        for (i, id) in ids.iter().enumerate() {
            let components = (0..n).map(|c| data.get_f64(i * n + c)).collect();
            table.insert(*id, components);
        }
        Ok(())
    }
}
