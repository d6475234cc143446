//! Residual and Jacobian assembly
//!
//! Residual rows follow instance entry order; inside an entry they follow
//! the entry's relationship order. Jacobian columns are the components of
//! the unlocked points, in ascending dense point order.

use std::collections::HashMap;
use std::sync::Arc;

use cpsx_core::{BatchRelshp, CostContexts, CostEval, CpsError, FunctorEntry, Result};
use cpsx_core_types::{PSpaceUid, VariationUid};
use nalgebra::{DMatrix, DVector};

use crate::exploration::ExplorationData;

type ConversionKey = (PSpaceUid, Option<VariationUid>);

/// Coordinates of every point converted once per (pspace, variation)
type ConversionCache = HashMap<ConversionKey, Vec<f64>>;

#[derive(Debug)]
struct EntryLayout {
    /// Components per point in the functor's pspace
    components: usize,
    /// Functor sees raw exploration coordinates
    identity: bool,
    /// First residual row of the entry
    offset: usize,
    /// Per relationship, first row relative to `offset`
    rel_offsets: Vec<usize>,
    rel_costs: Vec<usize>,
    /// Per dense point, the relationships it belongs to
    point_rels: Vec<Vec<usize>>,
}

impl EntryLayout {
    fn key(entry: &FunctorEntry) -> ConversionKey {
        (entry.params.pspace, entry.variation)
    }
}

/// Least-squares view of one exploration
pub(crate) struct Problem {
    data: Arc<ExplorationData>,
    layouts: Vec<EntryLayout>,
    total_costs: usize,
}

impl Problem {
    /// # Errors
    /// * `NotFound` - an entry expects a pspace missing from the snapshot
    /// * `Internal` - an entry's cost count disagrees with its relationships
    pub fn new(data: Arc<ExplorationData>) -> Result<Self> {
        let instance = data.instance();
        let points = instance.points().len();
        let mut layouts = Vec::new();
        layouts.try_reserve_exact(instance.entries().len())?;

        let mut offset = 0;
        for entry in instance.entries() {
            let components = instance.pspace(entry.params.pspace)?.components();
            let mut rel_offsets = Vec::with_capacity(entry.relationships.len());
            let mut rel_costs = Vec::with_capacity(entry.relationships.len());
            let mut point_rels = vec![Vec::new(); points];
            let mut cursor = 0;
            for (r, rel) in entry.relationships.iter().enumerate() {
                let costs = entry.params.costs_for(rel.points.len());
                rel_offsets.push(cursor);
                rel_costs.push(costs);
                cursor += costs;
                for p in &rel.points {
                    point_rels[*p].push(r);
                }
            }
            if cursor != entry.costs_needed {
                return Err(CpsError::internal(format!(
                    "entry of {} expects {} costs, relationships produce {cursor}",
                    entry.functor, entry.costs_needed
                )));
            }
            layouts.push(EntryLayout {
                components,
                identity: entry.params.pspace == data.pspace().uid && entry.variation.is_none(),
                offset,
                rel_offsets,
                rel_costs,
                point_rels,
            });
            offset += cursor;
        }

        Ok(Self {
            data,
            layouts,
            total_costs: offset,
        })
    }

    pub fn data(&self) -> &ExplorationData {
        &self.data
    }

    /// Residual count
    pub fn rows(&self) -> usize {
        self.total_costs
    }

    /// Components per point in the exploration pspace
    pub fn components(&self) -> usize {
        self.data.pspace().components()
    }

    fn convert_all(&self, full: &[f64]) -> Result<ConversionCache> {
        let instance = self.data.instance();
        let points = instance.points().len();
        let mut cache = ConversionCache::new();
        for (entry, layout) in instance.entries().iter().zip(&self.layouts) {
            let key = EntryLayout::key(entry);
            if cache.contains_key(&key) {
                continue;
            }
            let target = instance.pspace(entry.params.pspace)?;
            let mut converted = vec![0.0; points * layout.components];
            self.data
                .convert_from_explored(full, target, entry.variation, &mut converted)?;
            cache.insert(key, converted);
        }
        Ok(cache)
    }

    fn compute(
        entry: &FunctorEntry,
        layout: &EntryLayout,
        coords: &[f64],
        relationships: &[BatchRelshp],
        contexts: &CostContexts,
        out: &mut [f64],
    ) -> Result<()> {
        let eval = CostEval::new(
            entry.params.pspace,
            entry.variation,
            layout.components,
            coords,
            relationships,
            contexts,
        );
        entry.params.functor.compute(&eval, out)
    }

    /// Costs of every entry at `full`
    ///
    /// # Errors
    /// * `NumericalIssue` - a cost is not finite
    /// * whatever conversion, variation or cost callbacks return
    pub fn residuals(&self, full: &[f64]) -> Result<DVector<f64>> {
        let cache = self.convert_all(full)?;
        let entries = self.data.instance().entries();
        let mut out = DVector::zeros(self.total_costs);

        self.data.with_contexts(|batches| {
            for ((entry, layout), contexts) in entries.iter().zip(&self.layouts).zip(batches) {
                let coords = cache
                    .get(&EntryLayout::key(entry))
                    .ok_or_else(|| CpsError::internal("conversion cache miss"))?;
                let rows = &mut out.as_mut_slice()[layout.offset..layout.offset + entry.costs_needed];
                Self::compute(entry, layout, coords, &entry.relationships, contexts, rows)?;
            }
            Ok(())
        })?;

        if let Some(row) = out.iter().position(|c| !c.is_finite()) {
            return Err(CpsError::NumericalIssue {
                reason: format!("cost row {row} is not finite"),
            });
        }
        Ok(out)
    }

    /// Jacobian of the residuals with respect to the unlocked coordinates
    ///
    /// Column `k * components + c` is component `c` of the `k`-th unlocked
    /// point. Only the relationships containing the perturbed point are
    /// re-evaluated.
    ///
    /// # Errors
    /// * `NumericalIssue` - a derivative is not finite
    /// * whatever conversion, variation or cost callbacks return
    pub fn jacobian(&self, full: &[f64], unlocked: &[usize], fd_step: f64) -> Result<DMatrix<f64>> {
        let ec = self.components();
        let instance = self.data.instance();
        let mut cache = self.convert_all(full)?;
        let mut jac = DMatrix::zeros(self.total_costs, unlocked.len() * ec);

        self.data.with_contexts(|batches| {
            for (k, &u) in unlocked.iter().enumerate() {
                for ((entry, layout), contexts) in
                    instance.entries().iter().zip(&self.layouts).zip(batches)
                {
                    let rels = &layout.point_rels[u];
                    if rels.is_empty() {
                        continue;
                    }
                    let sub: Vec<BatchRelshp> =
                        rels.iter().map(|r| entry.relationships[*r].clone()).collect();
                    let rows: Vec<usize> = rels
                        .iter()
                        .flat_map(|r| {
                            let first = layout.offset + layout.rel_offsets[*r];
                            first..first + layout.rel_costs[*r]
                        })
                        .collect();
                    let coords = cache
                        .get_mut(&EntryLayout::key(entry))
                        .ok_or_else(|| CpsError::internal("conversion cache miss"))?;

                    let mut block = vec![0.0; rows.len() * ec];
                    let analytic = if layout.identity {
                        let eval = CostEval::new(
                            entry.params.pspace,
                            None,
                            layout.components,
                            coords,
                            &sub,
                            contexts,
                        );
                        match entry.params.functor.jacobian(&eval, u, &mut block) {
                            Some(result) => {
                                result?;
                                true
                            }
                            None => false,
                        }
                    } else {
                        false
                    };
                    if !analytic {
                        self.central_differences(
                            entry, layout, contexts, full, u, coords, &sub, fd_step, &mut block,
                        )?;
                    }

                    for (i, row) in rows.iter().enumerate() {
                        for c in 0..ec {
                            jac[(*row, k * ec + c)] = block[i * ec + c];
                        }
                    }
                }
            }
            Ok(())
        })?;

        if jac.iter().any(|d| !d.is_finite()) {
            return Err(CpsError::NumericalIssue {
                reason: "jacobian holds non-finite derivatives".to_string(),
            });
        }
        Ok(jac)
    }

    /// Fill `block` (row-major `costs × exploration components`) by central
    /// differences around point `u`
    ///
    /// `coords` holds every point converted for the entry; the slot of `u` is
    /// patched with each perturbed conversion and restored afterwards.
    #[allow(clippy::too_many_arguments)]
    fn central_differences(
        &self,
        entry: &FunctorEntry,
        layout: &EntryLayout,
        contexts: &CostContexts,
        full: &[f64],
        u: usize,
        coords: &mut [f64],
        sub: &[BatchRelshp],
        fd_step: f64,
        block: &mut [f64],
    ) -> Result<()> {
        let ec = self.components();
        let tc = layout.components;
        let target = self.data.instance().pspace(entry.params.pspace)?;
        let slot = u * tc..(u + 1) * tc;
        let original = coords[slot.clone()].to_vec();
        let mut point = full[u * ec..(u + 1) * ec].to_vec();
        let mut patched = vec![0.0; tc];
        let costs = block.len() / ec;
        let mut plus = vec![0.0; costs];
        let mut minus = vec![0.0; costs];

        let result = (|| -> Result<()> {
            for c in 0..ec {
                let x = point[c];
                let h = fd_step * x.abs().max(1.0);

                point[c] = x + h;
                self.data
                    .convert_from_explored(&point, target, entry.variation, &mut patched)?;
                coords[slot.clone()].copy_from_slice(&patched);
                Self::compute(entry, layout, coords, sub, contexts, &mut plus)?;

                point[c] = x - h;
                self.data
                    .convert_from_explored(&point, target, entry.variation, &mut patched)?;
                coords[slot.clone()].copy_from_slice(&patched);
                Self::compute(entry, layout, coords, sub, contexts, &mut minus)?;

                point[c] = x;
                for i in 0..costs {
                    block[i * ec + c] = (plus[i] - minus[i]) / (2.0 * h);
                }
            }
            Ok(())
        })();

        coords[slot].copy_from_slice(&original);
        result
    }
}

impl std::fmt::Debug for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("entries", &self.layouts.len())
            .field("rows", &self.total_costs)
            .finish()
    }
}
