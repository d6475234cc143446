use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cpsx_core_types::{CostFunctorId, PSpaceUid, PointId, RelshpGroupUid, RelshpId, VariationUid};

use super::digest::compute_instance_digest;
use crate::errors::{CpsError, Result};
use crate::model::{BatchRelshp, CostFunctorParams, PSpaceParams, RelshpKind};
use crate::ops::CpsStore;

/// What the exploration asks of the instance builder
#[derive(Debug, Clone, Default)]
pub struct InstanceRequest {
    /// Variations requested for exploration; entries are only fanned out
    /// to variations listed here
    pub variations: Vec<VariationUid>,
}

/// Enabled relationship with membership resolved at snapshot time
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRelshp {
    pub id: RelshpId,
    pub kind: RelshpKind,
    /// Dense point indices into [`Instance::points`], ascending
    pub points: Vec<usize>,
    pub variations: Vec<VariationUid>,
    pub group: Option<RelshpGroupUid>,
}

/// One (cost functor, variation) pair with the relationships it evaluates
#[derive(Debug, Clone)]
pub struct FunctorEntry {
    pub functor: CostFunctorId,
    pub params: CostFunctorParams,
    /// `None` is the plain, no-variation entry
    pub variation: Option<VariationUid>,
    pub relationships: Vec<BatchRelshp>,
    /// Costs written by one `compute` call over the whole batch
    pub costs_needed: usize,
}

/// Immutable snapshot of a CPS
#[derive(Debug, Clone)]
pub struct Instance {
    pspaces: Vec<PSpaceParams>,
    points: Vec<PointId>,
    point_index: HashMap<PointId, usize>,
    relationships: Vec<InstanceRelshp>,
    entries: Vec<FunctorEntry>,
    revision: u64,
    created_at: DateTime<Utc>,
    digest: String,
}

impl Instance {
    /// Snapshot `store`
    ///
    /// Relationships are visited in ascending id order. Disabled ones are
    /// left out, as are relationships whose resolved membership is empty.
    /// For every live cost functor the plain entry comes first, followed by
    /// one entry per variation that its pspace declares, the request lists
    /// and the relationship lists. Entries without relationships are dropped.
    ///
    /// # Errors
    /// * `NotFound` - a functor expects a pspace that is no longer declared
    /// * `MemErr` - a table could not be reserved
    pub fn build(store: &CpsStore, request: &InstanceRequest) -> Result<Self> {
        let pspaces = store.pspaces().to_vec();

        let points = store.points_live();
        let mut point_index = HashMap::new();
        point_index.try_reserve(points.len())?;
        for (i, id) in points.iter().enumerate() {
            point_index.insert(*id, i);
        }

        let mut relationships = Vec::new();
        relationships.try_reserve(store.relationship_count())?;
        // (instance relationship index, binding config) per live functor
        let mut bound: HashMap<CostFunctorId, Vec<(usize, Arc<serde_json::Value>)>> =
            HashMap::new();
        for (id, params) in store.relationships() {
            if !params.enabled {
                continue;
            }
            let members: Vec<usize> = match params.kind {
                RelshpKind::Inclusive => params
                    .points
                    .iter()
                    .filter_map(|p| point_index.get(p).copied())
                    .collect(),
                RelshpKind::Exclusive => (0..points.len())
                    .filter(|i| !params.points.contains(&points[*i]))
                    .collect(),
            };
            if members.is_empty() {
                tracing::debug!(relshp = %id, "relationship resolves to no points, skipped");
                continue;
            }
            let slot = relationships.len();
            for binding in &params.bindings {
                bound
                    .entry(binding.functor)
                    .or_default()
                    .push((slot, Arc::new(binding.config.clone())));
            }
            relationships.push(InstanceRelshp {
                id,
                kind: params.kind,
                points: members,
                variations: params.variations.clone(),
                group: params.group,
            });
        }

        let mut entries = Vec::new();
        for (functor, params) in store.cost_functors() {
            let Some(bindings) = bound.get(&functor) else {
                continue;
            };
            let pspace = store.pspace(params.pspace)?;
            let variations = std::iter::once(None).chain(
                pspace
                    .variations
                    .iter()
                    .filter(|v| request.variations.contains(v))
                    .map(|v| Some(*v)),
            );
            for variation in variations {
                let batch: Vec<BatchRelshp> = bindings
                    .iter()
                    .filter(|(slot, _)| match variation {
                        None => true,
                        Some(v) => relationships[*slot].variations.contains(&v),
                    })
                    .enumerate()
                    .map(|(batch_index, (slot, config))| BatchRelshp {
                        id: relationships[*slot].id,
                        batch_index,
                        points: relationships[*slot].points.clone(),
                        config: Arc::clone(config),
                    })
                    .collect();
                if batch.is_empty() {
                    continue;
                }
                let costs_needed = batch.iter().map(|r| params.costs_for(r.points.len())).sum();
                entries.push(FunctorEntry {
                    functor,
                    params: params.clone(),
                    variation,
                    relationships: batch,
                    costs_needed,
                });
            }
        }

        let mut instance = Self {
            pspaces,
            points,
            point_index,
            relationships,
            entries,
            revision: store.revision(),
            created_at: Utc::now(),
            digest: String::new(),
        };
        instance.digest = compute_instance_digest(&instance)?;

        tracing::debug!(
            point_count = instance.points.len(),
            relshp_count = instance.relationships.len(),
            entries = instance.entries.len(),
            "instance built"
        );
        Ok(instance)
    }

    pub fn pspaces(&self) -> &[PSpaceParams] {
        &self.pspaces
    }

    /// # Errors
    /// * `NotFound` - `uid` was not declared when the snapshot was taken
    pub fn pspace(&self, uid: PSpaceUid) -> Result<&PSpaceParams> {
        self.pspaces
            .iter()
            .find(|p| p.uid == uid)
            .ok_or(CpsError::PSpaceNotFound { uid })
    }

    /// Live point ids at snapshot time, ascending
    pub fn points(&self) -> &[PointId] {
        &self.points
    }

    /// Dense index of a point
    pub fn point_index(&self, id: PointId) -> Option<usize> {
        self.point_index.get(&id).copied()
    }

    pub fn relationships(&self) -> &[InstanceRelshp] {
        &self.relationships
    }

    pub fn relationship(&self, id: RelshpId) -> Option<&InstanceRelshp> {
        self.relationships.iter().find(|r| r.id == id)
    }

    pub fn entries(&self) -> &[FunctorEntry] {
        &self.entries
    }

    /// Total costs of one full residual evaluation
    pub fn costs_needed(&self) -> usize {
        self.entries.iter().map(|e| e.costs_needed).sum()
    }

    /// CPS revision the snapshot was taken at
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Semantic digest, see [`super::digest`]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}
