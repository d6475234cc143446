use cpsx_core_types::{CostFunctorId, PointId, RelshpGroupUid, VariationUid};
use serde::{Deserialize, Serialize};

use crate::errors::{CpsError, Result};

/// Membership rule of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelshpKind {
    /// Exactly the listed points participate
    Inclusive,
    /// Every live point except the listed ones participates; resolved
    /// against the live point set each time an instance is built
    Exclusive,
}

/// Binding of one cost functor registration to a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBinding {
    pub functor: CostFunctorId,

    /// Opaque per-relationship configuration, interpreted by the functor
    #[serde(default)]
    pub config: serde_json::Value,
}

impl CostBinding {
    pub fn new(functor: CostFunctorId) -> Self {
        Self {
            functor,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(functor: CostFunctorId, config: serde_json::Value) -> Self {
        Self { functor, config }
    }
}

/// Relationship parameters, as supplied to `relationships_add` and returned
/// by `relationships_params_get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelshpParams {
    pub kind: RelshpKind,

    /// Included points (INCLUSIVE) or excluded points (EXCLUSIVE)
    pub points: Vec<PointId>,

    /// Variations this relationship is evaluated under, besides the plain one
    #[serde(default)]
    pub variations: Vec<VariationUid>,

    pub bindings: Vec<CostBinding>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub group: Option<RelshpGroupUid>,
}

fn default_enabled() -> bool {
    true
}

impl RelshpParams {
    pub fn inclusive(points: Vec<PointId>, bindings: Vec<CostBinding>) -> Self {
        Self {
            kind: RelshpKind::Inclusive,
            points,
            variations: Vec::new(),
            bindings,
            enabled: true,
            group: None,
        }
    }

    pub fn exclusive(excluded: Vec<PointId>, bindings: Vec<CostBinding>) -> Self {
        Self {
            kind: RelshpKind::Exclusive,
            points: excluded,
            variations: Vec::new(),
            bindings,
            enabled: true,
            group: None,
        }
    }

    pub fn in_group(mut self, group: RelshpGroupUid) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_variations(mut self, variations: impl IntoIterator<Item = VariationUid>) -> Self {
        self.variations = variations.into_iter().collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Shape checks that need no store access
    ///
    /// Liveness of the referenced points and functors is checked by the
    /// store before anything is committed.
    ///
    /// # Errors
    /// * `BadArg` - no bindings, an empty INCLUSIVE point list, an invalid
    ///   group uid, or a point listed twice
    pub fn validate_shape(&self) -> Result<()> {
        if self.bindings.is_empty() {
            return Err(CpsError::bad_arg("relationship has no cost functor bindings"));
        }
        if self.kind == RelshpKind::Inclusive && self.points.is_empty() {
            return Err(CpsError::bad_arg("inclusive relationship lists no points"));
        }
        if let Some(group) = self.group {
            if !group.is_valid() {
                return Err(CpsError::bad_arg("relationship group is the invalid sentinel"));
            }
        }
        let mut seen = self.points.clone();
        seen.sort_unstable();
        if let Some(w) = seen.windows(2).find(|w| w[0] == w[1]) {
            return Err(CpsError::DuplicateInBatch {
                id: w[0].to_string(),
            });
        }
        Ok(())
    }
}

/// Aggregate enabled state of a relationship group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupState {
    Enabled,
    Disabled,
    PartiallyEnabled,
}

impl GroupState {
    /// Fold member states; `None` for an empty iterator
    pub fn aggregate(states: impl IntoIterator<Item = bool>) -> Option<Self> {
        let mut any_on = false;
        let mut any_off = false;
        for enabled in states {
            if enabled {
                any_on = true;
            } else {
                any_off = true;
            }
        }
        match (any_on, any_off) {
            (false, false) => None,
            (true, false) => Some(GroupState::Enabled),
            (false, true) => Some(GroupState::Disabled),
            (true, true) => Some(GroupState::PartiallyEnabled),
        }
    }
}
