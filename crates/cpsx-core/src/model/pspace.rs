use cpsx_core_types::{AttribLayout, PSpaceUid, VariationUid};
use serde::{Deserialize, Serialize};

use crate::errors::{CpsError, Result};

/// Parameter space descriptor
///
/// A coordinate system points can be expressed in, together with the
/// per-point attribute layout and the variations that may be applied on top
/// of coordinates expressed in this space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PSpaceParams {
    /// Caller-chosen identifier
    pub uid: PSpaceUid,

    /// Per-point attribute layout
    pub layout: AttribLayout,

    /// Variations applicable to coordinates in this space
    pub variations: Vec<VariationUid>,
}

impl PSpaceParams {
    pub fn new(uid: PSpaceUid, layout: AttribLayout) -> Self {
        Self {
            uid,
            layout,
            variations: Vec::new(),
        }
    }

    /// Builder-style variation list
    pub fn with_variations(mut self, variations: impl IntoIterator<Item = VariationUid>) -> Self {
        self.variations = variations.into_iter().collect();
        self
    }

    /// Number of coordinate components per point
    pub fn components(&self) -> usize {
        self.layout.coords.count
    }

    pub fn has_variation(&self, variation: VariationUid) -> bool {
        self.variations.contains(&variation)
    }

    /// Check the descriptor is well-formed
    ///
    /// # Errors
    /// * `BadArg` - invalid uid, no coordinate components, no lock component,
    ///   or an invalid / duplicated variation uid
    pub fn validate(&self) -> Result<()> {
        if !self.uid.is_valid() {
            return Err(CpsError::bad_arg("pspace uid is the invalid sentinel"));
        }
        if self.layout.coords.count == 0 {
            return Err(CpsError::bad_arg(format!(
                "pspace {} declares zero coordinate components",
                self.uid
            )));
        }
        if self.layout.lock_status.count == 0 {
            return Err(CpsError::bad_arg(format!(
                "pspace {} declares zero lock-status components",
                self.uid
            )));
        }
        for (i, v) in self.variations.iter().enumerate() {
            if !v.is_valid() {
                return Err(CpsError::bad_arg(format!(
                    "pspace {} lists the invalid variation sentinel",
                    self.uid
                )));
            }
            if self.variations[..i].contains(v) {
                return Err(CpsError::DuplicateInBatch { id: v.to_string() });
            }
        }
        Ok(())
    }
}
