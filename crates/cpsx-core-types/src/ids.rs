//! Identifier vocabulary
//!
//! Two families of identifiers live here:
//!
//! - **UIDs** are chosen by the caller and name things the caller declares
//!   (parameter spaces, variations, cost functor kinds, relationship groups).
//! - **Ids** are minted by the CPS store from a free-list backed pool and are
//!   reused once released (points, relationships, cost functor registrations).
//!
//! Every identifier reserves `u32::MAX` as its `INVALID` sentinel.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Sentinel that never names a live entity
            pub const INVALID: Self = Self(u32::MAX);

            /// Wrap a raw value
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw integer value
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Slot index for table lookups
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// False only for the `INVALID` sentinel
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, concat!($prefix, ":{}"), self.0)
                } else {
                    write!(f, concat!($prefix, ":invalid"))
                }
            }
        }
    };
}

define_id!(
    /// Caller-chosen identifier of a parameter space
    PSpaceUid,
    "pspace"
);
define_id!(
    /// Caller-chosen identifier of a variation (alternate coordinate interpretation)
    VariationUid,
    "variation"
);
define_id!(
    /// Caller-chosen identifier of a cost functor kind
    CostFunctorUid,
    "cfunctor"
);
define_id!(
    /// Caller-chosen identifier of a relationship group
    RelshpGroupUid,
    "group"
);
define_id!(
    /// Pool-minted identifier of a parametric point
    PointId,
    "ppoint"
);
define_id!(
    /// Pool-minted identifier of a relationship
    RelshpId,
    "relshp"
);
define_id!(
    /// Pool-minted identifier of a cost functor registration
    CostFunctorId,
    "cfreg"
);
