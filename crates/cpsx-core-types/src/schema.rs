//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Entity identifiers
pub const FIELD_PSPACE: &str = "pspace";
pub const FIELD_DRIVER: &str = "driver";

// Collection sizes
pub const FIELD_POINT_COUNT: &str = "point_count";
pub const FIELD_RELSHP_COUNT: &str = "relshp_count";
pub const FIELD_COSTS_NEEDED: &str = "costs_needed";

// Solver progress
pub const FIELD_ITERATION: &str = "iteration";
pub const FIELD_COST: &str = "cost";
pub const FIELD_STATUS: &str = "status";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
