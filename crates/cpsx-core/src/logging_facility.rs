//! Structured logging facility for cpsx
//!
//! This module provides a canonical logging facility with:
//! - Single initialization point via `init(profile)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! The engine layer owns operation boundaries (exploration create, solve,
//! begin/step/end, result retrieval, driver load). The CPS store itself only
//! emits `tracing::debug!` events.
//!
//! # Usage
//!
//! ```rust
//! use cpsx_core::logging_facility::{init, Profile};
//!
//! // Initialize once at application startup
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
