//! Structured logging facility for draftline
//!
//! This module provides:
//! - Single initialization point via `init(profile)` or `init_from_config(&config)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use draftline_core::logging_facility::{init, Profile};
//!
//! // Initialize once at application startup
//! init(Profile::Development);
//! ```
//!
//! Engine operations own their start/end boundary: each public operation
//! emits exactly one `start` event and either one `end` or one `end_error`.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, init_from_config, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
