//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the playback core:
//! - Logging and tracing infrastructure
//! - Player configuration (required bridges plus tuning knobs)
//! - Generic broadcast event bus
//!
//! ## Overview
//!
//! Nothing in this crate knows about playback states or buffers. It fixes the
//! logging conventions, the configuration surface and the fan-out mechanism
//! the higher-level crates build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
