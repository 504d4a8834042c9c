//! # Pipeline Bridge Traits
//!
//! Contracts between the playback core and the collaborators it does not
//! implement itself.
//!
//! ## Overview
//!
//! The core drives a demux/decode/render pipeline it knows only through the
//! [`PipelineEngine`](engine::PipelineEngine) capability. Each platform ships
//! an engine (hardware codecs, software decoders, a simulator for tests)
//! behind an [`EngineFactory`](engine::EngineFactory) selected when a session
//! is constructed.
//!
//! ## Traits
//!
//! - [`PipelineEngine`](engine::PipelineEngine) - Prepare/Start/Pause/Stop/Seek/Flush primitives
//! - [`EngineFactory`](engine::EngineFactory) - Builds one engine per media source
//! - [`NotificationSink`](engine::NotificationSink) - Non-blocking channel for engine callbacks
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Engines report failures as [`BridgeError`](error::BridgeError). The core
//! maps them onto its own taxonomy; `UnsupportedFormat` in particular is
//! surfaced to callers unchanged.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. Notifications may arrive on any thread.

pub mod engine;
pub mod error;
pub mod logging;
pub mod source;

pub use error::{BridgeError, Result};

pub use engine::{
    EngineFactory, EngineNotification, EngineOptions, EngineState, NotificationSink,
    PipelineEngine, SeekMode,
};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use source::{MediaInfo, MediaSource, TrackInfo, TrackKind};
