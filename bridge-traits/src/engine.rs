//! Pipeline engine capability interface.
//!
//! The playback controller drives exactly one [`PipelineEngine`] per session.
//! Engines are built by an [`EngineFactory`] chosen when the session is
//! constructed, so hardware-backed and software engines are interchangeable
//! behind the same controller.
//!
//! ## Threading
//!
//! Engine worker threads (demux, codec completion, render clock) report
//! progress through the [`NotificationSink`] handed to the factory. The sink
//! only enqueues; it never runs controller or observer code on the calling
//! thread, so engines may notify while holding their own internal locks.

use crate::error::Result;
use crate::source::{MediaInfo, MediaSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Seek accuracy requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeekMode {
    /// Nearest sync frame at or before the target.
    PreviousSync,
    /// Nearest sync frame at or after the target.
    NextSync,
    /// Sync frame closest to the target in either direction.
    ClosestSync,
    /// Frame-accurate: decode and discard until the exact target.
    Closest,
}

impl SeekMode {
    /// Returns `true` if the engine must decode past sync frames to land on
    /// the exact target timestamp.
    pub fn is_accurate(&self) -> bool {
        matches!(self, SeekMode::Closest)
    }
}

/// Pipeline state as reported by the engine itself.
///
/// This is deliberately coarser than the session state machine: the engine
/// knows nothing about user intent, buffering episodes or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Preparing,
    Prepared,
    Started,
    Paused,
    Stopped,
}

/// Asynchronous notifications emitted by engine worker threads.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    StateChanged(EngineState),
    /// Format detection finished; carries duration and resolved tracks.
    MediaInfo(MediaInfo),
    EndOfStream,
    Error { code: i32, message: String },
    /// Network cache fill level, 0–100.
    BufferingPercent(u8),
    /// The most recently issued engine seek has landed.
    SeekDone { position: Duration },
    TrackChanged(usize),
    /// Presentation time of the most recently rendered frame.
    PositionChanged(Duration),
}

impl EngineNotification {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineNotification::StateChanged(_) => "state_changed",
            EngineNotification::MediaInfo(_) => "media_info",
            EngineNotification::EndOfStream => "end_of_stream",
            EngineNotification::Error { .. } => "error",
            EngineNotification::BufferingPercent(_) => "buffering_percent",
            EngineNotification::SeekDone { .. } => "seek_done",
            EngineNotification::TrackChanged(_) => "track_changed",
            EngineNotification::PositionChanged(_) => "position_changed",
        }
    }
}

/// Receiver for engine notifications.
///
/// Implementations must be non-blocking and callable from any thread.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: EngineNotification);
}

/// Demux/decode/render pipeline driven by the playback controller.
///
/// Every primitive returns once the engine has *accepted* the command.
/// Completion of long-running work (prepare, seek, stop) is reported through
/// the [`NotificationSink`].
#[async_trait]
pub trait PipelineEngine: Send + Sync {
    /// Begin format detection and codec setup. Completion is reported as
    /// `MediaInfo` followed by `StateChanged(Prepared)`.
    async fn prepare(&self) -> Result<()>;

    /// Start or resume the render clock.
    async fn start(&self) -> Result<()>;

    /// Pause the render clock; decoded frames stay queued.
    async fn pause(&self) -> Result<()>;

    /// Tear down decode/render; confirmed with `StateChanged(Stopped)`.
    async fn stop(&self) -> Result<()>;

    /// Reposition the demuxer. Confirmed with `SeekDone`.
    async fn seek(&self, position: Duration, mode: SeekMode) -> Result<()>;

    /// Drop every in-flight buffer. Only called with the pipeline paused.
    async fn flush(&self) -> Result<()>;

    async fn set_rate(&self, rate: f32) -> Result<()>;

    async fn select_track(&self, index: usize) -> Result<()>;

    /// Decode one frame at the current position while paused so the
    /// displayed frame matches the new position.
    async fn preroll(&self) -> Result<()> {
        Ok(())
    }

    /// Temporarily raise the decode rate target by `factor` so an accurate
    /// seek drains intermediate frames quickly. `None` restores real time.
    async fn set_decode_speedup(&self, _factor: Option<f32>) -> Result<()> {
        Ok(())
    }

    /// Release every native resource. Must be idempotent.
    async fn release(&self) -> Result<()>;

    /// Backend name used in logs.
    fn name(&self) -> &'static str;
}

/// Session settings handed to every engine a factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Panic on buffer ownership violations instead of returning an error.
    pub strict_buffer_ownership: bool,
}

/// Builds engines for a given source.
pub trait EngineFactory: Send + Sync {
    /// Construct an engine bound to `source`, reporting through `sink`.
    ///
    /// The engine must not emit notifications before this call returns.
    fn create(
        &self,
        source: &MediaSource,
        options: EngineOptions,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Arc<dyn PipelineEngine>>;

    /// Backend name used in logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accurate_seek_modes() {
        assert!(SeekMode::Closest.is_accurate());
        assert!(!SeekMode::ClosestSync.is_accurate());
        assert!(!SeekMode::PreviousSync.is_accurate());
        assert!(!SeekMode::NextSync.is_accurate());
    }

    #[test]
    fn notification_kinds() {
        assert_eq!(EngineNotification::EndOfStream.kind(), "end_of_stream");
        assert_eq!(
            EngineNotification::SeekDone {
                position: Duration::from_millis(10)
            }
            .kind(),
            "seek_done"
        );
    }

    #[test]
    fn mock_sink_receives_notifications() {
        let mut sink = MockNotificationSink::new();
        sink.expect_notify()
            .withf(|n| matches!(n, EngineNotification::BufferingPercent(42)))
            .times(1)
            .return_const(());

        let sink: Arc<dyn NotificationSink> = Arc::new(sink);
        sink.notify(EngineNotification::BufferingPercent(42));
    }
}
