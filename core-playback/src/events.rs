//! Events delivered to the session observer.

use crate::state::PlaybackState;
use core_runtime::events::EventSeverity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flattened event stream of a playback session, in dispatch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerEvent {
    StateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    /// Cache fell below the low threshold; emitted once per episode.
    BufferingStart { percent: u8 },
    BufferingEnd { percent: u8 },
    BufferingProgress { percent: u8 },
    /// A user seek landed. Superseded and internal seeks are not reported.
    SeekDone { position: Duration },
    TrackChanged { index: usize },
    RateChanged { rate: f32 },
    /// End of stream with looping enabled; playback restarted from zero.
    Looped,
    PositionChanged {
        position: Duration,
        duration: Option<Duration>,
    },
    Error { message: String, code: Option<i32> },
}

impl PlayerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlayerEvent::StateChanged { .. } => "Playback state changed",
            PlayerEvent::BufferingStart { .. } => "Buffering started",
            PlayerEvent::BufferingEnd { .. } => "Buffering finished",
            PlayerEvent::BufferingProgress { .. } => "Buffering progress",
            PlayerEvent::SeekDone { .. } => "Seek completed",
            PlayerEvent::TrackChanged { .. } => "Track changed",
            PlayerEvent::RateChanged { .. } => "Playback rate changed",
            PlayerEvent::Looped => "Playback looped",
            PlayerEvent::PositionChanged { .. } => "Position updated",
            PlayerEvent::Error { .. } => "Playback error",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::Error { .. } => EventSeverity::Error,
            PlayerEvent::BufferingStart { .. } => EventSeverity::Warning,
            PlayerEvent::StateChanged { .. }
            | PlayerEvent::SeekDone { .. }
            | PlayerEvent::TrackChanged { .. }
            | PlayerEvent::RateChanged { .. }
            | PlayerEvent::BufferingEnd { .. }
            | PlayerEvent::Looped => EventSeverity::Info,
            PlayerEvent::BufferingProgress { .. } | PlayerEvent::PositionChanged { .. } => {
                EventSeverity::Debug
            }
        }
    }
}

/// Receives session events on the dispatcher thread.
///
/// Calls never overlap and arrive in dispatch order. Implementations may
/// call back into the controller only through a runtime handle (the
/// dispatcher thread is not a tokio worker).
pub trait PlayerObserver: Send + Sync {
    fn on_event(&self, event: PlayerEvent);
}

impl<F> PlayerObserver for F
where
    F: Fn(PlayerEvent) + Send + Sync,
{
    fn on_event(&self, event: PlayerEvent) {
        self(event)
    }
}
