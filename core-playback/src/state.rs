//! Session states and the operation table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Initialized,
    Preparing,
    Prepared,
    Playing,
    Paused,
    Stopping,
    Stopped,
    PlaybackCompleted,
    /// Terminal until `reset()`.
    Error,
}

impl PlaybackState {
    /// Returns `true` if the session has a prepared pipeline.
    pub fn is_prepared(self) -> bool {
        matches!(
            self,
            PlaybackState::Prepared
                | PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::PlaybackCompleted
        )
    }

    /// Returns `true` if `op` may be issued from this state.
    ///
    /// No-op requests (pausing while paused, stopping while stopped) are
    /// allowed and resolved by the controller.
    pub fn allows(self, op: PlaybackOp) -> bool {
        use PlaybackState::*;
        match op {
            PlaybackOp::SetSource => self == Idle,
            PlaybackOp::Prepare => matches!(self, Initialized | Stopped),
            PlaybackOp::Play => {
                matches!(self, Prepared | Playing | Paused | Stopped | PlaybackCompleted)
            }
            PlaybackOp::Pause => matches!(self, Prepared | Playing | Paused | PlaybackCompleted),
            PlaybackOp::Seek => self.is_prepared(),
            PlaybackOp::Stop => !matches!(self, Idle | Error),
            PlaybackOp::SetRate | PlaybackOp::SelectTrack => {
                matches!(self, Prepared | Playing | Paused)
            }
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle operations subject to the state table.
///
/// `reset` and `release` are accepted from every state and are not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackOp {
    SetSource,
    Prepare,
    Play,
    Pause,
    Seek,
    Stop,
    SetRate,
    SelectTrack,
}

impl PlaybackOp {
    pub fn name(self) -> &'static str {
        match self {
            PlaybackOp::SetSource => "set_source",
            PlaybackOp::Prepare => "prepare",
            PlaybackOp::Play => "play",
            PlaybackOp::Pause => "pause",
            PlaybackOp::Seek => "seek",
            PlaybackOp::Stop => "stop",
            PlaybackOp::SetRate => "set_rate",
            PlaybackOp::SelectTrack => "select_track",
        }
    }
}
