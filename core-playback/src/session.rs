//! Session data guarded by the controller's session lock.

use crate::buffering::BufferingController;
use crate::error::{PlaybackError, Result};
use crate::seek::SeekCoordinator;
use crate::state::PlaybackState;
use bridge_traits::{MediaInfo, MediaSource, PipelineEngine, TrackInfo};
use core_runtime::config::PlaybackTuning;
use core_runtime::logging::source_label;
use std::sync::Arc;
use std::time::Duration;

/// Mutable session state. Only touched with the session lock held.
pub(crate) struct SessionCore {
    pub state: PlaybackState,
    pub source: Option<MediaSource>,
    pub engine: Option<Arc<dyn PipelineEngine>>,
    /// Tag of the current engine; notifications carrying another tag are stale.
    pub generation: u64,
    pub media: Option<MediaInfo>,
    pub position: Duration,
    pub rate: f32,
    pub looping: bool,
    pub selected_track: Option<usize>,
    /// The engine render clock is running (Start confirmed, not paused since).
    pub pipeline_running: bool,
    /// Completion was reached on a remote source with the pipeline running.
    pub completed_while_streaming: bool,
    pub last_error: Option<PlaybackError>,
    pub buffering: BufferingController,
    pub seeks: SeekCoordinator,
}

impl SessionCore {
    pub fn new(tuning: &PlaybackTuning, looping: bool) -> Self {
        Self {
            state: PlaybackState::Idle,
            source: None,
            engine: None,
            generation: 0,
            media: None,
            position: Duration::ZERO,
            rate: 1.0,
            looping,
            selected_track: None,
            pipeline_running: false,
            completed_while_streaming: false,
            last_error: None,
            buffering: BufferingController::new(
                tuning.buffering_low_percent,
                tuning.buffering_high_percent,
            ),
            seeks: SeekCoordinator::new(),
        }
    }

    pub fn engine(&self) -> Result<Arc<dyn PipelineEngine>> {
        self.engine.clone().ok_or(PlaybackError::NoSource)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.media.as_ref().and_then(|m| m.duration)
    }

    pub fn is_remote(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_remote())
    }

    /// Drop everything tied to the current source. Looping is a session
    /// setting and survives.
    pub fn clear_source(&mut self) {
        self.source = None;
        self.engine = None;
        self.media = None;
        self.position = Duration::ZERO;
        self.rate = 1.0;
        self.selected_track = None;
        self.pipeline_running = false;
        self.completed_while_streaming = false;
        self.last_error = None;
        self.buffering.reset();
        self.seeks.reset();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let buffering = self.buffering.state();
        SessionSnapshot {
            state: self.state,
            position: self.position,
            duration: self.duration(),
            rate: self.rate,
            looping: self.looping,
            is_buffering: buffering.is_buffering,
            cache_percent: buffering.cache_percent,
            is_user_paused: buffering.is_user_paused,
            selected_track: self.selected_track,
            tracks: self
                .media
                .as_ref()
                .map(|m| m.tracks.clone())
                .unwrap_or_default(),
            seekable: self.media.as_ref().is_some_and(|m| m.seekable),
            source: self.source.as_ref().map(source_label),
            last_error: self.last_error.clone(),
        }
    }
}

/// Read-only copy of the session, readable without the session lock.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub rate: f32,
    pub looping: bool,
    pub is_buffering: bool,
    pub cache_percent: u8,
    pub is_user_paused: bool,
    pub selected_track: Option<usize>,
    pub tracks: Vec<TrackInfo>,
    pub seekable: bool,
    /// Redacted source label.
    pub source: Option<String>,
    pub last_error: Option<PlaybackError>,
}

impl SessionSnapshot {
    pub(crate) fn initial(looping: bool) -> Self {
        Self {
            state: PlaybackState::Idle,
            position: Duration::ZERO,
            duration: None,
            rate: 1.0,
            looping,
            is_buffering: false,
            cache_percent: 100,
            is_user_paused: false,
            selected_track: None,
            tracks: Vec::new(),
            seekable: false,
            source: None,
            last_error: None,
        }
    }
}
