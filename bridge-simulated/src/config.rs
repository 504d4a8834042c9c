//! Simulated media and pipeline timing.

use bridge_traits::{MediaInfo, TrackInfo, TrackKind};
use std::time::Duration;

/// Describes the media a simulated engine pretends to decode and how fast
/// its stages respond.
#[derive(Debug, Clone)]
pub struct SimulatedEngineConfig {
    /// `None` simulates a live stream (unknown duration, not seekable).
    pub duration: Option<Duration>,
    pub tracks: Vec<TrackInfo>,
    /// Presentation-time distance between two rendered frames.
    pub frame_interval: Duration,
    pub prepare_latency: Duration,
    pub seek_latency: Duration,
    pub stop_latency: Duration,
    /// When `false` the engine never reports `Stopped`.
    pub confirm_stop: bool,
    /// Report `Error { code, message }` instead of finishing prepare.
    pub prepare_error: Option<(i32, String)>,
    pub input_slots: usize,
    pub output_slots: usize,
}

impl Default for SimulatedEngineConfig {
    fn default() -> Self {
        Self {
            duration: Some(Duration::from_secs(10)),
            tracks: vec![
                TrackInfo::new(0, TrackKind::Video, "video/avc"),
                TrackInfo::new(1, TrackKind::Audio, "audio/mp4a-latm").with_language("en"),
            ],
            frame_interval: Duration::from_millis(40),
            prepare_latency: Duration::from_millis(20),
            seek_latency: Duration::from_millis(10),
            stop_latency: Duration::from_millis(5),
            confirm_stop: true,
            prepare_error: None,
            input_slots: 4,
            output_slots: 4,
        }
    }
}

impl SimulatedEngineConfig {
    /// Unbounded stream without a known duration.
    pub fn live() -> Self {
        Self {
            duration: None,
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<TrackInfo>) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_prepare_latency(mut self, latency: Duration) -> Self {
        self.prepare_latency = latency;
        self
    }

    pub fn with_seek_latency(mut self, latency: Duration) -> Self {
        self.seek_latency = latency;
        self
    }

    pub fn with_stop_latency(mut self, latency: Duration) -> Self {
        self.stop_latency = latency;
        self
    }

    pub fn with_confirm_stop(mut self, confirm: bool) -> Self {
        self.confirm_stop = confirm;
        self
    }

    pub fn with_prepare_error(mut self, code: i32, message: impl Into<String>) -> Self {
        self.prepare_error = Some((code, message.into()));
        self
    }

    pub(crate) fn media_info(&self) -> MediaInfo {
        MediaInfo::new(self.duration, self.tracks.clone())
    }
}
