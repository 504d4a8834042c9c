//! Source and track descriptors handed to pipeline engines.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Media source a session is bound to.
///
/// The controller never interprets the bytes behind a source; it forwards the
/// descriptor to the [`EngineFactory`](crate::engine::EngineFactory), which
/// picks the demux path.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// File accessible to the host process.
    LocalFile { path: PathBuf },
    /// Network stream fetched by the engine's transport stage.
    RemoteStream {
        url: String,
        headers: HashMap<String, String>,
    },
    /// Encoded media held in memory by the caller.
    MemoryBuffer { data: Bytes },
}

impl MediaSource {
    /// Shorthand for a local file source.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        MediaSource::LocalFile { path: path.into() }
    }

    /// Shorthand for a remote stream without extra headers.
    pub fn remote(url: impl Into<String>) -> Self {
        MediaSource::RemoteStream {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Returns `true` if the source is fetched over the network.
    ///
    /// Only network sources produce buffering-percent notifications worth
    /// acting on.
    pub fn is_remote(&self) -> bool {
        matches!(self, MediaSource::RemoteStream { .. })
    }

    /// Returns `true` if the source has a known, bounded length.
    pub fn is_finite(&self) -> bool {
        !self.is_remote()
    }

    /// Human-readable descriptor used in logs. Callers should still pass the
    /// result through a redaction helper before logging.
    pub fn describe(&self) -> String {
        match self {
            MediaSource::LocalFile { path } => path.display().to_string(),
            MediaSource::RemoteStream { url, .. } => url.clone(),
            MediaSource::MemoryBuffer { data } => format!("memory:{} bytes", data.len()),
        }
    }
}

/// Elementary stream category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
    Subtitle,
}

/// One elementary stream resolved by the demuxer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Index used by `SelectTrack`.
    pub index: usize,
    pub kind: TrackKind,
    /// Codec mime type, e.g. `audio/mp4a-latm`.
    pub mime: String,
    pub language: Option<String>,
}

impl TrackInfo {
    pub fn new(index: usize, kind: TrackKind, mime: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            mime: mime.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Result of format detection, reported by the engine while preparing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    /// Total duration; `None` for live streams.
    pub duration: Option<Duration>,
    pub tracks: Vec<TrackInfo>,
    pub seekable: bool,
}

impl MediaInfo {
    pub fn new(duration: Option<Duration>, tracks: Vec<TrackInfo>) -> Self {
        Self {
            duration,
            tracks,
            seekable: duration.is_some(),
        }
    }

    pub fn with_seekable(mut self, seekable: bool) -> Self {
        self.seekable = seekable;
        self
    }

    /// Returns `true` if the demuxer resolved at least one playable track.
    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_classification() {
        assert!(MediaSource::remote("https://cdn.example.com/a.m3u8").is_remote());
        assert!(MediaSource::file("/tmp/a.mp4").is_finite());
        let mem = MediaSource::MemoryBuffer {
            data: Bytes::from_static(b"abc"),
        };
        assert!(mem.is_finite());
        assert_eq!(mem.describe(), "memory:3 bytes");
    }

    #[test]
    fn media_info_seekable_follows_duration() {
        let vod = MediaInfo::new(Some(Duration::from_secs(10)), Vec::new());
        assert!(vod.seekable);
        assert!(!vod.has_tracks());

        let live = MediaInfo::new(None, vec![TrackInfo::new(0, TrackKind::Audio, "audio/aac")]);
        assert!(!live.seekable);
        assert!(live.has_tracks());
    }
}
