//! # Player Configuration Module
//!
//! Configuration for a playback session.
//!
//! ## Overview
//!
//! [`PlayerConfig`] is constructed through a builder that holds the injected
//! engine capability and the numeric tuning. The builder validates fail-fast:
//! a session cannot be built without an [`EngineFactory`], and inconsistent
//! tuning is rejected before any engine is created.
//!
//! ## Required Dependencies
//!
//! - `EngineFactory` - Builds one pipeline engine per media source
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{PlayerConfig, PlaybackTuning};
//! use std::sync::Arc;
//!
//! let config = PlayerConfig::builder()
//!     .engine_factory(Arc::new(MyEngineFactory))
//!     .tuning(PlaybackTuning::streaming())
//!     .looping(true)
//!     .build()?;
//! ```
//!
//! Tuning can also be loaded from JSON; omitted fields keep their defaults:
//!
//! ```
//! use core_runtime::config::PlaybackTuning;
//!
//! let tuning = PlaybackTuning::from_json_str(r#"{ "buffering_low_percent": 25 }"#).unwrap();
//! assert_eq!(tuning.buffering_low_percent, 25);
//! assert_eq!(tuning.buffering_high_percent, 100);
//! ```

use crate::error::{Error, Result};
use bridge_traits::{EngineFactory, EngineOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Numeric knobs of the playback state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTuning {
    /// Cache fill level below which a playing session enters buffering.
    ///
    /// Default: 20.
    #[serde(default = "default_buffering_low_percent")]
    pub buffering_low_percent: u8,

    /// Cache fill level at which a buffering episode ends.
    ///
    /// Default: 100.
    #[serde(default = "default_buffering_high_percent")]
    pub buffering_high_percent: u8,

    /// How long `stop()` waits for the engine to confirm `Stopped` before the
    /// session is forced into `Error`.
    ///
    /// Default: 3 seconds.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: Duration,

    /// Bound for the synchronous prepare form.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_prepare_timeout")]
    pub prepare_timeout: Duration,

    /// Decode rate multiplier requested while a frame-accurate seek drains
    /// intermediate frames.
    ///
    /// Default: 4.0.
    #[serde(default = "default_accurate_seek_speedup")]
    pub accurate_seek_speedup: f32,

    /// Decode one frame after seeking while paused.
    ///
    /// Default: true.
    #[serde(default = "default_preroll_on_paused_seek")]
    pub preroll_on_paused_seek: bool,

    #[serde(default = "default_min_rate")]
    pub min_rate: f32,

    #[serde(default = "default_max_rate")]
    pub max_rate: f32,

    /// Events retained while no observer is attached; oldest are dropped.
    ///
    /// Default: 64.
    #[serde(default = "default_pending_event_limit")]
    pub pending_event_limit: usize,

    /// Per-subscriber buffer of the optional event bus mirror.
    ///
    /// Default: 100.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Panic on buffer ownership violations instead of returning an error.
    ///
    /// Default: on in debug builds, off in release builds.
    #[serde(default = "default_strict_buffer_ownership")]
    pub strict_buffer_ownership: bool,
}

impl Default for PlaybackTuning {
    fn default() -> Self {
        Self {
            buffering_low_percent: default_buffering_low_percent(),
            buffering_high_percent: default_buffering_high_percent(),
            stop_timeout: default_stop_timeout(),
            prepare_timeout: default_prepare_timeout(),
            accurate_seek_speedup: default_accurate_seek_speedup(),
            preroll_on_paused_seek: default_preroll_on_paused_seek(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            pending_event_limit: default_pending_event_limit(),
            event_bus_capacity: default_event_bus_capacity(),
            strict_buffer_ownership: default_strict_buffer_ownership(),
        }
    }
}

impl PlaybackTuning {
    /// Tuning for network sources on unstable links.
    ///
    /// - Enters buffering earlier (25%)
    /// - Longer stop/prepare bounds for slow transports
    pub fn streaming() -> Self {
        Self {
            buffering_low_percent: 25,
            stop_timeout: Duration::from_secs(5),
            prepare_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Tuning for local files: no pre-roll and short timeouts.
    pub fn local() -> Self {
        Self {
            stop_timeout: Duration::from_secs(1),
            prepare_timeout: Duration::from_secs(5),
            preroll_on_paused_seek: false,
            ..Default::default()
        }
    }

    /// Settings every engine of the session is built with.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            strict_buffer_ownership: self.strict_buffer_ownership,
        }
    }

    /// Parse tuning from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let tuning: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid playback tuning: {}", e)))?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.buffering_high_percent > 100 {
            return Err(Error::Config(
                "buffering_high_percent cannot exceed 100".to_string(),
            ));
        }

        if self.buffering_low_percent >= self.buffering_high_percent {
            return Err(Error::Config(
                "buffering_low_percent must be below buffering_high_percent".to_string(),
            ));
        }

        if self.stop_timeout.is_zero() {
            return Err(Error::Config("stop_timeout must be > 0".to_string()));
        }

        if self.prepare_timeout.is_zero() {
            return Err(Error::Config("prepare_timeout must be > 0".to_string()));
        }

        if !self.accurate_seek_speedup.is_finite() || self.accurate_seek_speedup < 1.0 {
            return Err(Error::Config(
                "accurate_seek_speedup must be a finite value >= 1.0".to_string(),
            ));
        }

        if !(self.min_rate.is_finite() && self.max_rate.is_finite())
            || self.min_rate <= 0.0
            || self.min_rate > self.max_rate
        {
            return Err(Error::Config(
                "rate bounds must satisfy 0 < min_rate <= max_rate".to_string(),
            ));
        }

        if self.pending_event_limit == 0 {
            return Err(Error::Config("pending_event_limit must be > 0".to_string()));
        }

        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be > 0".to_string()));
        }

        Ok(())
    }
}

fn default_buffering_low_percent() -> u8 {
    20
}

fn default_buffering_high_percent() -> u8 {
    100
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_prepare_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_accurate_seek_speedup() -> f32 {
    4.0
}

fn default_preroll_on_paused_seek() -> bool {
    true
}

fn default_min_rate() -> f32 {
    0.25
}

fn default_max_rate() -> f32 {
    4.0
}

fn default_pending_event_limit() -> usize {
    64
}

fn default_event_bus_capacity() -> usize {
    crate::events::DEFAULT_EVENT_BUFFER_SIZE
}

fn default_strict_buffer_ownership() -> bool {
    cfg!(debug_assertions)
}

/// Session configuration.
#[derive(Clone)]
pub struct PlayerConfig {
    /// Builds the pipeline engine for each source (required)
    pub engine_factory: Arc<dyn EngineFactory>,

    pub tuning: PlaybackTuning,

    /// Restart from the beginning on end-of-stream instead of completing
    pub looping: bool,

    /// Mirror dispatched events onto a broadcast bus
    pub enable_event_bus: bool,
}

impl std::fmt::Debug for PlayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerConfig")
            .field(
                "engine_factory",
                &format!("EngineFactory {{ {} }}", self.engine_factory.name()),
            )
            .field("tuning", &self.tuning)
            .field("looping", &self.looping)
            .field("enable_event_bus", &self.enable_event_bus)
            .finish()
    }
}

impl PlayerConfig {
    /// Creates a new builder for constructing a `PlayerConfig`.
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.tuning.validate()
    }
}

/// Builder for constructing [`PlayerConfig`] instances.
#[derive(Default)]
pub struct PlayerConfigBuilder {
    engine_factory: Option<Arc<dyn EngineFactory>>,
    tuning: Option<PlaybackTuning>,
    looping: bool,
    enable_event_bus: bool,
}

impl PlayerConfigBuilder {
    /// Sets the engine factory implementation (required).
    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn tuning(mut self, tuning: PlaybackTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn looping(mut self, enabled: bool) -> Self {
        self.looping = enabled;
        self
    }

    /// Enables the broadcast mirror of the event stream.
    pub fn enable_event_bus(mut self, enabled: bool) -> Self {
        self.enable_event_bus = enabled;
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] if no engine factory was supplied
    /// - [`Error::Config`] if the tuning is inconsistent
    pub fn build(self) -> Result<PlayerConfig> {
        let engine_factory = self.engine_factory.ok_or_else(|| Error::CapabilityMissing {
            capability: "EngineFactory".to_string(),
            message: "An EngineFactory implementation is required to build pipeline engines. \
                      Use .engine_factory() to inject one."
                .to_string(),
        })?;

        let config = PlayerConfig {
            engine_factory,
            tuning: self.tuning.unwrap_or_default(),
            looping: self.looping,
            enable_event_bus: self.enable_event_bus,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{
        BridgeError, MediaSource, NotificationSink, PipelineEngine, Result as BridgeResult,
    };

    struct NullFactory;

    impl EngineFactory for NullFactory {
        fn create(
            &self,
            _source: &MediaSource,
            _options: EngineOptions,
            _sink: Arc<dyn NotificationSink>,
        ) -> BridgeResult<Arc<dyn PipelineEngine>> {
            Err(BridgeError::NotAvailable("null".to_string()))
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    #[test]
    fn test_default_tuning_is_valid() {
        let tuning = PlaybackTuning::default();
        assert!(tuning.validate().is_ok());
        assert_eq!(tuning.buffering_low_percent, 20);
        assert_eq!(tuning.buffering_high_percent, 100);
        assert_eq!(tuning.stop_timeout, Duration::from_secs(3));
        assert_eq!(tuning.strict_buffer_ownership, cfg!(debug_assertions));
    }

    #[test]
    fn test_engine_options_follow_tuning() {
        let tuning = PlaybackTuning {
            strict_buffer_ownership: false,
            ..PlaybackTuning::default()
        };
        assert!(!tuning.engine_options().strict_buffer_ownership);

        let strict =
            PlaybackTuning::from_json_str(r#"{ "strict_buffer_ownership": true }"#).unwrap();
        assert!(strict.engine_options().strict_buffer_ownership);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(PlaybackTuning::streaming().validate().is_ok());
        assert!(PlaybackTuning::local().validate().is_ok());
        assert!(!PlaybackTuning::local().preroll_on_paused_seek);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let tuning = PlaybackTuning {
            buffering_low_percent: 100,
            ..Default::default()
        };
        assert!(matches!(tuning.validate(), Err(Error::Config(_))));

        let tuning = PlaybackTuning {
            buffering_high_percent: 120,
            ..Default::default()
        };
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_invalid_rates_rejected() {
        let tuning = PlaybackTuning {
            min_rate: 2.0,
            max_rate: 1.0,
            ..Default::default()
        };
        assert!(tuning.validate().is_err());

        let tuning = PlaybackTuning {
            max_rate: f32::NAN,
            ..Default::default()
        };
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let tuning = PlaybackTuning {
            stop_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let tuning = PlaybackTuning::from_json_str(
            r#"{ "buffering_low_percent": 30, "preroll_on_paused_seek": false }"#,
        )
        .unwrap();
        assert_eq!(tuning.buffering_low_percent, 30);
        assert!(!tuning.preroll_on_paused_seek);
        assert_eq!(tuning.max_rate, 4.0);
    }

    #[test]
    fn test_from_json_rejects_garbage_and_invalid() {
        assert!(matches!(
            PlaybackTuning::from_json_str("not json"),
            Err(Error::Config(_))
        ));
        assert!(PlaybackTuning::from_json_str(r#"{ "pending_event_limit": 0 }"#).is_err());
    }

    #[test]
    fn test_builder_requires_engine_factory() {
        let result = PlayerConfig::builder().looping(true).build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "EngineFactory");
            }
            other => panic!("expected CapabilityMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_builder_success() {
        let config = PlayerConfig::builder()
            .engine_factory(Arc::new(NullFactory))
            .tuning(PlaybackTuning::streaming())
            .looping(true)
            .enable_event_bus(true)
            .build()
            .unwrap();

        assert!(config.looping);
        assert!(config.enable_event_bus);
        assert_eq!(config.tuning.buffering_low_percent, 25);
        assert!(format!("{:?}", config).contains("EngineFactory { null }"));
    }

    #[test]
    fn test_builder_rejects_invalid_tuning() {
        let result = PlayerConfig::builder()
            .engine_factory(Arc::new(NullFactory))
            .tuning(PlaybackTuning {
                event_bus_capacity: 0,
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
