//! # Playback Session Core
//!
//! State machine, buffering policy and seek coordination for a media
//! playback session.
//!
//! ## Overview
//!
//! A [`PlaybackController`] owns one session. It validates every lifecycle
//! request against the current [`PlaybackState`], drives a
//! [`PipelineEngine`](bridge_traits::PipelineEngine) through ordered command
//! sequences, and reports progress to a single [`PlayerObserver`] in a total
//! order.
//!
//! This module handles:
//! - The session state machine and its operation table
//! - Network buffering with low/high watermarks, independent of user pause
//! - Seek ordering, superseded-seek suppression and accurate-seek speed-up
//! - Looping, completion and restart after stop
//! - Ordered event dispatch with replay for late observers
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{PlaybackController, PlaybackState};
//! use core_runtime::config::PlayerConfig;
//!
//! let config = PlayerConfig::builder().engine_factory(factory).build()?;
//! let controller = PlaybackController::new(config)?;
//! controller.set_source(MediaSource::file("/media/clip.mp4")).await?;
//! controller.prepare_and_wait().await?;
//! controller.play().await?;
//! assert_eq!(controller.state(), PlaybackState::Playing);
//! ```

pub mod buffering;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod seek;
pub mod session;
pub mod state;

pub use buffering::{BufferingController, BufferingDecision, BufferingState, PipelineContext};
pub use controller::PlaybackController;
pub use error::{PlaybackError, Result};
pub use events::{PlayerEvent, PlayerObserver};
pub use seek::{SeekCoordinator, SeekPlan, SeekRequest, SeekStep, SeekTrigger};
pub use session::SessionSnapshot;
pub use state::{PlaybackOp, PlaybackState};
