//! Media framework facade crate.
//!
//! Re-exports the workspace crates so hosts can depend on `media-framework`
//! alone and pick the pipeline engine backend through feature flags:
//!
//! - `simulated-engine` (default): the in-process timer-driven engine from
//!   `bridge-simulated`, useful for development and integration tests.
//!
//! Hosts shipping a hardware-backed engine implement
//! [`bridge_traits::EngineFactory`] themselves and disable default features.

pub use bridge_traits;
pub use core_buffer;
pub use core_playback;
pub use core_runtime;

#[cfg(feature = "simulated-engine")]
pub use bridge_simulated;

pub use core_playback::{
    PlaybackController, PlaybackError, PlaybackState, PlayerEvent, PlayerObserver,
};
pub use core_runtime::config::{PlayerConfig, PlaybackTuning};
