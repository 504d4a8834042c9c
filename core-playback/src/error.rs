//! # Playback Error Types
//!
//! Error taxonomy of the playback session.
//!
//! Validation failures (`InvalidState`, `InvalidParameter`) are returned
//! synchronously and leave the session untouched. Engine failures and
//! timeouts move the session to `Error` and are also dispatched to the
//! observer.

use crate::state::PlaybackState;
use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Operation is not allowed from the current state.
    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PlaybackState,
    },

    /// Argument rejected before touching the session.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No source has been set on the session.
    #[error("No media source set")]
    NoSource,

    /// The controller has been released.
    #[error("Controller has been released")]
    Released,

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// Format detection resolved no playable tracks.
    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),

    /// The engine rejected a command or reported a fault.
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// The engine did not confirm an operation in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// Invalid configuration or missing runtime.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlaybackError {
    /// Returns `true` if the session is unaffected and the caller may retry
    /// with different input or after a state change.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidState { .. }
                | PlaybackError::InvalidParameter(_)
                | PlaybackError::NoSource
        )
    }

    /// Returns `true` if this error moves the session to `Error`.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            PlaybackError::EngineFailure(_)
                | PlaybackError::Timeout { .. }
                | PlaybackError::UnsupportedFormat(_)
        )
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::UnsupportedFormat(msg) => PlaybackError::UnsupportedFormat(msg),
            BridgeError::InvalidParameter(msg) => PlaybackError::InvalidParameter(msg),
            other => PlaybackError::EngineFailure(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for PlaybackError {
    fn from(err: core_runtime::Error) -> Self {
        PlaybackError::Config(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
