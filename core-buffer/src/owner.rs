//! Slot ownership and pool direction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Party currently holding the claim on a slot.
///
/// Ownership advances in a fixed cycle:
/// `Engine -> Application -> Downstream -> Engine -> ...`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferOwner {
    /// Handed out by `get_buffer`; the application may read or fill it.
    Application,
    /// Announced by `on_buffer_ready`; waiting to be claimed.
    Engine,
    /// Released to the codec or renderer, or reclaimed by a flush.
    Downstream,
}

impl BufferOwner {
    /// The owner that follows `self` in the cycle.
    pub fn next(self) -> Self {
        match self {
            BufferOwner::Engine => BufferOwner::Application,
            BufferOwner::Application => BufferOwner::Downstream,
            BufferOwner::Downstream => BufferOwner::Engine,
        }
    }
}

impl fmt::Display for BufferOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferOwner::Application => "application",
            BufferOwner::Engine => "engine",
            BufferOwner::Downstream => "downstream",
        };
        f.write_str(name)
    }
}

/// Which way data flows through a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolDirection {
    /// The application fills slots and queues them (codec input).
    Production,
    /// The application consumes filled slots and returns them (codec output,
    /// renderer).
    Consumption,
}

impl fmt::Display for PoolDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolDirection::Production => f.write_str("production"),
            PoolDirection::Consumption => f.write_str("consumption"),
        }
    }
}
