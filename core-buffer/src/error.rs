use crate::owner::{BufferOwner, PoolDirection};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Slot {index} is owned by {owner}, not the engine")]
    NotOwned { index: usize, owner: BufferOwner },

    #[error("Unknown buffer index: {0}")]
    UnknownIndex(usize),

    #[error("Pool is frozen; no new slots can be allocated")]
    PoolFrozen,

    #[error("Pool exhausted: at most {max} slots")]
    PoolExhausted { max: usize },

    #[error("Ownership violation in {operation} on slot {index}: expected {expected}, found {actual}")]
    OwnershipViolation {
        operation: &'static str,
        index: usize,
        expected: BufferOwner,
        actual: BufferOwner,
    },

    #[error("Slot {0} was reclaimed by a flush")]
    Flushed(usize),

    #[error("{operation} is not valid on a {direction} pool")]
    WrongDirection {
        operation: &'static str,
        direction: PoolDirection,
    },

    #[error("Codec configuration must be queued before the first frame")]
    CodecConfigAfterStart,
}

impl BufferError {
    /// Returns `true` for protocol breaches (as opposed to expected races
    /// such as a flush reclaiming a held slot).
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            BufferError::OwnershipViolation { .. } | BufferError::WrongDirection { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BufferError>;
