//! Buffer descriptors exchanged across the ownership protocol.

use crate::owner::BufferOwner;
use bytes::Bytes;
use std::time::Duration;

bitflags::bitflags! {
    /// Per-buffer flags attached when a slot is queued downstream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const END_OF_STREAM = 1;
        const SYNC_FRAME = 1 << 1;
        const CODEC_CONFIG = 1 << 2;
    }
}

/// Metadata attached to a queued buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    pub presentation_time: Duration,
    /// Valid bytes starting at `offset`.
    pub size: usize,
    pub offset: usize,
}

impl BufferInfo {
    pub fn new(presentation_time: Duration, size: usize) -> Self {
        Self {
            presentation_time,
            size,
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Handle to the memory behind a slot.
///
/// `id` is the identity the engine uses when announcing the buffer again;
/// the payload is reference counted so handing the handle out never copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferHandle {
    pub id: u64,
    pub data: Bytes,
}

impl BufferHandle {
    pub fn new(id: u64, data: Bytes) -> Self {
        Self { id, data }
    }

    /// Handle without payload, for engines that keep memory on their side.
    pub fn opaque(id: u64) -> Self {
        Self {
            id,
            data: Bytes::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// One tracked slot of a pool.
#[derive(Debug, Clone)]
pub struct BufferWrapper {
    /// Stable for the lifetime of the pool.
    pub index: usize,
    pub owner: BufferOwner,
    pub handle: BufferHandle,
    pub info: BufferInfo,
    pub flags: BufferFlags,
    /// Set when a flush took the slot away from the application.
    pub(crate) reclaimed: bool,
}

impl BufferWrapper {
    pub(crate) fn new(index: usize, handle: BufferHandle) -> Self {
        Self {
            index,
            owner: BufferOwner::Engine,
            handle,
            info: BufferInfo::default(),
            flags: BufferFlags::empty(),
            reclaimed: false,
        }
    }

    pub fn is_reclaimed(&self) -> bool {
        self.reclaimed
    }
}
