//! # Buffer Pool
//!
//! Tracks the slots exchanged between the engine, the application and the
//! codec or renderer downstream of it.
//!
//! ## Protocol
//!
//! ```text
//!   on_buffer_ready        get_buffer         queue_buffer / return_buffer
//! ─────────────────> Engine ─────────> Application ─────────────────────> Downstream
//!        ^                                                                    │
//!        └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `flush()` moves every slot to `Downstream` regardless of its owner. It is
//! only issued with the pipeline paused.
//!
//! ## Locking
//!
//! Every pool has its own mutex. It is never held while calling out, so pool
//! operations are safe from any thread, including engine callback threads
//! that already hold session-level locks elsewhere.
//!
//! ## Violations
//!
//! Releasing a slot the application does not hold, or announcing a slot that
//! is still held upstream, is a protocol breach. Strict pools log and panic;
//! lenient pools log and return the error. A slot taken back by a flush while
//! the application held it is not a breach: releasing it afterwards returns
//! [`BufferError::Flushed`].

use crate::buffer::{BufferFlags, BufferHandle, BufferInfo, BufferWrapper};
use crate::error::{BufferError, Result};
use crate::owner::{BufferOwner, PoolDirection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Construction options for a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Panic on ownership violations.
    pub strict: bool,
    /// Upper bound on slots; `None` for unbounded until `freeze()`.
    pub max_slots: Option<usize>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            strict: cfg!(debug_assertions),
            max_slots: None,
        }
    }
}

impl PoolOptions {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_slots(mut self, max: usize) -> Self {
        self.max_slots = Some(max);
        self
    }
}

/// Counters and current owner distribution of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub slots: usize,
    pub engine_owned: usize,
    pub application_owned: usize,
    pub downstream_owned: usize,
    pub ready: u64,
    pub acquired: u64,
    pub released: u64,
    pub codec_configs: u64,
    pub flushes: u64,
    /// Slots taken from the application by a flush.
    pub reclaimed: u64,
    pub violations: u64,
}

struct PoolState {
    slots: Vec<BufferWrapper>,
    by_handle: HashMap<u64, usize>,
    frozen: bool,
    frames_queued: bool,
    stats: PoolStats,
}

struct PoolInner {
    name: String,
    direction: PoolDirection,
    options: PoolOptions,
    state: Mutex<PoolState>,
}

/// Slot table implementing the buffer ownership protocol.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(name: impl Into<String>, direction: PoolDirection) -> Self {
        Self::with_options(name, direction, PoolOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        direction: PoolDirection,
        options: PoolOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                direction,
                options,
                state: Mutex::new(PoolState {
                    slots: Vec::new(),
                    by_handle: HashMap::new(),
                    frozen: false,
                    frames_queued: false,
                    stats: PoolStats::default(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn direction(&self) -> PoolDirection {
        self.inner.direction
    }

    pub fn is_strict(&self) -> bool {
        self.inner.options.strict
    }

    /// Announce a buffer handed over by the codec or renderer.
    ///
    /// A tracked handle moves back to `Engine`; an unseen handle allocates a
    /// new slot unless the pool is frozen or full. Returns the slot index.
    pub fn on_buffer_ready(&self, handle: BufferHandle) -> Result<usize> {
        self.on_buffer_ready_with(handle, BufferInfo::default(), BufferFlags::empty())
    }

    /// Like [`on_buffer_ready`](Self::on_buffer_ready), attaching the metadata
    /// of a filled output buffer.
    pub fn on_buffer_ready_with(
        &self,
        handle: BufferHandle,
        info: BufferInfo,
        flags: BufferFlags,
    ) -> Result<usize> {
        let result = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            match state.by_handle.get(&handle.id).copied() {
                Some(index) => {
                    let slot = &mut state.slots[index];
                    if slot.owner != BufferOwner::Downstream {
                        Err(BufferError::OwnershipViolation {
                            operation: "on_buffer_ready",
                            index,
                            expected: BufferOwner::Downstream,
                            actual: slot.owner,
                        })
                    } else {
                        slot.owner = BufferOwner::Engine;
                        slot.handle = handle;
                        slot.info = info;
                        slot.flags = flags;
                        slot.reclaimed = false;
                        state.stats.ready += 1;
                        Ok(index)
                    }
                }
                None if state.frozen => Err(BufferError::PoolFrozen),
                None => match self.inner.options.max_slots {
                    Some(max) if state.slots.len() >= max => {
                        Err(BufferError::PoolExhausted { max })
                    }
                    _ => {
                        let index = state.slots.len();
                        state.by_handle.insert(handle.id, index);
                        let mut slot = BufferWrapper::new(index, handle);
                        slot.info = info;
                        slot.flags = flags;
                        state.slots.push(slot);
                        state.stats.ready += 1;
                        debug!(pool = %self.inner.name, index, "allocated buffer slot");
                        Ok(index)
                    }
                },
            }
        };
        self.escalate(result)
    }

    /// Claim an engine-owned slot for the application.
    ///
    /// Fails with [`BufferError::NotOwned`] if the engine does not hold it.
    pub fn get_buffer(&self, index: usize) -> Result<BufferHandle> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let slot = state
            .slots
            .get_mut(index)
            .ok_or(BufferError::UnknownIndex(index))?;

        if slot.owner != BufferOwner::Engine {
            return Err(BufferError::NotOwned {
                index,
                owner: slot.owner,
            });
        }

        slot.owner = BufferOwner::Application;
        state.stats.acquired += 1;
        trace!(pool = %self.inner.name, index, "buffer acquired");
        Ok(slot.handle.clone())
    }

    /// Release a consumed slot downstream (codec output, renderer).
    pub fn return_buffer(&self, index: usize) -> Result<()> {
        let result = self
            .require_direction("return_buffer", PoolDirection::Consumption)
            .and_then(|_| self.release("return_buffer", index, None, BufferFlags::empty()));
        self.escalate(result)
    }

    /// Queue a filled slot downstream (codec input).
    pub fn queue_buffer(&self, index: usize, info: BufferInfo, flags: BufferFlags) -> Result<()> {
        let result = self
            .require_direction("queue_buffer", PoolDirection::Production)
            .and_then(|_| self.release("queue_buffer", index, Some(info), flags));
        self.escalate(result)
    }

    /// Queue codec configuration data ahead of the first frame.
    pub fn queue_codec_config(&self, index: usize, info: BufferInfo) -> Result<()> {
        let result = self
            .require_direction("queue_codec_config", PoolDirection::Production)
            .and_then(|_| {
                self.release(
                    "queue_codec_config",
                    index,
                    Some(info),
                    BufferFlags::CODEC_CONFIG,
                )
            });
        self.escalate(result)
    }

    /// Return every slot to `Downstream`. Returns how many slots moved.
    pub fn flush(&self) -> usize {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let mut moved = 0;
        for slot in state.slots.iter_mut() {
            match slot.owner {
                BufferOwner::Downstream => continue,
                BufferOwner::Application => {
                    slot.reclaimed = true;
                    state.stats.reclaimed += 1;
                }
                BufferOwner::Engine => {}
            }
            slot.owner = BufferOwner::Downstream;
            slot.flags = BufferFlags::empty();
            moved += 1;
        }
        state.stats.flushes += 1;
        debug!(pool = %self.inner.name, moved, "pool flushed");
        moved
    }

    /// Fix the slot count; unseen handles are rejected afterwards.
    pub fn freeze(&self) {
        let mut state = self.inner.state.lock();
        if !state.frozen {
            state.frozen = true;
            debug!(pool = %self.inner.name, slots = state.slots.len(), "pool frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.state.lock().frozen
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owner(&self, index: usize) -> Option<BufferOwner> {
        self.inner.state.lock().slots.get(index).map(|s| s.owner)
    }

    /// Copy of a single slot, including its last queued metadata.
    pub fn slot(&self, index: usize) -> Option<BufferWrapper> {
        self.inner.state.lock().slots.get(index).cloned()
    }

    /// Copy of every slot in index order.
    pub fn snapshot(&self) -> Vec<BufferWrapper> {
        self.inner.state.lock().slots.clone()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats;
        stats.slots = state.slots.len();
        for slot in &state.slots {
            match slot.owner {
                BufferOwner::Engine => stats.engine_owned += 1,
                BufferOwner::Application => stats.application_owned += 1,
                BufferOwner::Downstream => stats.downstream_owned += 1,
            }
        }
        stats
    }

    fn require_direction(&self, operation: &'static str, expected: PoolDirection) -> Result<()> {
        if self.inner.direction == expected {
            Ok(())
        } else {
            Err(BufferError::WrongDirection {
                operation,
                direction: self.inner.direction,
            })
        }
    }

    fn release(
        &self,
        operation: &'static str,
        index: usize,
        info: Option<BufferInfo>,
        flags: BufferFlags,
    ) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let codec_config = flags.contains(BufferFlags::CODEC_CONFIG);
        let slot = state
            .slots
            .get_mut(index)
            .ok_or(BufferError::UnknownIndex(index))?;

        if slot.owner != BufferOwner::Application {
            if slot.reclaimed {
                return Err(BufferError::Flushed(index));
            }
            return Err(BufferError::OwnershipViolation {
                operation,
                index,
                expected: BufferOwner::Application,
                actual: slot.owner,
            });
        }

        if codec_config {
            if state.frames_queued {
                return Err(BufferError::CodecConfigAfterStart);
            }
            state.stats.codec_configs += 1;
        } else {
            state.frames_queued = true;
            state.stats.released += 1;
        }

        slot.owner = BufferOwner::Downstream;
        if let Some(info) = info {
            slot.info = info;
        }
        slot.flags = flags;
        trace!(pool = %self.inner.name, index, operation, "buffer released downstream");
        Ok(())
    }

    fn escalate<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_violation() {
                self.inner.state.lock().stats.violations += 1;
                error!(pool = %self.inner.name, error = %err, "buffer ownership violation");
                if self.inner.options.strict {
                    panic!("buffer pool '{}': {}", self.inner.name, err);
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BufferPool")
            .field("name", &self.inner.name)
            .field("direction", &self.inner.direction)
            .field("slots", &state.slots.len())
            .field("frozen", &state.frozen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lenient(direction: PoolDirection) -> BufferPool {
        BufferPool::with_options("test", direction, PoolOptions::default().strict(false))
    }

    #[test]
    fn full_cycle_on_consumption_pool() {
        let pool = lenient(PoolDirection::Consumption);
        let index = pool.on_buffer_ready(BufferHandle::opaque(11)).unwrap();
        assert_eq!(index, 0);
        assert_eq!(pool.owner(index), Some(BufferOwner::Engine));

        pool.get_buffer(index).unwrap();
        assert_eq!(pool.owner(index), Some(BufferOwner::Application));

        pool.return_buffer(index).unwrap();
        assert_eq!(pool.owner(index), Some(BufferOwner::Downstream));

        assert_eq!(pool.on_buffer_ready(BufferHandle::opaque(11)).unwrap(), 0);
        assert_eq!(pool.owner(index), Some(BufferOwner::Engine));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn queue_attaches_metadata() {
        let pool = lenient(PoolDirection::Production);
        let index = pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
        pool.get_buffer(index).unwrap();

        let info = BufferInfo::new(Duration::from_millis(40), 512);
        pool.queue_buffer(index, info, BufferFlags::SYNC_FRAME)
            .unwrap();

        let slot = pool.slot(index).unwrap();
        assert_eq!(slot.info, info);
        assert!(slot.flags.contains(BufferFlags::SYNC_FRAME));
    }

    #[test]
    fn get_buffer_on_held_slot_is_not_owned() {
        let pool = lenient(PoolDirection::Consumption);
        let index = pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
        pool.get_buffer(index).unwrap();

        assert_eq!(
            pool.get_buffer(index),
            Err(BufferError::NotOwned {
                index,
                owner: BufferOwner::Application
            })
        );
        assert_eq!(pool.get_buffer(9), Err(BufferError::UnknownIndex(9)));
    }

    #[test]
    fn frozen_pool_rejects_new_handles() {
        let pool = lenient(PoolDirection::Consumption);
        pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
        pool.freeze();
        assert!(pool.is_frozen());
        assert_eq!(
            pool.on_buffer_ready(BufferHandle::opaque(2)),
            Err(BufferError::PoolFrozen)
        );
    }

    #[test]
    fn max_slots_enforced() {
        let pool = BufferPool::with_options(
            "bounded",
            PoolDirection::Consumption,
            PoolOptions::default().strict(false).max_slots(1),
        );
        pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
        assert_eq!(
            pool.on_buffer_ready(BufferHandle::opaque(2)),
            Err(BufferError::PoolExhausted { max: 1 })
        );
    }

    #[test]
    fn wrong_direction_rejected() {
        let pool = lenient(PoolDirection::Consumption);
        let index = pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
        pool.get_buffer(index).unwrap();
        let err = pool
            .queue_buffer(index, BufferInfo::default(), BufferFlags::empty())
            .unwrap_err();
        assert!(matches!(err, BufferError::WrongDirection { .. }));
        assert_eq!(pool.owner(index), Some(BufferOwner::Application));
    }

    #[test]
    #[should_panic(expected = "Ownership violation")]
    fn strict_pool_panics_on_violation() {
        let pool = BufferPool::with_options(
            "strict",
            PoolDirection::Consumption,
            PoolOptions::default().strict(true),
        );
        let index = pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
        let _ = pool.return_buffer(index);
    }

    #[test]
    fn stats_track_owner_distribution() {
        let pool = lenient(PoolDirection::Consumption);
        for id in 0..3 {
            pool.on_buffer_ready(BufferHandle::opaque(id)).unwrap();
        }
        pool.get_buffer(1).unwrap();
        pool.get_buffer(2).unwrap();
        pool.return_buffer(2).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.slots, 3);
        assert_eq!(stats.engine_owned, 1);
        assert_eq!(stats.application_owned, 1);
        assert_eq!(stats.downstream_owned, 1);
        assert_eq!(stats.ready, 3);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.released, 1);
    }
}
