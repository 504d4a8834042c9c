//! # Buffer Ownership Protocol
//!
//! Slot bookkeeping shared by every component that exchanges media buffers:
//! codec input, codec output and renderer.
//!
//! ## Overview
//!
//! A [`BufferPool`] tracks a fixed set of slots. Each slot has exactly one
//! [`BufferOwner`] and ownership only moves through four operations:
//!
//! - [`on_buffer_ready`](BufferPool::on_buffer_ready) - downstream hands a buffer to the engine
//! - [`get_buffer`](BufferPool::get_buffer) - the application claims it
//! - [`queue_buffer`](BufferPool::queue_buffer) / [`return_buffer`](BufferPool::return_buffer) - the application releases it downstream
//! - [`flush`](BufferPool::flush) - everything returns downstream at once
//!
//! ## Usage
//!
//! ```
//! use core_buffer::{BufferHandle, BufferOwner, BufferPool, PoolDirection};
//!
//! let pool = BufferPool::new("video-out", PoolDirection::Consumption);
//! let index = pool.on_buffer_ready(BufferHandle::opaque(1)).unwrap();
//! let _frame = pool.get_buffer(index).unwrap();
//! pool.return_buffer(index).unwrap();
//! assert_eq!(pool.owner(index), Some(BufferOwner::Downstream));
//! ```

pub mod buffer;
pub mod error;
pub mod owner;
pub mod pool;

pub use buffer::{BufferFlags, BufferHandle, BufferInfo, BufferWrapper};
pub use error::{BufferError, Result};
pub use owner::{BufferOwner, PoolDirection};
pub use pool::{BufferPool, PoolOptions, PoolStats};
