//! # Simulated Pipeline Engine
//!
//! Software stand-in for a platform demux/decode/render pipeline.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`SimulatedEngine`] - timer-driven [`PipelineEngine`](bridge_traits::PipelineEngine)
//!   whose codec stages exchange frames through `core-buffer` pools
//! - [`SimulatedEngineFactory`] - [`EngineFactory`](bridge_traits::EngineFactory)
//!   handing out one engine per source
//! - [`NetworkModel`] - injectable cache level for remote sources
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_simulated::{SimulatedEngineConfig, SimulatedEngineFactory};
//!
//! let factory = Arc::new(SimulatedEngineFactory::new(
//!     SimulatedEngineConfig::default().with_confirm_stop(false),
//! ));
//! factory.network().set_cache_percent(3);
//! ```

mod config;
mod engine;
mod factory;
mod network;

pub use config::SimulatedEngineConfig;
pub use engine::{EngineCommand, SimulatedEngine};
pub use factory::SimulatedEngineFactory;
pub use network::NetworkModel;
