//! Factory producing simulated engines.

use crate::config::SimulatedEngineConfig;
use crate::engine::SimulatedEngine;
use crate::network::NetworkModel;
use bridge_traits::{
    BridgeError, EngineFactory, EngineOptions, MediaSource, NotificationSink, PipelineEngine,
    Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Builds a [`SimulatedEngine`] per source. Every engine shares the
/// factory's [`NetworkModel`].
pub struct SimulatedEngineFactory {
    config: SimulatedEngineConfig,
    network: NetworkModel,
    engines: Mutex<Vec<Arc<SimulatedEngine>>>,
}

impl SimulatedEngineFactory {
    pub fn new(config: SimulatedEngineConfig) -> Self {
        Self::with_network(config, NetworkModel::new())
    }

    pub fn with_network(config: SimulatedEngineConfig, network: NetworkModel) -> Self {
        Self {
            config,
            network,
            engines: Mutex::new(Vec::new()),
        }
    }

    pub fn network(&self) -> &NetworkModel {
        &self.network
    }

    /// The most recently created engine.
    pub fn last_engine(&self) -> Option<Arc<SimulatedEngine>> {
        self.engines.lock().last().cloned()
    }

    pub fn engines_created(&self) -> usize {
        self.engines.lock().len()
    }
}

impl Default for SimulatedEngineFactory {
    fn default() -> Self {
        Self::new(SimulatedEngineConfig::default())
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create(
        &self,
        source: &MediaSource,
        options: EngineOptions,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Arc<dyn PipelineEngine>> {
        if let MediaSource::MemoryBuffer { data } = source {
            if data.is_empty() {
                return Err(BridgeError::UnsupportedFormat(
                    "empty memory buffer".to_string(),
                ));
            }
        }

        let engine = SimulatedEngine::spawn(
            self.config.clone(),
            source.is_remote(),
            options,
            sink,
            self.network.clone(),
        )?;
        self.engines.lock().push(engine.clone());
        debug!(count = self.engines_created(), "simulated engine handed out");
        Ok(engine)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
