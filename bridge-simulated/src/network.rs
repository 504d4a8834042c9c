//! Controllable network cache model.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cache fill level shared between a test (or demo) and the engines it
/// feeds. Every change is reported by remote-source engines as a
/// `BufferingPercent` notification; at 0% rendering stalls.
#[derive(Clone)]
pub struct NetworkModel {
    tx: Arc<watch::Sender<u8>>,
}

impl NetworkModel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(100);
        Self { tx: Arc::new(tx) }
    }

    /// Inject a new cache level, clamped to 100.
    pub fn set_cache_percent(&self, percent: u8) {
        let percent = percent.min(100);
        debug!(percent, "network cache level injected");
        self.tx.send_replace(percent);
    }

    pub fn cache_percent(&self) -> u8 {
        *self.tx.borrow()
    }

    pub fn is_starved(&self) -> bool {
        self.cache_percent() == 0
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u8> {
        self.tx.subscribe()
    }
}

impl Default for NetworkModel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NetworkModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkModel")
            .field("cache_percent", &self.cache_percent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_reports_starvation() {
        let network = NetworkModel::new();
        assert_eq!(network.cache_percent(), 100);

        network.set_cache_percent(250);
        assert_eq!(network.cache_percent(), 100);

        network.set_cache_percent(0);
        assert!(network.is_starved());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let network = NetworkModel::new();
        let mut rx = network.subscribe();
        network.clone().set_cache_percent(42);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42);
    }
}
