//! # Notification Dispatcher
//!
//! Serializes session events onto one dedicated thread so the observer sees
//! a total order and engine callback threads never run observer code.
//!
//! ## Design
//!
//! - **Queue**: unbounded tokio mpsc channel, drained only by the worker
//! - **Worker**: a named std thread blocking on the receiver
//! - **Pending events**: retained while no observer is attached (bounded,
//!   oldest dropped) and replayed when one is set
//! - **Mirror**: every delivered event is also broadcast on the optional
//!   [`EventBus`]

use crate::error::{PlaybackError, Result};
use crate::events::{PlayerEvent, PlayerObserver};
use core_runtime::events::{EventBus, Receiver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

const WORKER_NAME: &str = "playback-dispatch";

enum DispatchMessage {
    Event(PlayerEvent),
    SetObserver(Option<Arc<dyn PlayerObserver>>),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

pub struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    bus: Option<EventBus<PlayerEvent>>,
}

impl Dispatcher {
    /// Spawn the worker thread.
    pub fn spawn(pending_limit: usize, bus: Option<EventBus<PlayerEvent>>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker_bus = bus.clone();
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(rx, worker_bus, pending_limit.max(1)))
            .map_err(|e| PlaybackError::Config(format!("Failed to spawn dispatcher: {}", e)))?;

        Ok(Self {
            worker_id: handle.thread().id(),
            tx,
            worker: Mutex::new(Some(handle)),
            bus,
        })
    }

    /// Queue an event for delivery. Events posted after shutdown are dropped.
    pub fn post(&self, event: PlayerEvent) {
        if self.tx.send(DispatchMessage::Event(event)).is_err() {
            trace!("dispatcher closed; event dropped");
        }
    }

    /// Replace the observer. Takes effect in queue order: events posted
    /// before this call go to the previous observer (or the pending queue).
    pub fn set_observer(&self, observer: Option<Arc<dyn PlayerObserver>>) {
        let _ = self.tx.send(DispatchMessage::SetObserver(observer));
    }

    /// Wait until every event posted before this call has been delivered.
    ///
    /// Returns immediately when called from the dispatcher thread itself.
    pub async fn drain(&self) {
        if thread::current().id() == self.worker_id {
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(DispatchMessage::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Subscribe to the broadcast mirror, if enabled.
    pub fn subscribe(&self) -> Option<Receiver<PlayerEvent>> {
        self.bus.as_ref().map(|bus| bus.subscribe())
    }

    /// Stop the worker after it has delivered everything queued so far.
    pub fn shutdown(&self) {
        let _ = self.tx.send(DispatchMessage::Shutdown);
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if thread::current().id() == self.worker_id {
            // Called from an observer; the worker exits once this callback returns.
            return;
        }
        if handle.join().is_err() {
            error!("dispatcher worker panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(DispatchMessage::Shutdown);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("running", &self.worker.lock().is_some())
            .field("event_bus", &self.bus)
            .finish()
    }
}

fn run_worker(
    mut rx: mpsc::UnboundedReceiver<DispatchMessage>,
    bus: Option<EventBus<PlayerEvent>>,
    pending_limit: usize,
) {
    let mut observer: Option<Arc<dyn PlayerObserver>> = None;
    let mut pending: VecDeque<PlayerEvent> = VecDeque::new();

    while let Some(message) = rx.blocking_recv() {
        match message {
            DispatchMessage::Event(event) => {
                if let Some(bus) = &bus {
                    let _ = bus.emit(event.clone());
                }
                match &observer {
                    Some(observer) => deliver(observer.as_ref(), event),
                    None => {
                        if pending.len() >= pending_limit {
                            pending.pop_front();
                            warn!(pending_limit, "no observer attached; dropping oldest event");
                        }
                        pending.push_back(event);
                    }
                }
            }
            DispatchMessage::SetObserver(next) => {
                observer = next;
                if let Some(observer) = &observer {
                    if !pending.is_empty() {
                        debug!(count = pending.len(), "replaying pending events");
                    }
                    for event in pending.drain(..) {
                        deliver(observer.as_ref(), event);
                    }
                }
            }
            DispatchMessage::Barrier(done) => {
                let _ = done.send(());
            }
            DispatchMessage::Shutdown => break,
        }
    }

    debug!("dispatcher stopped");
}

fn deliver(observer: &dyn PlayerObserver, event: PlayerEvent) {
    let label = event.description().to_string();
    if panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event))).is_err() {
        error!(event = %label, "observer panicked");
    }
}
