//! ==============================================================================
//! hub.rs - broadcast hub
//! ==============================================================================
//!
//! purpose:
//!     the fan-out / fan-in boundary to observers.
//!
//!     outbound: every published telemetry event goes to every observer that
//!     is connected at that moment. the event is wrapped in an `Arc` once and
//!     each observer gets a pointer to the same value. the channel is bounded
//!     and never blocks the publisher; an observer that falls behind loses its
//!     oldest events instead of slowing down anyone else.
//!
//!     inbound: any observer may send a command event at any time; the hub
//!     maps the event name to a `Command` and hands it to the dispatcher.
//!
//! relationships:
//!     - used by: telemetry.rs (publish), server.rs (register/unregister/inbound)
//!     - uses: dispatcher.rs
//!
//! ==============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::broadcast;

use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::domain::{Command, TelemetryEvent};

pub type ObserverId = u64;

/// registry entry for one connected observer
#[derive(Clone, Debug)]
pub struct ObserverInfo {
    pub addr: Option<SocketAddr>,
    pub connected_at: Instant,
}

/// handle returned to the transport for one connected observer
pub struct ObserverSession {
    pub id: ObserverId,
    pub events: broadcast::Receiver<Arc<TelemetryEvent>>,
}

#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Arc<TelemetryEvent>>,
    observers: Arc<Mutex<HashMap<ObserverId, ObserverInfo>>>,
    next_id: Arc<AtomicU64>,
    dispatcher: CommandDispatcher,
}

impl BroadcastHub {
    pub fn new(capacity: usize, dispatcher: CommandDispatcher) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            dispatcher,
        }
    }

    pub fn register(&self, addr: Option<SocketAddr>) -> ObserverSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // subscribe before the observer becomes visible
        let events = self.tx.subscribe();

        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.insert(id, ObserverInfo { addr, connected_at: Instant::now() });
        tracing::info!("observer {} connected from {:?} ({} total)", id, addr, observers.len());

        ObserverSession { id, events }
    }

    pub fn unregister(&self, id: ObserverId) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(info) = observers.remove(&id) {
            tracing::info!(
                "observer {} disconnected after {:?} ({} left)",
                id,
                info.connected_at.elapsed(),
                observers.len()
            );
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// send one event to every connected observer, returns how many it reached
    pub fn publish(&self, event: TelemetryEvent) -> usize {
        // no receivers is not an error, nobody is watching
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    /// handle one inbound event from an observer
    pub async fn handle_inbound(&self, event: &str) -> Option<DispatchOutcome> {
        match Command::from_event(event) {
            Some(command) => Some(self.dispatcher.dispatch(command).await),
            None => {
                tracing::debug!("ignoring unknown inbound event {:?}", event);
                None
            }
        }
    }
}
