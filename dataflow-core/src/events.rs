//! Network Events
//!
//! Observers (a GUI, a log window, a Python console) register callbacks on an
//! [`EventBus`] and receive [`NetworkEvent`]s synchronously, after the change
//! they describe has been applied.
//!
//! # Re-entrancy
//!
//! The bus clones its listener list before dispatching, so a listener may
//! subscribe or unsubscribe from inside a callback. Events emitted during an
//! execution pass are dispatched while the controller holds the network
//! lock; listeners must not call back into the controller synchronously.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::network::{ConnectionDescription, ConnectionId, ModuleId};

/// Unique identifier for a registered listener.
///
/// Shared by the event bus and by module state change listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that happened to the network or during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    ModuleAdded { name: String, id: ModuleId },
    ModuleRemoved { id: ModuleId },
    ConnectionAdded(ConnectionDescription),
    ConnectionRemoved(ConnectionId),
    /// A connection request was refused.
    InvalidConnection(ConnectionDescription),
    NetworkCleared,
    NetworkExecutionStarted { modules: usize },
    NetworkExecutionFinished { invocations: usize, failed: Option<ModuleId> },
    ExecuteBegins { id: ModuleId },
    ExecuteEnds { id: ModuleId },
    ModuleErrored { id: ModuleId, message: String },
    ModuleProgress { id: ModuleId, fraction: f64 },
}

type Listener = Arc<dyn Fn(&NetworkEvent) + Send + Sync>;

/// Registry of event listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Keep the returned id to unsubscribe later.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener, in registration order.
    pub fn emit(&self, event: &NetworkEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
