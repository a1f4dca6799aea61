//! Module State
//!
//! Every module owns a `ModuleState`: a persisted map of parameters
//! (saved with the network, edited from the GUI or Python) and a separate
//! transient map for run-time bookkeeping that is never saved.
//!
//! # Change Tracking
//!
//! Each persisted key moves through `Unset -> Set -> Changed -> Set`:
//! a `set_value` that actually alters the stored value marks the key as
//! changed. Every mark carries a revision number; the executor snapshots
//! `change_revision` before a module runs and clears only marks up to that
//! revision with `mark_observed_upto` once the run succeeds. A write that
//! lands while the module is executing stays `Changed` for the next pass.
//! "Has any changed key" is one of the inputs to the module's
//! need-to-execute decision.
//!
//! Transient values live in their own namespace and never mark anything as
//! changed. Setting one may optionally notify listeners.
//!
//! # Thread Safety
//!
//! State is shared between the execution thread and GUI/Python threads.
//! All access goes through a single lock per state object. Listeners are
//! invoked after the lock is released, so a listener may read the state.

mod value;

pub use value::StateValue;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::ListenerId;

/// Type-erased transient value.
pub type TransientValue = Arc<dyn Any + Send + Sync>;

/// Shared handle to a module's state.
pub type ModuleStateHandle = Arc<ModuleState>;

type StateListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Observed status of a persisted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Unset,
    /// Holds a value the owning module has already reacted to.
    Set,
    /// Holds a value set since the module last ran.
    Changed,
}

#[derive(Default)]
struct StateInner {
    values: BTreeMap<String, StateValue>,
    transient: HashMap<String, TransientValue>,
    // key -> revision of its latest change mark
    changed: BTreeMap<String, u64>,
    revision: u64,
}

/// Per-module key/value store with change notification.
pub struct ModuleState {
    module_name: String,
    inner: Mutex<StateInner>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
}

impl ModuleState {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            inner: Mutex::new(StateInner::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Name of the module type this state belongs to.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Set a persisted value and notify listeners.
    ///
    /// Listeners fire on every call; the key is only marked as changed when
    /// the stored value differs from the previous one.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<StateValue>) {
        let key = key.into();
        let value = value.into();
        {
            let mut inner = self.inner.lock();
            let previous = inner.values.insert(key.clone(), value.clone());
            if previous.as_ref() != Some(&value) {
                inner.revision += 1;
                let revision = inner.revision;
                inner.changed.insert(key.clone(), revision);
            }
        }
        self.notify(&key);
    }

    pub fn get_value(&self, key: &str) -> Option<StateValue> {
        self.inner.lock().values.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().values.contains_key(key)
    }

    /// Persisted keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().values.keys().cloned().collect()
    }

    /// Snapshot of the persisted map.
    pub fn values(&self) -> BTreeMap<String, StateValue> {
        self.inner.lock().values.clone()
    }

    /// Set a transient value. Listeners are only told when `notify` is true.
    pub fn set_transient_value<T>(&self, key: impl Into<String>, value: T, notify: bool)
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        self.inner
            .lock()
            .transient
            .insert(key.clone(), Arc::new(value));
        if notify {
            self.notify(&key);
        }
    }

    pub fn get_transient_value(&self, key: &str) -> Option<TransientValue> {
        self.inner.lock().transient.get(key).cloned()
    }

    /// Get a transient value as a `T`, if present and of that type.
    pub fn get_transient<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get_transient_value(key)
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn remove_transient_value(&self, key: &str) -> bool {
        self.inner.lock().transient.remove(key).is_some()
    }

    pub fn key_status(&self, key: &str) -> KeyStatus {
        let inner = self.inner.lock();
        if inner.changed.contains_key(key) {
            KeyStatus::Changed
        } else if inner.values.contains_key(key) {
            KeyStatus::Set
        } else {
            KeyStatus::Unset
        }
    }

    /// Whether any persisted key changed since the last `mark_observed`.
    pub fn has_changes(&self) -> bool {
        !self.inner.lock().changed.is_empty()
    }

    pub fn changed_keys(&self) -> Vec<String> {
        self.inner.lock().changed.keys().cloned().collect()
    }

    /// Revision of the most recent change mark.
    pub fn change_revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Clear all change marks (`Changed -> Set`).
    pub fn mark_observed(&self) {
        self.inner.lock().changed.clear();
    }

    /// Clear the change marks made at or before `revision`. Later marks stay.
    pub fn mark_observed_upto(&self, revision: u64) {
        self.inner
            .lock()
            .changed
            .retain(|_, marked| *marked > revision);
    }

    /// Register a change listener. It receives the key that was set.
    pub fn connect_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn disconnect_state_changed(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    fn notify(&self, key: &str) {
        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(key);
        }
    }
}

impl std::fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ModuleState")
            .field("module_name", &self.module_name)
            .field("values", &inner.values)
            .field("transient_keys", &inner.transient.keys().collect::<Vec<_>>())
            .field("changed", &inner.changed)
            .finish()
    }
}

/// Creates state objects for new modules.
///
/// Injected into the network so that a persistence layer can supply its own
/// state implementation.
pub trait ModuleStateFactory: Send + Sync {
    fn make_state(&self, module_name: &str) -> ModuleStateHandle;
}

/// Factory for plain in-memory [`ModuleState`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleMapModuleStateFactory;

impl ModuleStateFactory for SimpleMapModuleStateFactory {
    fn make_state(&self, module_name: &str) -> ModuleStateHandle {
        Arc::new(ModuleState::new(module_name))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
