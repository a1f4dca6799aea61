//! Port Data
//!
//! Data travelling along connections is type-erased behind a shared handle.
//! Every handle carries a generation stamp taken when the data was created.
//! Re-sending the same handle keeps its generation, which is what lets a
//! downstream module tell "same data again" from "new data".

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter for generation stamps.
static GENERATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Creation stamp of a piece of port data. Unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    fn next() -> Self {
        Self(GENERATION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw stamp value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shared, immutable data sent through a port.
///
/// `type_name` is the datatype tag that port descriptions are matched
/// against (e.g. `"Matrix"`, `"Field"`).
#[derive(Clone)]
pub struct DatatypeHandle {
    generation: Generation,
    type_name: Arc<str>,
    value: Arc<dyn Any + Send + Sync>,
}

impl DatatypeHandle {
    /// Wrap a value under the given datatype tag with a fresh generation.
    pub fn new<T>(type_name: impl Into<Arc<str>>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            generation: Generation::next(),
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The datatype tag.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the wrapped value is a `T`.
    pub fn is<T: Any + Send + Sync>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Get the wrapped value as a `T`, if it is one.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Borrow the wrapped value as a `T`, if it is one.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for DatatypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatatypeHandle")
            .field("type_name", &self.type_name)
            .field("generation", &self.generation.raw())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_are_unique() {
        let a = DatatypeHandle::new("Scalar", 1.0_f64);
        let b = DatatypeHandle::new("Scalar", 1.0_f64);
        assert_ne!(a.generation(), b.generation());
    }

    #[test]
    fn clone_keeps_generation() {
        let a = DatatypeHandle::new("Scalar", 2.0_f64);
        let b = a.clone();
        assert_eq!(a.generation(), b.generation());
    }

    #[test]
    fn downcast_checks_type() {
        let handle = DatatypeHandle::new("String", String::from("hello"));

        assert!(handle.is::<String>());
        assert_eq!(handle.downcast_ref::<String>().unwrap(), "hello");
        assert_eq!(*handle.downcast::<String>().unwrap(), "hello");
        assert!(handle.downcast::<f64>().is_none());
    }
}
