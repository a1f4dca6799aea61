//! Python Surface
//!
//! [`PythonApi`] is the call surface an embedded interpreter uses: string
//! module ids, port indices and plain state values in, results out. Every
//! call takes the API's own lock, so interpreter calls are serialized
//! against each other.
//!
//! With the `python` feature, [`PyNetworkEditor`] exposes the same surface
//! as a Python class.

mod api;
#[cfg(feature = "python")]
mod bindings;

pub use api::PythonApi;
#[cfg(feature = "python")]
pub use bindings::PyNetworkEditor;
