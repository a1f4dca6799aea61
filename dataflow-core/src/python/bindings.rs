use std::sync::Arc;

use pyo3::exceptions::{PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyList};

use super::api::PythonApi;
use crate::engine::NetworkEditorController;
use crate::state::StateValue;

/// Python-exposed network editor.
///
/// Instances are created by the embedding application and handed to the
/// interpreter; there is no Python constructor.
#[pyclass(name = "NetworkEditor")]
pub struct PyNetworkEditor {
    api: PythonApi,
}

impl PyNetworkEditor {
    pub fn new(controller: Arc<NetworkEditorController>) -> Self {
        Self {
            api: PythonApi::new(controller),
        }
    }
}

#[pymethods]
impl PyNetworkEditor {
    /// Add a module by name and return its id.
    fn add_module(&self, name: &str) -> PyResult<String> {
        self.api
            .add_module(name)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn remove_module(&self, id: &str) -> PyResult<bool> {
        self.api
            .remove_module(id)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn connect(&self, from_id: &str, from_port: usize, to_id: &str, to_port: usize) -> PyResult<String> {
        self.api
            .connect(from_id, from_port, to_id, to_port)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn disconnect(&self, from_id: &str, from_port: usize, to_id: &str, to_port: usize) -> PyResult<bool> {
        self.api
            .disconnect(from_id, from_port, to_id, to_port)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Get a persisted state value; `None` if the key is unset.
    fn get_state(&self, py: Python<'_>, id: &str, key: &str) -> PyResult<Option<PyObject>> {
        let value = self
            .api
            .get_state(id, key)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(value.map(|v| state_to_py(py, &v)))
    }

    fn set_state(&self, id: &str, key: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = py_to_state(value)?;
        self.api
            .set_state(id, key, value)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn module_ids(&self) -> Vec<String> {
        self.api.module_ids()
    }

    /// Execute the whole network with the GIL released. Returns the ids of
    /// the modules that ran, in order.
    fn execute_all(&self, py: Python<'_>) -> PyResult<Vec<String>> {
        let report = py
            .allow_threads(|| self.api.execute_all())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(report.invocations().iter().map(ToString::to_string).collect())
    }

    fn __repr__(&self) -> String {
        format!("NetworkEditor(modules={})", self.api.module_ids().len())
    }
}

fn state_to_py(py: Python<'_>, value: &StateValue) -> PyObject {
    match value {
        StateValue::Bool(b) => (*b).into_py(py),
        StateValue::Int(i) => (*i).into_py(py),
        StateValue::Double(d) => (*d).into_py(py),
        StateValue::String(s) => s.as_str().into_py(py),
        StateValue::List(items) => {
            let items: Vec<PyObject> = items.iter().map(|v| state_to_py(py, v)).collect();
            PyList::new_bound(py, items).into_any().unbind()
        }
    }
}

fn py_to_state(value: &Bound<'_, PyAny>) -> PyResult<StateValue> {
    // bool before int: Python bools are ints
    if let Ok(b) = value.downcast::<PyBool>() {
        return Ok(StateValue::Bool(b.is_true()));
    }
    if let Ok(i) = value.extract::<i64>() {
        return Ok(StateValue::Int(i));
    }
    if let Ok(d) = value.extract::<f64>() {
        return Ok(StateValue::Double(d));
    }
    if let Ok(s) = value.extract::<String>() {
        return Ok(StateValue::String(s));
    }
    if let Ok(list) = value.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| py_to_state(&item))
            .collect::<PyResult<Vec<_>>>()
            .map(StateValue::List);
    }
    Err(PyTypeError::new_err(format!(
        "unsupported state value type: {}",
        value.get_type().name()?
    )))
}
