//! Module and Port Identifiers
//!
//! Ids are plain values. Connections, schedules and the executor refer to
//! modules through them rather than holding references into the network.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Descriptor used to look a module type up in a factory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleLookupInfo {
    pub module_name: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub package_name: String,
}

impl ModuleLookupInfo {
    /// Create a full name/category/package triple.
    pub fn new(
        module_name: impl Into<String>,
        category_name: impl Into<String>,
        package_name: impl Into<String>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            category_name: category_name.into(),
            package_name: package_name.into(),
        }
    }

    /// Create a descriptor from the module name alone.
    pub fn named(module_name: impl Into<String>) -> Self {
        Self::new(module_name, "", "")
    }
}

/// Identity of a module within one network: its type name plus a per-name
/// sequence number, displayed as `Name:N`.
///
/// Assigned once when the module is created and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    name: String,
    index: usize,
}

impl ModuleId {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// The module type name part.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sequence number part.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.index)
    }
}

impl FromStr for ModuleId {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetworkError::InvalidModuleId(s.to_string());
        let (name, index) = s.rsplit_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let index = index.parse::<usize>().map_err(|_| invalid())?;
        Ok(Self::new(name, index))
    }
}

impl TryFrom<String> for ModuleId {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.to_string()
    }
}

/// Identity of a port on a module: position plus symbolic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    pub index: usize,
    pub name: String,
}

impl PortId {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}
