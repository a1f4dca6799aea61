//! Module Factory
//!
//! The network creates modules through the [`ModuleFactory`] interface and
//! never names a concrete module type. [`ModuleRegistry`] is the in-memory
//! implementation: module types register a description and a constructor.

use std::sync::Arc;

use indexmap::IndexMap;

use super::ids::ModuleLookupInfo;
use super::module::{Module, ModuleDescription};
use crate::error::NetworkError;

/// Creates modules from lookup descriptors.
pub trait ModuleFactory: Send + Sync {
    fn create(&self, info: &ModuleLookupInfo) -> Result<Box<dyn Module>, NetworkError>;

    fn lookup_description(&self, info: &ModuleLookupInfo)
        -> Result<ModuleDescription, NetworkError>;
}

type ModuleMaker = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Module factory backed by a table of registered module types, keyed by
/// module name.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    entries: IndexMap<String, (ModuleDescription, ModuleMaker)>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module type. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<F, M>(&mut self, description: ModuleDescription, make: F)
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Module + 'static,
    {
        let name = description.module_name().to_string();
        let maker: ModuleMaker = Arc::new(move || Box::new(make()));
        self.entries.insert(name, (description, maker));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F, M>(mut self, description: ModuleDescription, make: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Module + 'static,
    {
        self.register(description, make);
        self
    }

    /// Descriptions of all registered module types, in registration order.
    pub fn available_modules(&self) -> impl Iterator<Item = &ModuleDescription> {
        self.entries.values().map(|(d, _)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(
        &self,
        info: &ModuleLookupInfo,
    ) -> Result<&(ModuleDescription, ModuleMaker), NetworkError> {
        self.entries
            .get(&info.module_name)
            .ok_or_else(|| NetworkError::UnknownModule(info.module_name.clone()))
    }
}

impl ModuleFactory for ModuleRegistry {
    fn create(&self, info: &ModuleLookupInfo) -> Result<Box<dyn Module>, NetworkError> {
        let (_, make) = self.entry(info)?;
        Ok(make())
    }

    fn lookup_description(
        &self,
        info: &ModuleLookupInfo,
    ) -> Result<ModuleDescription, NetworkError> {
        self.entry(info).map(|(d, _)| d.clone())
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
