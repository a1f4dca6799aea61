//! Module Logging
//!
//! Modules report through an injected [`ModuleLogger`] rather than a global
//! logger, so embedders can route messages to a GUI log window. The default
//! implementation forwards to `tracing`.

use std::sync::Arc;

use crate::network::ModuleId;

/// Severity of a module message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    /// Informational note for the user.
    Remark,
    /// Short status line, e.g. "reading file".
    Status,
}

/// Sink for messages emitted by modules.
pub trait ModuleLogger: Send + Sync {
    fn log(&self, module: &ModuleId, level: LogLevel, message: &str);
}

pub type ModuleLoggerHandle = Arc<dyn ModuleLogger>;

/// Forwards module messages to `tracing`, tagged with the module id.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingModuleLogger;

impl ModuleLogger for TracingModuleLogger {
    fn log(&self, module: &ModuleId, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(module = %module, "{}", message),
            LogLevel::Warning => tracing::warn!(module = %module, "{}", message),
            LogLevel::Remark => tracing::info!(module = %module, "{}", message),
            LogLevel::Status => tracing::debug!(module = %module, "{}", message),
        }
    }
}
