//! Injectable logger handed to capability functions.
//!
//! Functions that want to log ask for a [`Logger`] argument instead of
//! reaching for a global. Records go through the `log` facade under the
//! logger's target, so the host decides where they end up.

use serde::{Deserialize, Serialize};

use crate::argmapper::Typed;

/// Default target for records emitted through a [`Logger`].
pub const DEFAULT_TARGET: &str = "capbridge";

/// Named logger with a fixed `log` target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logger {
    /// Target attached to every record.
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}

impl Logger {
    /// Create a new `Logger` writing under `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// A child logger: `capbridge` named `status` becomes `capbridge::status`.
    pub fn named(&self, name: &str) -> Self {
        Self::new(format!("{}::{}", self.target, name))
    }

    /// Emit `message` at `level`.
    ///
    /// # Arguments
    /// * `level` - The log level.
    /// * `message` - The message to log.
    pub fn log(&self, level: log::Level, message: &str) {
        log::log!(target: &self.target, level, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        self.log(log::Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(log::Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(log::Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(log::Level::Error, message);
    }
}

impl Typed for Logger {
    const TYPE: &'static str = "capbridge.Logger";
}
