// Logging utilities for the device trust stack
//
// Component-based structured logging on top of the `log` facade. Every line
// carries the device ID and the component chain that produced it, plus an
// optional operation tag (for example the pack being processed).

use log::{debug, error, info, warn};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Identity,
    Store,
    Pack,
    Codec,
    Authority,
    CLI,
    System,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Identity => "Identity",
            Component::Store => "Store",
            Component::Pack => "Pack",
            Component::Codec => "Codec",
            Component::Authority => "CA",
            Component::CLI => "CLI",
            Component::System => "System",
            Component::Custom(name) => name,
        }
    }
}

struct PrefixDisplay<'a> {
    parent: Option<Component>,
    component: Component,
    operation: Option<&'a str>,
}

impl Display for PrefixDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::System => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())?
            }
            _ => write!(f, "{}", self.component.as_str())?,
        }
        if let Some(op) = self.operation {
            write!(f, "|op={op}")?;
        }
        Ok(())
    }
}

/// A component-specific logger that tags every line with the device ID
#[derive(Clone, Debug)]
pub struct Logger {
    component: Component,
    device_id: String,
    parent_component: Option<Component>,
    operation: Option<String>,
}

impl Logger {
    /// Create a root logger for a component and device ID
    pub fn new_root(component: Component, device_id: &str) -> Self {
        Self {
            component,
            device_id: device_id.to_string(),
            parent_component: None,
            operation: None,
        }
    }

    /// Create a child logger with the same device ID but a different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            device_id: self.device_id.clone(),
            parent_component: Some(self.component),
            operation: self.operation.clone(),
        }
    }

    /// Create a logger tagged with the operation currently in flight
    pub fn with_operation(&self, operation: impl Into<String>) -> Self {
        Self {
            component: self.component,
            device_id: self.device_id.clone(),
            parent_component: self.parent_component,
            operation: Some(operation.into()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// The bracketed prefix rendered in front of every message
    pub fn prefix(&self) -> String {
        self.prefix_display().to_string()
    }

    fn prefix_display(&self) -> PrefixDisplay<'_> {
        PrefixDisplay {
            parent: self.parent_component,
            component: self.component,
            operation: self.operation(),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.device_id, self.prefix_display(), message.into());
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.device_id, self.prefix_display(), args);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.device_id, self.prefix_display(), message.into());
        }
    }

    /// Log an info message using fmt::Arguments (avoids allocating message String)
    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.device_id, self.prefix_display(), args);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.device_id, self.prefix_display(), message.into());
        }
    }

    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.device_id, self.prefix_display(), args);
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.device_id, self.prefix_display(), message.into());
        }
    }

    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.device_id, self.prefix_display(), args);
        }
    }
}
