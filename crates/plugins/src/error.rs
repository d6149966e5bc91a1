//! Error types for plugins and the plugin registry.

use crate::plugin::PluginKind;
use thiserror::Error;

/// Errors raised by plugins during construction or at runtime.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Plugin rejected its configuration during construction.
    #[error("{0}")]
    Configuration(String),

    #[error("Sample error: {0}")]
    Sample(#[from] eventum_samples::SamplePickError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Runtime(String),
}

impl PluginError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}

/// Errors returned when resolving a plugin in the registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("{kind} plugin `{name}` not found")]
    NotFound { kind: PluginKind, name: String },

    #[error("Failed to load {kind} plugin `{name}`: {reason}")]
    Load {
        kind: PluginKind,
        name: String,
        reason: String,
    },
}
