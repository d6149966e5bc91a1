//! Error types for configuration loading.

use thiserror::Error;

/// Errors that can occur while loading a generator configuration.
#[derive(Error, Debug)]
pub enum ConfigurationLoadError {
    /// A `${` without a closing brace, or a placeholder with an invalid body.
    #[error("Configuration contains malformed placeholder at offset {offset}: {reason}")]
    MalformedPlaceholder { offset: usize, reason: &'static str },

    /// Placeholder namespace other than `params` or `secrets`.
    #[error("Unknown placeholder `${{{token}}}`: only `params` and `secrets` namespaces are supported")]
    UnknownNamespace { token: String },

    /// Parameters referenced by the configuration but not provided.
    #[error("Parameters used in configuration are missing: {}", .keys.join(", "))]
    MissingParams { keys: Vec<String> },

    /// Secret could not be obtained from the secret store.
    #[error("Cannot obtain secret `{name}`: {reason}")]
    SecretUnavailable { name: String, reason: String },

    /// Substituted document is not a valid generator configuration.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}
