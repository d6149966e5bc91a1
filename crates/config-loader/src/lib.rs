//! Generator configuration loading for eventum.
//!
//! Generator configuration files are YAML documents that may reference
//! caller-supplied parameters and stored secrets through placeholders:
//!
//! ```yaml
//! input:
//!   - timer:
//!       seconds: ${params.interval}
//!       count: 1
//! event:
//!   template:
//!     templates:
//!       - default:
//!           template: templates/default.jinja
//! output:
//!   - http:
//!       url: ${params.url}
//!       password: ${secrets.http_password}
//! ```
//!
//! # Pipeline
//!
//! ```text
//! raw text ──► strip comments ──► extract tokens ──► resolve params/secrets
//!                                                          │
//!            GeneratorConfig ◄── parse YAML ◄── substitute ◄┘
//! ```
//!
//! Comment stripping happens before token extraction, so placeholders in
//! commented-out blocks never need to resolve. Plugin configurations stay as
//! raw YAML values here; each plugin validates its own section afterwards.

mod document;
mod error;
mod loader;
pub mod secrets;
mod tokens;

pub use document::{GeneratorConfig, PluginEntry};
pub use error::ConfigurationLoadError;
pub use loader::{load, Params};
pub use secrets::{EnvSecretStore, InMemorySecretStore, SecretStore, SecretStoreError};
pub use tokens::{
    extract_params, extract_secrets, extract_tokens, strip_comments, substitute_tokens,
    PARAMS_NAMESPACE, SECRETS_NAMESPACE,
};
