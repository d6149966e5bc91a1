//! Secret store boundary.
//!
//! The loader only ever calls [`SecretStore::get`]. The management operations
//! exist for embedding applications that administer secrets themselves.

use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Errors returned by secret stores.
#[derive(Error, Debug)]
pub enum SecretStoreError {
    #[error("Secret `{0}` not found")]
    NotFound(String),

    #[error("Invalid secret name `{0}`")]
    InvalidName(String),

    #[error("Operation `{0}` is not supported by this secret store")]
    Unsupported(&'static str),

    #[error("Secret store is unavailable: {0}")]
    Unavailable(String),
}

/// Storage of named secret values.
pub trait SecretStore: Send + Sync {
    /// Obtain the value of secret `name`.
    fn get(&self, name: &str) -> Result<String, SecretStoreError>;

    /// Store `value` under `name`, replacing any previous value.
    fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError>;

    /// Remove secret `name`.
    fn remove(&self, name: &str) -> Result<(), SecretStoreError>;

    /// Names of all stored secrets, sorted.
    fn list(&self) -> Result<Vec<String>, SecretStoreError>;
}

fn validate_name(name: &str) -> Result<(), SecretStoreError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SecretStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Process-local secret store.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, useful for tests and embedding.
    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), value.into());
        self
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, name: &str) -> Result<String, SecretStoreError> {
        validate_name(name)?;
        self.secrets
            .read()
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?
            .get(name)
            .cloned()
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }

    fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        validate_name(name)?;
        self.secrets
            .write()
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), SecretStoreError> {
        validate_name(name)?;
        self.secrets
            .write()
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }

    fn list(&self) -> Result<Vec<String>, SecretStoreError> {
        Ok(self
            .secrets
            .read()
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?
            .keys()
            .cloned()
            .collect())
    }
}

/// Read-only store backed by `EVENTUM_SECRET_<NAME>` environment variables.
///
/// Names are upper-cased and `-` is mapped to `_` when building the variable
/// name, so `${secrets.db-pass}` reads `EVENTUM_SECRET_DB_PASS`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self {
            prefix: "EVENTUM_SECRET_".to_string(),
        }
    }
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom variable prefix instead of `EVENTUM_SECRET_`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_ascii_uppercase().replace('-', "_"))
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Result<String, SecretStoreError> {
        validate_name(name)?;
        std::env::var(self.variable_name(name)).map_err(|e| match e {
            std::env::VarError::NotPresent => SecretStoreError::NotFound(name.to_string()),
            std::env::VarError::NotUnicode(_) => {
                SecretStoreError::Unavailable(format!("value of `{name}` is not valid unicode"))
            }
        })
    }

    fn set(&self, _name: &str, _value: &str) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Unsupported("set"))
    }

    fn remove(&self, _name: &str) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Unsupported("remove"))
    }

    fn list(&self) -> Result<Vec<String>, SecretStoreError> {
        let mut names: Vec<String> = std::env::vars()
            .filter_map(|(key, _)| {
                key.strip_prefix(&self.prefix)
                    .map(|name| name.to_ascii_lowercase())
            })
            .collect();
        names.sort();
        Ok(names)
    }
}
