//! Load a generator configuration from text.

use crate::document::GeneratorConfig;
use crate::error::ConfigurationLoadError;
use crate::secrets::SecretStore;
use crate::tokens::{scan, strip_comments, substitute_tokens, PARAMS_NAMESPACE, SECRETS_NAMESPACE};
use std::collections::BTreeMap;
use tracing::debug;

/// Caller-supplied parameters referenced as `${params.<key>}`.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Render a parameter value for insertion into configuration text.
///
/// Strings are inserted verbatim, everything else in compact JSON form
/// (which is valid YAML flow syntax).
fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_unique(keys: &mut Vec<String>, key: &str) {
    if !keys.iter().any(|k| k == key) {
        keys.push(key.to_string());
    }
}

/// Load a generator configuration.
///
/// Comments are stripped first, then every `${params.*}` placeholder is
/// resolved against `params` and every `${secrets.*}` placeholder against
/// `secrets`. The substituted text is parsed as a [`GeneratorConfig`].
///
/// # Arguments
/// * `content` - Raw configuration text
/// * `params` - Parameter values available to `${params.<key>}`
/// * `secrets` - Store queried once per distinct `${secrets.<key>}`
pub fn load(
    content: &str,
    params: &Params,
    secrets: &dyn SecretStore,
) -> Result<GeneratorConfig, ConfigurationLoadError> {
    let active = strip_comments(content);
    let tokens = scan(&active)?;

    let mut used_params = Vec::new();
    let mut used_secrets = Vec::new();

    for token in &tokens {
        match token.split() {
            Some((PARAMS_NAMESPACE, key)) => push_unique(&mut used_params, key),
            Some((SECRETS_NAMESPACE, key)) => push_unique(&mut used_secrets, key),
            _ => {
                return Err(ConfigurationLoadError::UnknownNamespace {
                    token: token.name.to_string(),
                })
            }
        }
    }

    let missing: Vec<String> = used_params
        .iter()
        .filter(|key| !params.contains_key(*key))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ConfigurationLoadError::MissingParams { keys: missing });
    }

    let rendered_params: BTreeMap<String, String> = used_params
        .iter()
        .filter_map(|key| params.get(key).map(|value| (key.clone(), render_param(value))))
        .collect();

    let mut resolved_secrets = BTreeMap::new();
    for name in &used_secrets {
        let value = secrets
            .get(name)
            .map_err(|e| ConfigurationLoadError::SecretUnavailable {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        resolved_secrets.insert(name.clone(), value);
    }

    debug!(
        "Resolved {} parameter(s) and {} secret(s) in configuration",
        rendered_params.len(),
        resolved_secrets.len()
    );

    let substituted = substitute_tokens(&active, &rendered_params, &resolved_secrets)?;
    let config: GeneratorConfig = serde_yaml::from_str(&substituted)?;

    debug!(
        "Loaded configuration with {} input(s), event `{}`, {} output(s)",
        config.input.len(),
        config.event.name,
        config.output.len()
    );

    Ok(config)
}
