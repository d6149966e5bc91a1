//! Placeholder token scanning and substitution.
//!
//! Placeholders have the form `${namespace.key}`. Whitespace between the
//! braces and the name is tolerated (`${ params.host }`). The namespace ends
//! at the first dot; the rest is the key, so `${params.db.host}` refers to the
//! key `db.host`.

use crate::error::ConfigurationLoadError;
use std::collections::BTreeMap;

/// Namespace of caller-supplied parameters.
pub const PARAMS_NAMESPACE: &str = "params";

/// Namespace of values obtained from the secret store.
pub const SECRETS_NAMESPACE: &str = "secrets";

const COMMENT_MARKER: char = '#';

/// A placeholder located in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    /// Byte offset of the leading `$`.
    pub start: usize,
    /// Byte offset just past the closing `}`.
    pub end: usize,
    /// Trimmed placeholder body, e.g. `params.host`.
    pub name: &'a str,
}

impl<'a> Token<'a> {
    /// Split the body into `(namespace, key)`.
    pub fn split(&self) -> Option<(&'a str, &'a str)> {
        self.name
            .split_once('.')
            .filter(|(namespace, key)| !namespace.is_empty() && !key.is_empty())
    }
}

/// Remove full-line comments (lines whose first non-whitespace character is `#`).
pub fn strip_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with(COMMENT_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Scan all placeholders in `content` in order of appearance.
pub(crate) fn scan(content: &str) -> Result<Vec<Token<'_>>, ConfigurationLoadError> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    while let Some(found) = content[cursor..].find("${") {
        let start = cursor + found;
        let body_start = start + 2;

        let Some(close) = content[body_start..].find('}') else {
            return Err(ConfigurationLoadError::MalformedPlaceholder {
                offset: start,
                reason: "missing closing brace",
            });
        };

        let body_end = body_start + close;
        let name = content[body_start..body_end].trim();

        if name.is_empty() {
            return Err(ConfigurationLoadError::MalformedPlaceholder {
                offset: start,
                reason: "empty placeholder",
            });
        }
        if !name.chars().all(is_name_char) {
            return Err(ConfigurationLoadError::MalformedPlaceholder {
                offset: start,
                reason: "invalid characters in placeholder name",
            });
        }

        tokens.push(Token {
            start,
            end: body_end + 1,
            name,
        });
        cursor = body_end + 1;
    }

    Ok(tokens)
}

/// Extract placeholder names from `content`.
///
/// With a `prefix`, only names in that namespace are returned (with the
/// namespace still attached, e.g. `params.x`). Duplicates are kept.
pub fn extract_tokens(
    content: &str,
    prefix: Option<&str>,
) -> Result<Vec<String>, ConfigurationLoadError> {
    let tokens = scan(content)?;

    Ok(tokens
        .iter()
        .filter(|token| match prefix {
            Some(prefix) => token.split().is_some_and(|(namespace, _)| namespace == prefix),
            None => true,
        })
        .map(|token| token.name.to_string())
        .collect())
}

fn extract_keys(content: &str, namespace: &str) -> Result<Vec<String>, ConfigurationLoadError> {
    let mut keys: Vec<String> = Vec::new();

    for token in scan(content)? {
        if let Some((ns, key)) = token.split() {
            if ns == namespace && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    Ok(keys)
}

/// Distinct parameter keys used in `content`, in order of first appearance.
pub fn extract_params(content: &str) -> Result<Vec<String>, ConfigurationLoadError> {
    extract_keys(content, PARAMS_NAMESPACE)
}

/// Distinct secret names used in `content`, in order of first appearance.
pub fn extract_secrets(content: &str) -> Result<Vec<String>, ConfigurationLoadError> {
    extract_keys(content, SECRETS_NAMESPACE)
}

/// Replace every placeholder in `content` with its resolved value.
pub fn substitute_tokens(
    content: &str,
    params: &BTreeMap<String, String>,
    secrets: &BTreeMap<String, String>,
) -> Result<String, ConfigurationLoadError> {
    let tokens = scan(content)?;
    let mut result = String::with_capacity(content.len());
    let mut cursor = 0;

    for token in &tokens {
        let value = match token.split() {
            Some((PARAMS_NAMESPACE, key)) => params.get(key).ok_or_else(|| {
                ConfigurationLoadError::MissingParams {
                    keys: vec![key.to_string()],
                }
            })?,
            Some((SECRETS_NAMESPACE, key)) => secrets.get(key).ok_or_else(|| {
                ConfigurationLoadError::SecretUnavailable {
                    name: key.to_string(),
                    reason: "secret was not resolved".to_string(),
                }
            })?,
            _ => {
                return Err(ConfigurationLoadError::UnknownNamespace {
                    token: token.name.to_string(),
                })
            }
        };

        result.push_str(&content[cursor..token.start]);
        result.push_str(value);
        cursor = token.end;
    }

    result.push_str(&content[cursor..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tokens_no_tokens() {
        assert!(extract_tokens("plain yaml content", None).unwrap().is_empty());
    }

    #[test]
    fn test_extract_tokens_finds_all() {
        let result = extract_tokens("${foo} and ${bar}", None).unwrap();
        assert_eq!(result, vec!["foo", "bar"]);
    }

    #[test]
    fn test_extract_tokens_with_prefix_filter() {
        let content = "${params.x} ${secrets.y} ${params.z}";
        let result = extract_tokens(content, Some("params")).unwrap();
        assert_eq!(result, vec!["params.x", "params.z"]);
    }

    #[test]
    fn test_extract_tokens_with_prefix_filter_no_match() {
        let result = extract_tokens("${secrets.y}", Some("params")).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_extract_tokens_whitespace_in_token() {
        let result = extract_tokens("${ params.x }", Some("params")).unwrap();
        assert_eq!(result, vec!["params.x"]);
    }

    #[test]
    fn test_extract_tokens_unterminated_is_malformed() {
        let err = extract_tokens("value: ${params.x", None).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationLoadError::MalformedPlaceholder { offset: 7, .. }
        ));
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_extract_tokens_empty_is_malformed() {
        let err = extract_tokens("value: ${ }", None).unwrap_err();
        assert!(matches!(err, ConfigurationLoadError::MalformedPlaceholder { .. }));
    }

    #[test]
    fn test_extract_params_deduplicates() {
        let content = "${params.host}:${params.port} ${params.host}";
        assert_eq!(extract_params(content).unwrap(), vec!["host", "port"]);
    }

    #[test]
    fn test_extract_params_dotted_key() {
        let content = "${params.db.host}";
        assert_eq!(extract_params(content).unwrap(), vec!["db.host"]);
    }

    #[test]
    fn test_extract_secrets_happy_path() {
        let content = "${secrets.api_key} and ${secrets.db_pass} ${params.x}";
        assert_eq!(extract_secrets(content).unwrap(), vec!["api_key", "db_pass"]);
    }

    #[test]
    fn test_strip_comments_removes_full_line_comments() {
        let content = "output:\n  - stdout:\n      stream: stdout\n  # - http:\n  #     url: ${params.url}\n";
        let result = strip_comments(content);
        assert!(!result.contains("${params.url}"));
        assert!(result.contains("stdout"));
    }

    #[test]
    fn test_strip_comments_no_comments() {
        let content = "key: ${params.value}\n";
        assert_eq!(strip_comments(content), "key: ${params.value}");
    }

    #[test]
    fn test_strip_comments_keeps_inline_hash() {
        let content = "color: '#ff0000'\n# note\nkey: v";
        assert_eq!(strip_comments(content), "color: '#ff0000'\nkey: v");
    }

    #[test]
    fn test_extract_params_ignores_commented_tokens() {
        let active = strip_comments("host: ${params.host}\n# backup: ${params.backup_host}\n");
        assert_eq!(extract_params(&active).unwrap(), vec!["host"]);
    }

    #[test]
    fn test_substitute_tokens_mixed() {
        let params = BTreeMap::from([("host".to_string(), "localhost".to_string())]);
        let secrets = BTreeMap::from([("pass".to_string(), "s3cret".to_string())]);

        let result =
            substitute_tokens("host=${params.host} pass=${ secrets.pass }", &params, &secrets)
                .unwrap();
        assert_eq!(result, "host=localhost pass=s3cret");
    }

    #[test]
    fn test_substitute_tokens_unknown_namespace() {
        let err = substitute_tokens("${env.HOME}", &BTreeMap::new(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigurationLoadError::UnknownNamespace { .. }));
    }
}
