use super::join_events;
use crate::error::PluginError;
use crate::plugin::{InstanceParams, OutputPlugin, PluginSpec, Validate};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

fn default_method() -> String {
    "POST".to_string()
}

fn default_success_code() -> u16 {
    201
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

fn default_verify() -> bool {
    true
}

const METHODS: [&str; 7] = ["GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_success_code")]
    pub success_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_verify")]
    pub verify: bool,
}

impl Validate for HttpConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        match Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => violations.push(format!("url scheme must be http or https, got `{}`", url.scheme())),
            Err(e) => violations.push(format!("url is invalid: {e}")),
        }
        if !METHODS.contains(&self.method.as_str()) {
            violations.push(format!(
                "method must be one of {}, got `{}`",
                METHODS.join(", "),
                self.method
            ));
        }
        if !(100..600).contains(&self.success_code) {
            violations.push(format!(
                "success_code must be in range 100..600, got {}",
                self.success_code
            ));
        }
        if self.headers.keys().any(|name| name.is_empty()) {
            violations.push("header names must not be empty".to_string());
        }
        if self.password.is_some() && self.username.is_none() {
            violations.push("password requires username".to_string());
        }
        if self.connect_timeout < 1 {
            violations.push("connect_timeout must be >= 1".to_string());
        }
        if self.request_timeout < 1 {
            violations.push("request_timeout must be >= 1".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Sends each batch as one newline-delimited request body.
pub struct HttpOutput {
    client: Client,
    url: Url,
    method: Method,
    success_code: u16,
    username: Option<String>,
    password: Option<String>,
}

impl PluginSpec for HttpOutput {
    const NAME: &'static str = "http";
    type Config = HttpConfig;

    fn build(config: HttpConfig, _params: &InstanceParams) -> Result<Self, PluginError> {
        let url = Url::parse(&config.url)
            .map_err(|e| PluginError::configuration(format!("Invalid url: {e}")))?;
        let method = Method::from_bytes(config.method.as_bytes())
            .map_err(|e| PluginError::configuration(format!("Invalid method: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                PluginError::configuration(format!("Invalid header name `{name}`: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                PluginError::configuration(format!("Invalid value of header `{name}`: {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout))
            .danger_accept_invalid_certs(!config.verify)
            .build()
            .map_err(|e| PluginError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            method,
            success_code: config.success_code,
            username: config.username,
            password: config.password,
        })
    }
}

#[async_trait]
impl OutputPlugin for HttpOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn write(&mut self, events: &[String]) -> Result<usize, PluginError> {
        let mut request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .body(join_events(events, "\n"));

        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() != self.success_code {
            let body = response.text().await.unwrap_or_default();
            return Err(PluginError::runtime(format!(
                "Server responded with status {} (expected {}): {}",
                status.as_u16(),
                self.success_code,
                body.chars().take(200).collect::<String>()
            )));
        }

        debug!("Sent {} event(s) to {}", events.len(), self.url);
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> HttpConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config("url: http://localhost:9200/_bulk");
        assert_eq!(config.method, "POST");
        assert_eq!(config.success_code, 201);
        assert!(config.verify);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_violations() {
        let config = config("url: ftp://example.com\nmethod: FETCH\nsuccess_code: 42");
        let violations = config.validate().unwrap_err();
        assert_eq!(violations.len(), 3, "{violations:?}");
    }

    #[test]
    fn test_build_rejects_bad_header_value() {
        let config = config("url: http://localhost\nheaders:\n  X-Token: \"bad\\nvalue\"");
        let result = HttpOutput::build(config, &InstanceParams::new("test", "."));
        assert!(matches!(result, Err(PluginError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let config = config("url: http://127.0.0.1:1/\nconnect_timeout: 1\nrequest_timeout: 1");
        let mut output = HttpOutput::build(config, &InstanceParams::new("test", ".")).unwrap();
        assert!(output.write(&["event".to_string()]).await.is_err());
    }
}
