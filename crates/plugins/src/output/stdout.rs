use super::{default_separator, join_events};
use crate::error::PluginError;
use crate::plugin::{InstanceParams, OutputPlugin, PluginSpec, Validate};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutConfig {
    #[serde(default)]
    pub stream: Stream,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Validate for StdoutConfig {}

/// Writes events to the process stdout or stderr.
pub struct StdoutOutput {
    stream: Stream,
    separator: String,
}

impl PluginSpec for StdoutOutput {
    const NAME: &'static str = "stdout";
    type Config = StdoutConfig;

    fn build(config: StdoutConfig, _params: &InstanceParams) -> Result<Self, PluginError> {
        Ok(Self {
            stream: config.stream,
            separator: config.separator,
        })
    }
}

#[async_trait]
impl OutputPlugin for StdoutOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn write(&mut self, events: &[String]) -> Result<usize, PluginError> {
        let buffer = join_events(events, &self.separator);

        match self.stream {
            Stream::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(buffer.as_bytes()).await?;
                out.flush().await?;
            }
            Stream::Stderr => {
                let mut out = tokio::io::stderr();
                out.write_all(buffer.as_bytes()).await?;
                out.flush().await?;
            }
        }

        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: StdoutConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.stream, Stream::Stdout);
        assert_eq!(config.separator, "\n");
    }

    #[test]
    fn test_invalid_stream() {
        assert!(serde_yaml::from_str::<StdoutConfig>("stream: invalid").is_err());
    }

    #[test]
    fn test_write_reports_all_events_accepted() {
        let config: StdoutConfig = serde_yaml::from_str("stream: stderr").unwrap();
        let mut output = StdoutOutput::build(config, &InstanceParams::new("test", ".")).unwrap();
        let events = vec!["one".to_string(), "two".to_string()];

        let accepted = tokio_test::block_on(output.write(&events)).unwrap();
        assert_eq!(accepted, 2);
    }
}
