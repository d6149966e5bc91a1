use crate::error::PluginError;
use crate::plugin::{InputPlugin, InstanceParams, PluginSpec, Validate};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    pub count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validate for StaticConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.count < 1 {
            return Err(vec![format!("count must be >= 1, got {}", self.count)]);
        }
        Ok(())
    }
}

/// Produces `count` timestamps, all equal to the moment of the first `produce` call.
pub struct StaticInput {
    remaining: u64,
    timestamp: Option<DateTime<Utc>>,
    tags: Vec<String>,
}

impl PluginSpec for StaticInput {
    const NAME: &'static str = "static";
    type Config = StaticConfig;

    fn build(config: StaticConfig, _params: &InstanceParams) -> Result<Self, PluginError> {
        Ok(Self {
            remaining: config.count,
            timestamp: None,
            tags: config.tags,
        })
    }
}

impl InputPlugin for StaticInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn produce(&mut self, limit: usize) -> Result<Option<Vec<DateTime<Utc>>>, PluginError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let timestamp = *self.timestamp.get_or_insert_with(Utc::now);
        let n = self.remaining.min(limit as u64);
        self.remaining -= n;

        Ok(Some(vec![timestamp; n as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_produces_count_then_exhausts() {
        let params = InstanceParams::new("test", ".");
        let config = StaticConfig {
            count: 5,
            tags: vec!["demo".into()],
        };
        let mut input = StaticInput::build(config, &params).unwrap();

        let first = input.produce(3).unwrap().unwrap();
        let second = input.produce(3).unwrap().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert_eq!(first[0], second[0]);
        assert!(input.produce(3).unwrap().is_none());
        assert_eq!(input.tags(), &["demo"]);
    }

    #[test]
    fn test_static_rejects_zero_count() {
        let config = StaticConfig {
            count: 0,
            tags: Vec::new(),
        };
        assert!(config.validate().is_err());
    }
}
