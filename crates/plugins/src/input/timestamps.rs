use crate::error::PluginError;
use crate::normalize::{normalize_versatile_datetime, NonePoint, VersatileDatetime};
use crate::plugin::{InputPlugin, InstanceParams, PluginSpec, Validate};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampsConfig {
    pub timestamps: Vec<VersatileDatetime>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validate for TimestampsConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.timestamps.is_empty() {
            return Err(vec!["timestamps must contain at least one item".to_string()]);
        }
        Ok(())
    }
}

/// Produces an explicit list of timestamps in ascending order.
pub struct TimestampsInput {
    timestamps: Vec<DateTime<Utc>>,
    cursor: usize,
    tags: Vec<String>,
}

impl PluginSpec for TimestampsInput {
    const NAME: &'static str = "timestamps";
    type Config = TimestampsConfig;

    fn build(config: TimestampsConfig, params: &InstanceParams) -> Result<Self, PluginError> {
        let mut timestamps = config
            .timestamps
            .iter()
            .map(|value| {
                normalize_versatile_datetime(Some(value), params.timezone, None, NonePoint::Now)
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .collect::<Result<Vec<_>, _>>()?;
        timestamps.sort();

        Ok(Self {
            timestamps,
            cursor: 0,
            tags: config.tags,
        })
    }
}

impl InputPlugin for TimestampsInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn produce(&mut self, limit: usize) -> Result<Option<Vec<DateTime<Utc>>>, PluginError> {
        if self.cursor >= self.timestamps.len() {
            return Ok(None);
        }

        let end = (self.cursor + limit).min(self.timestamps.len());
        let chunk = self.timestamps[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_are_sorted() {
        let config: TimestampsConfig = serde_yaml::from_str(
            "timestamps: ['2024-01-01T00:00:02Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:01Z']",
        )
        .unwrap();
        let mut input = TimestampsInput::build(config, &InstanceParams::new("test", ".")).unwrap();

        let produced = input.produce(10).unwrap().unwrap();
        assert_eq!(produced.len(), 3);
        assert!(produced.windows(2).all(|w| w[0] <= w[1]));
        assert!(input.produce(10).unwrap().is_none());
    }

    #[test]
    fn test_timestamps_rejects_garbage() {
        let result: Result<TimestampsConfig, _> = serde_yaml::from_str("timestamps: ['yesterday-ish']");
        assert!(result.is_err());
    }
}
