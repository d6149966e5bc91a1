use super::offset_micros;
use crate::error::PluginError;
use crate::normalize::{normalize_versatile_daterange, NonePoint, VersatileDatetime};
use crate::plugin::{InputPlugin, InstanceParams, PluginSpec, Validate};
use chrono::{DateTime, Utc};
use serde::Deserialize;

fn default_endpoint() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinspaceConfig {
    pub start: VersatileDatetime,
    pub end: VersatileDatetime,
    pub count: u64,
    #[serde(default = "default_endpoint")]
    pub endpoint: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validate for LinspaceConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.count < 1 {
            return Err(vec![format!("count must be >= 1, got {}", self.count)]);
        }
        Ok(())
    }
}

/// Produces `count` evenly spaced timestamps between `start` and `end`.
pub struct LinspaceInput {
    start: DateTime<Utc>,
    span_micros: i128,
    divisor: i128,
    count: u64,
    index: u64,
    tags: Vec<String>,
}

impl PluginSpec for LinspaceInput {
    const NAME: &'static str = "linspace";
    type Config = LinspaceConfig;

    fn build(config: LinspaceConfig, params: &InstanceParams) -> Result<Self, PluginError> {
        let (start, end) = normalize_versatile_daterange(
            Some(&config.start),
            Some(&config.end),
            params.timezone,
            NonePoint::Now,
        )?;

        let span_micros = (end - start).num_microseconds().ok_or_else(|| {
            PluginError::configuration("Linspace range is too wide to be divided")
        })?;

        let divisor = if config.endpoint {
            config.count.saturating_sub(1)
        } else {
            config.count
        };

        Ok(Self {
            start: start.with_timezone(&Utc),
            span_micros: span_micros as i128,
            divisor: divisor as i128,
            count: config.count,
            index: 0,
            tags: config.tags,
        })
    }
}

impl LinspaceInput {
    fn point(&self, index: u64) -> DateTime<Utc> {
        if self.divisor == 0 {
            return self.start;
        }
        offset_micros(self.start, self.span_micros * index as i128 / self.divisor)
    }
}

impl InputPlugin for LinspaceInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn produce(&mut self, limit: usize) -> Result<Option<Vec<DateTime<Utc>>>, PluginError> {
        if self.index >= self.count {
            return Ok(None);
        }

        let end = self.count.min(self.index + limit as u64);
        let chunk = (self.index..end).map(|i| self.point(i)).collect();
        self.index = end;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> LinspaceInput {
        let config: LinspaceConfig = serde_yaml::from_str(yaml).unwrap();
        LinspaceInput::build(config, &InstanceParams::new("test", ".")).unwrap()
    }

    fn seconds(points: &[DateTime<Utc>]) -> Vec<i64> {
        points.iter().map(|p| p.timestamp() - points[0].timestamp()).collect()
    }

    #[test]
    fn test_linspace_with_endpoint() {
        let mut input = build("start: 2024-01-01T00:00:00Z\nend: 2024-01-01T00:00:10Z\ncount: 3");
        let points = input.produce(10).unwrap().unwrap();
        assert_eq!(seconds(&points), vec![0, 5, 10]);
        assert!(input.produce(10).unwrap().is_none());
    }

    #[test]
    fn test_linspace_without_endpoint() {
        let mut input = build(
            "start: 2024-01-01T00:00:00Z\nend: 2024-01-01T00:00:10Z\ncount: 5\nendpoint: false",
        );
        let points = input.produce(10).unwrap().unwrap();
        assert_eq!(seconds(&points), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_linspace_relative_end_and_chunks() {
        let mut input = build("start: 2024-01-01T00:00:00Z\nend: +1h\ncount: 61");
        let first = input.produce(60).unwrap().unwrap();
        let last = input.produce(60).unwrap().unwrap();
        assert_eq!(first.len(), 60);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0] - first[0], chrono::TimeDelta::hours(1));
    }

    #[test]
    fn test_linspace_single_point() {
        let mut input = build("start: 2024-01-01T00:00:00Z\nend: 2024-01-02T00:00:00Z\ncount: 1");
        assert_eq!(input.produce(5).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_linspace_start_after_end() {
        let config: LinspaceConfig =
            serde_yaml::from_str("start: 2024-01-02T00:00:00Z\nend: 2024-01-01T00:00:00Z\ncount: 2")
                .unwrap();
        let result = LinspaceInput::build(config, &InstanceParams::new("test", "."));
        assert!(matches!(result, Err(PluginError::Configuration(_))));
    }
}
