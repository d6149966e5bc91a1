use super::offset_micros;
use crate::error::PluginError;
use crate::normalize::{normalize_versatile_datetime, NonePoint, VersatileDatetime};
use crate::plugin::{InputPlugin, InstanceParams, PluginSpec, Validate};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    #[serde(default)]
    pub start: Option<VersatileDatetime>,
    pub seconds: f64,
    pub count: u64,
    #[serde(default)]
    pub repeat: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validate for TimerConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        if self.seconds.is_nan() || self.seconds < 0.1 {
            violations.push(format!("seconds must be >= 0.1, got {}", self.seconds));
        }
        if self.count < 1 {
            violations.push(format!("count must be >= 1, got {}", self.count));
        }
        if self.repeat == Some(0) {
            violations.push("repeat must be >= 1".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Fires `count` timestamps every `seconds` after `start`.
///
/// Without `repeat` the sequence is infinite.
pub struct TimerInput {
    start: DateTime<Utc>,
    interval_micros: i128,
    count: u64,
    repeat: Option<u64>,
    tick: u64,
    emitted_in_tick: u64,
    tags: Vec<String>,
}

impl PluginSpec for TimerInput {
    const NAME: &'static str = "timer";
    type Config = TimerConfig;

    fn build(config: TimerConfig, params: &InstanceParams) -> Result<Self, PluginError> {
        let start = normalize_versatile_datetime(
            config.start.as_ref(),
            params.timezone,
            None,
            NonePoint::Now,
        )?;

        Ok(Self {
            start: start.with_timezone(&Utc),
            interval_micros: (config.seconds * 1_000_000.0).round() as i128,
            count: config.count,
            repeat: config.repeat,
            tick: 0,
            emitted_in_tick: 0,
            tags: config.tags,
        })
    }
}

impl InputPlugin for TimerInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn produce(&mut self, limit: usize) -> Result<Option<Vec<DateTime<Utc>>>, PluginError> {
        let mut chunk = Vec::with_capacity(limit.min(1024));

        while chunk.len() < limit {
            if self.repeat.is_some_and(|repeat| self.tick >= repeat) {
                break;
            }

            let fire_at = offset_micros(self.start, self.interval_micros * (self.tick as i128 + 1));
            chunk.push(fire_at);

            self.emitted_in_tick += 1;
            if self.emitted_in_tick == self.count {
                self.emitted_in_tick = 0;
                self.tick += 1;
            }
        }

        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> TimerInput {
        let config: TimerConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        TimerInput::build(config, &InstanceParams::new("test", ".")).unwrap()
    }

    #[test]
    fn test_timer_with_repeat() {
        let mut input = build("start: 2024-01-01T00:00:00Z\nseconds: 1.5\ncount: 2\nrepeat: 3");
        let points = input.produce(100).unwrap().unwrap();

        assert_eq!(points.len(), 6);
        assert_eq!(points[0], points[1]);
        assert_eq!(
            points[0].to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2024-01-01T00:00:01.500Z"
        );
        assert_eq!(
            points[5].to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2024-01-01T00:00:04.500Z"
        );
        assert!(input.produce(100).unwrap().is_none());
    }

    #[test]
    fn test_timer_without_repeat_is_infinite() {
        let mut input = build("start: 2024-01-01T00:00:00Z\nseconds: 1\ncount: 1");
        for _ in 0..10 {
            assert_eq!(input.produce(50).unwrap().unwrap().len(), 50);
        }
    }

    #[test]
    fn test_timer_validation_collects_all_violations() {
        let config: TimerConfig = serde_yaml::from_str("seconds: 0.01\ncount: 0").unwrap();
        let violations = config.validate().unwrap_err();
        assert_eq!(violations.len(), 2);
    }
}
