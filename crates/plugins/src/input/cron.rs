use crate::error::PluginError;
use crate::normalize::{
    normalize_versatile_datetime, normalize_versatile_daterange, NonePoint, VersatileDatetime,
};
use crate::plugin::{InputPlugin, InstanceParams, PluginSpec, Validate};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ::cron::Schedule;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CronConfig {
    #[serde(default)]
    pub start: Option<VersatileDatetime>,
    #[serde(default)]
    pub end: Option<VersatileDatetime>,
    pub expression: String,
    pub count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parse a cron expression. Five-field expressions (no seconds) fire at
/// second zero.
fn parse_schedule(expression: &str) -> Result<Schedule, String> {
    let expanded = match expression.split_whitespace().count() {
        5 => format!("0 {}", expression.trim()),
        _ => expression.trim().to_string(),
    };
    Schedule::from_str(&expanded)
        .map_err(|e| format!("invalid cron expression `{expression}`: {e}"))
}

impl Validate for CronConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        if let Err(e) = parse_schedule(&self.expression) {
            violations.push(e);
        }
        if self.count < 1 {
            violations.push(format!("count must be >= 1, got {}", self.count));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Fires `count` timestamps at every schedule tick after `start`, up to and
/// including `end`.
///
/// The schedule is evaluated in the generator timezone. Without `end` the
/// sequence is infinite.
pub struct CronInput {
    schedule: Schedule,
    cursor: DateTime<Tz>,
    end: Option<DateTime<Tz>>,
    count: u64,
    current: Option<DateTime<Tz>>,
    emitted_in_tick: u64,
    exhausted: bool,
    tags: Vec<String>,
}

impl PluginSpec for CronInput {
    const NAME: &'static str = "cron";
    type Config = CronConfig;

    fn build(config: CronConfig, params: &InstanceParams) -> Result<Self, PluginError> {
        let schedule = parse_schedule(&config.expression).map_err(PluginError::configuration)?;

        let (start, end) = match config.end {
            Some(ref end) => {
                let (start, end) = normalize_versatile_daterange(
                    config.start.as_ref(),
                    Some(end),
                    params.timezone,
                    NonePoint::Now,
                )?;
                (start, Some(end))
            }
            None => {
                if matches!(config.start, Some(VersatileDatetime::Never)) {
                    return Err(PluginError::configuration(
                        "Start of the cron schedule cannot be `never`",
                    ));
                }
                let start = normalize_versatile_datetime(
                    config.start.as_ref(),
                    params.timezone,
                    None,
                    NonePoint::Now,
                )?;
                (start, None)
            }
        };

        Ok(Self {
            schedule,
            cursor: start,
            end,
            count: config.count,
            current: None,
            emitted_in_tick: 0,
            exhausted: false,
            tags: config.tags,
        })
    }
}

impl CronInput {
    fn next_tick(&mut self) -> Option<DateTime<Tz>> {
        let tick = self.schedule.after(&self.cursor).next()?;
        if self.end.is_some_and(|end| tick > end) {
            return None;
        }
        self.cursor = tick;
        Some(tick)
    }
}

impl InputPlugin for CronInput {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn produce(&mut self, limit: usize) -> Result<Option<Vec<DateTime<Utc>>>, PluginError> {
        let mut chunk = Vec::with_capacity(limit.min(1024));

        while chunk.len() < limit && !self.exhausted {
            let tick = match self.current {
                Some(tick) => tick,
                None => match self.next_tick() {
                    Some(tick) => {
                        self.current = Some(tick);
                        tick
                    }
                    None => {
                        self.exhausted = true;
                        break;
                    }
                },
            };
            chunk.push(tick.with_timezone(&Utc));

            self.emitted_in_tick += 1;
            if self.emitted_in_tick == self.count {
                self.emitted_in_tick = 0;
                self.current = None;
            }
        }

        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}
