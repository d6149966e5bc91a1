//! Plugin capability traits.

use crate::error::PluginError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Plugin family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Input,
    Event,
    Output,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Input => write!(f, "input"),
            PluginKind::Event => write!(f, "event"),
            PluginKind::Output => write!(f, "output"),
        }
    }
}

/// Parameters shared by every plugin instance of a generator.
#[derive(Debug, Clone)]
pub struct InstanceParams {
    /// Position of the plugin in its configuration list.
    pub id: usize,
    pub generator_id: String,
    pub timezone: Tz,
    /// Directory relative plugin paths (templates, samples, files) resolve against.
    pub base_path: PathBuf,
    pub live_mode: bool,
}

impl InstanceParams {
    pub fn new(generator_id: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            id: 0,
            generator_id: generator_id.into(),
            timezone: Tz::UTC,
            base_path: base_path.into(),
            live_mode: true,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_live_mode(mut self, live_mode: bool) -> Self {
        self.live_mode = live_mode;
        self
    }

    /// Resolve a possibly relative path against the base path.
    pub fn resolve_path(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

/// Timestamp source.
///
/// A plugin instance is a lazy, non-decreasing sequence of timestamps that can
/// be consumed once; restarting requires a fresh instance.
pub trait InputPlugin: Send {
    fn name(&self) -> &str;

    /// Tags attached to every timestamp this plugin produces.
    fn tags(&self) -> &[String];

    /// Produce up to `limit` next timestamps, or `None` once exhausted.
    ///
    /// An empty chunk is allowed and does not mean exhaustion.
    fn produce(&mut self, limit: usize) -> Result<Option<Vec<DateTime<Utc>>>, PluginError>;
}

/// What the event plugin sees for a single timestamp.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub timestamp: DateTime<Tz>,
    pub tags: &'a [String],
}

/// Renders payloads for timestamps. Called concurrently from the render pool.
pub trait EventPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, context: &RenderContext<'_>) -> Result<Vec<String>, PluginError>;
}

/// Delivers event batches to a sink.
#[async_trait]
pub trait OutputPlugin: Send {
    fn name(&self) -> &str;

    /// Acquire resources (files, connections). Called once before the first write.
    async fn open(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Deliver a batch, returning the number of accepted events.
    async fn write(&mut self, events: &[String]) -> Result<usize, PluginError>;

    /// Release resources. Called once after the last write.
    async fn close(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Range and consistency checks that serde cannot express.
pub trait Validate {
    /// Return every violation found, or `Ok(())`.
    fn validate(&self) -> Result<(), Vec<String>> {
        Ok(())
    }
}

/// A named plugin with a typed configuration schema.
pub trait PluginSpec: Sized + 'static {
    /// Name under which the plugin is registered and configured.
    const NAME: &'static str;

    type Config: DeserializeOwned + Validate + Send + 'static;

    fn build(config: Self::Config, params: &InstanceParams) -> Result<Self, PluginError>;
}

/// Conversion of a concrete plugin into its family trait object.
pub trait Upcast<P: ?Sized> {
    fn upcast(self: Box<Self>) -> Box<P>;
}

impl<T: InputPlugin + 'static> Upcast<dyn InputPlugin> for T {
    fn upcast(self: Box<Self>) -> Box<dyn InputPlugin> {
        self
    }
}

impl<T: EventPlugin + 'static> Upcast<dyn EventPlugin> for T {
    fn upcast(self: Box<Self>) -> Box<dyn EventPlugin> {
        self
    }
}

impl<T: OutputPlugin + 'static> Upcast<dyn OutputPlugin> for T {
    fn upcast(self: Box<Self>) -> Box<dyn OutputPlugin> {
        self
    }
}
