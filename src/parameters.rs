//! Generator parameters.
//!
//! Parameters deserialize through raw structs validated in `TryFrom`, so an
//! instance of any parameter type always satisfies its bounds.
//!
//! ```yaml
//! id: web-logs
//! path: generators/web/generator.yml
//! live_mode: true
//! timezone: Europe/Berlin
//! batch:
//!   size: 1000
//!   delay: 0.5
//! queue:
//!   max_timestamp_batches: 10
//!   max_event_batches: 10
//! keep_order: false
//! max_concurrency: 100
//! write_timeout: 10
//! on_write_failure:
//!   policy: retry
//!   attempts: 3
//! params:
//!   host: web-1
//! ```

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_BATCH_DELAY: f64 = 1.0;
pub const MIN_BATCH_DELAY: f64 = 0.1;
pub const DEFAULT_QUEUE_SIZE: usize = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 100;
pub const DEFAULT_WRITE_TIMEOUT: u64 = 10;
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Errors raised when parameters violate their bounds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParametersError {
    #[error("Batch size or timeout must be provided")]
    MissingBatchBound,

    #[error("Batch size must be >= 1")]
    BatchSize,

    #[error("Batch delay must be a finite number of seconds >= {MIN_BATCH_DELAY}, got {0}")]
    BatchDelay(f64),

    #[error("Queue parameter `{0}` must be >= 1")]
    QueueBound(&'static str),

    #[error("Unknown time zone `{0}`")]
    UnknownTimezone(String),

    #[error("max_concurrency must be >= 1")]
    MaxConcurrency,

    #[error("write_timeout must be >= 1 second")]
    WriteTimeout,

    #[error("Retry attempts must be >= 1")]
    RetryAttempts,

    #[error("Generator id must not be empty")]
    EmptyId,

    #[error("Path {path} is not located under {base}")]
    NotRelative { path: PathBuf, base: PathBuf },
}

/// Distinguish an absent field (`None`) from an explicit null (`Some(None)`).
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Batching thresholds. A batch is sealed at `size` records or `delay`
/// seconds after its first record, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBatchParameters")]
pub struct BatchParameters {
    size: Option<usize>,
    delay: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBatchParameters {
    #[serde(default, deserialize_with = "deserialize_present")]
    size: Option<Option<usize>>,
    #[serde(default, deserialize_with = "deserialize_present")]
    delay: Option<Option<f64>>,
}

impl TryFrom<RawBatchParameters> for BatchParameters {
    type Error = ParametersError;

    fn try_from(raw: RawBatchParameters) -> Result<Self, Self::Error> {
        match (raw.size, raw.delay) {
            (None, None) => Ok(Self::default()),
            (size, delay) => Self::new(size.flatten(), delay.flatten()),
        }
    }
}

impl Default for BatchParameters {
    fn default() -> Self {
        Self {
            size: Some(DEFAULT_BATCH_SIZE),
            delay: Some(DEFAULT_BATCH_DELAY),
        }
    }
}

impl BatchParameters {
    pub fn new(size: Option<usize>, delay: Option<f64>) -> Result<Self, ParametersError> {
        if size.is_none() && delay.is_none() {
            return Err(ParametersError::MissingBatchBound);
        }
        if size == Some(0) {
            return Err(ParametersError::BatchSize);
        }
        if let Some(delay) = delay {
            if !delay.is_finite()
                || delay < MIN_BATCH_DELAY
                || Duration::try_from_secs_f64(delay).is_err()
            {
                return Err(ParametersError::BatchDelay(delay));
            }
        }
        Ok(Self { size, delay })
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay.map(Duration::from_secs_f64)
    }
}

/// Capacities of the bounded queues between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQueueParameters")]
pub struct QueueParameters {
    max_timestamp_batches: usize,
    max_event_batches: usize,
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueueParameters {
    #[serde(default = "default_queue_size")]
    max_timestamp_batches: usize,
    #[serde(default = "default_queue_size")]
    max_event_batches: usize,
}

impl TryFrom<RawQueueParameters> for QueueParameters {
    type Error = ParametersError;

    fn try_from(raw: RawQueueParameters) -> Result<Self, Self::Error> {
        Self::new(raw.max_timestamp_batches, raw.max_event_batches)
    }
}

impl Default for QueueParameters {
    fn default() -> Self {
        Self {
            max_timestamp_batches: DEFAULT_QUEUE_SIZE,
            max_event_batches: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl QueueParameters {
    pub fn new(
        max_timestamp_batches: usize,
        max_event_batches: usize,
    ) -> Result<Self, ParametersError> {
        if max_timestamp_batches < 1 {
            return Err(ParametersError::QueueBound("max_timestamp_batches"));
        }
        if max_event_batches < 1 {
            return Err(ParametersError::QueueBound("max_event_batches"));
        }
        Ok(Self {
            max_timestamp_batches,
            max_event_batches,
        })
    }

    pub fn max_timestamp_batches(&self) -> usize {
        self.max_timestamp_batches
    }

    pub fn max_event_batches(&self) -> usize {
        self.max_event_batches
    }
}

/// What the executor does when an output plugin fails to deliver a batch.
///
/// Independently of the policy, a batch that no output accepted ends the run
/// with failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum WriteFailurePolicy {
    /// Log the failure and continue with the next batch.
    #[default]
    Skip,
    /// Retry up to `attempts` more times, then skip.
    Retry { attempts: u32 },
    /// End the run with failure.
    Abort,
}

impl WriteFailurePolicy {
    fn validate(self) -> Result<Self, ParametersError> {
        match self {
            Self::Retry { attempts: 0 } => Err(ParametersError::RetryAttempts),
            other => Ok(other),
        }
    }

    /// Extra attempts after the first failed one.
    pub fn retries(&self) -> u32 {
        match self {
            Self::Retry { attempts } => *attempts,
            _ => 0,
        }
    }
}

fn parse_timezone(name: &str) -> Result<Tz, ParametersError> {
    if name.len() < 3 {
        return Err(ParametersError::UnknownTimezone(name.to_string()));
    }
    name.parse::<Tz>()
        .map_err(|_| ParametersError::UnknownTimezone(name.to_string()))
}

fn serialize_timezone<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(tz.name())
}

/// Parameters of the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGenerationParameters")]
pub struct GenerationParameters {
    #[serde(serialize_with = "serialize_timezone")]
    timezone: Tz,
    batch: BatchParameters,
    queue: QueueParameters,
    keep_order: bool,
    max_concurrency: usize,
    write_timeout: u64,
    on_write_failure: WriteFailurePolicy,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGenerationParameters {
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    batch: BatchParameters,
    #[serde(default)]
    queue: QueueParameters,
    #[serde(default)]
    keep_order: bool,
    #[serde(default = "default_max_concurrency")]
    max_concurrency: usize,
    #[serde(default = "default_write_timeout")]
    write_timeout: u64,
    #[serde(default)]
    on_write_failure: WriteFailurePolicy,
}

impl TryFrom<RawGenerationParameters> for GenerationParameters {
    type Error = ParametersError;

    fn try_from(raw: RawGenerationParameters) -> Result<Self, Self::Error> {
        Self::default()
            .with_timezone(&raw.timezone)?
            .with_batch(raw.batch)
            .with_queue(raw.queue)
            .with_keep_order(raw.keep_order)
            .with_max_concurrency(raw.max_concurrency)?
            .with_write_timeout(raw.write_timeout)?
            .with_write_failure_policy(raw.on_write_failure)
    }
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            batch: BatchParameters::default(),
            queue: QueueParameters::default(),
            keep_order: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            on_write_failure: WriteFailurePolicy::default(),
        }
    }
}

impl GenerationParameters {
    pub fn with_timezone(mut self, name: &str) -> Result<Self, ParametersError> {
        self.timezone = parse_timezone(name)?;
        Ok(self)
    }

    pub fn with_batch(mut self, batch: BatchParameters) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_queue(mut self, queue: QueueParameters) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_keep_order(mut self, keep_order: bool) -> Self {
        self.keep_order = keep_order;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Result<Self, ParametersError> {
        if max_concurrency < 1 {
            return Err(ParametersError::MaxConcurrency);
        }
        self.max_concurrency = max_concurrency;
        Ok(self)
    }

    /// Set the per-delivery timeout in seconds.
    pub fn with_write_timeout(mut self, write_timeout: u64) -> Result<Self, ParametersError> {
        if write_timeout < 1 {
            return Err(ParametersError::WriteTimeout);
        }
        self.write_timeout = write_timeout;
        Ok(self)
    }

    pub fn with_write_failure_policy(
        mut self,
        policy: WriteFailurePolicy,
    ) -> Result<Self, ParametersError> {
        self.on_write_failure = policy.validate()?;
        Ok(self)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn batch(&self) -> &BatchParameters {
        &self.batch
    }

    pub fn queue(&self) -> &QueueParameters {
        &self.queue
    }

    pub fn keep_order(&self) -> bool {
        self.keep_order
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn on_write_failure(&self) -> WriteFailurePolicy {
        self.on_write_failure
    }
}

/// Parameters of one generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeneratorParameters")]
pub struct GeneratorParameters {
    id: String,
    path: PathBuf,
    live_mode: bool,
    skip_past: bool,
    params: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    generation: GenerationParameters,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGeneratorParameters {
    id: String,
    path: PathBuf,
    #[serde(default = "default_true")]
    live_mode: bool,
    #[serde(default = "default_true")]
    skip_past: bool,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    batch: BatchParameters,
    #[serde(default)]
    queue: QueueParameters,
    #[serde(default)]
    keep_order: bool,
    #[serde(default = "default_max_concurrency")]
    max_concurrency: usize,
    #[serde(default = "default_write_timeout")]
    write_timeout: u64,
    #[serde(default)]
    on_write_failure: WriteFailurePolicy,
}

impl TryFrom<RawGeneratorParameters> for GeneratorParameters {
    type Error = ParametersError;

    fn try_from(raw: RawGeneratorParameters) -> Result<Self, Self::Error> {
        let generation = GenerationParameters::try_from(RawGenerationParameters {
            timezone: raw.timezone,
            batch: raw.batch,
            queue: raw.queue,
            keep_order: raw.keep_order,
            max_concurrency: raw.max_concurrency,
            write_timeout: raw.write_timeout,
            on_write_failure: raw.on_write_failure,
        })?;

        Ok(Self::new(raw.id, raw.path)?
            .with_live_mode(raw.live_mode)
            .with_skip_past(raw.skip_past)
            .with_params(raw.params)
            .with_generation(generation))
    }
}

impl GeneratorParameters {
    /// Parameters with defaults for everything but `id` and `path`.
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, ParametersError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ParametersError::EmptyId);
        }
        Ok(Self {
            id,
            path: path.into(),
            live_mode: true,
            skip_past: true,
            params: BTreeMap::new(),
            generation: GenerationParameters::default(),
        })
    }

    pub fn with_live_mode(mut self, live_mode: bool) -> Self {
        self.live_mode = live_mode;
        self
    }

    pub fn with_skip_past(mut self, skip_past: bool) -> Self {
        self.skip_past = skip_past;
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_generation(mut self, generation: GenerationParameters) -> Self {
        self.generation = generation;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn live_mode(&self) -> bool {
        self.live_mode
    }

    pub fn skip_past(&self) -> bool {
        self.skip_past
    }

    pub fn params(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.params
    }

    pub fn generation(&self) -> &GenerationParameters {
        &self.generation
    }

    /// Directory containing the configuration file.
    pub fn base_path(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Copy with `path` joined onto `base_dir` unless it is already absolute.
    pub fn as_absolute(&self, base_dir: &Path) -> Self {
        let mut params = self.clone();
        if self.path.is_relative() {
            params.path = base_dir.join(&self.path);
        }
        params
    }

    /// Copy with `base_dir` stripped from an absolute `path`.
    pub fn as_relative(&self, base_dir: &Path) -> Result<Self, ParametersError> {
        if self.path.is_relative() {
            return Ok(self.clone());
        }

        let relative = self
            .path
            .strip_prefix(base_dir)
            .map_err(|_| ParametersError::NotRelative {
                path: self.path.clone(),
                base: base_dir.to_path_buf(),
            })?;

        let mut params = self.clone();
        params.path = relative.to_path_buf();
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_defaults_when_empty() {
        let batch: BatchParameters = serde_yaml::from_str("{}").unwrap();
        assert_eq!(batch.size(), Some(DEFAULT_BATCH_SIZE));
        assert_eq!(batch.delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_batch_only_size_leaves_delay_unset() {
        let batch: BatchParameters = serde_yaml::from_str("size: 100").unwrap();
        assert_eq!(batch.size(), Some(100));
        assert_eq!(batch.delay(), None);
    }

    #[test]
    fn test_batch_only_delay_leaves_size_unset() {
        let batch: BatchParameters = serde_yaml::from_str("delay: 0.5").unwrap();
        assert_eq!(batch.size(), None);
        assert_eq!(batch.delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_batch_both_null_rejected() {
        let err = serde_yaml::from_str::<BatchParameters>("size: null\ndelay: null").unwrap_err();
        assert!(err.to_string().contains("Batch size or timeout"));
        assert_eq!(
            BatchParameters::new(None, None).unwrap_err(),
            ParametersError::MissingBatchBound
        );
    }

    #[test]
    fn test_batch_bounds() {
        assert_eq!(
            BatchParameters::new(Some(0), None).unwrap_err(),
            ParametersError::BatchSize
        );
        assert!(matches!(
            BatchParameters::new(None, Some(0.05)),
            Err(ParametersError::BatchDelay(_))
        ));
        for delay in [f64::NAN, f64::INFINITY, 1e300] {
            assert!(matches!(
                BatchParameters::new(Some(10), Some(delay)),
                Err(ParametersError::BatchDelay(_))
            ));
        }
        assert!(serde_yaml::from_str::<BatchParameters>("size: 10\ndelay: .inf").is_err());
        assert!(BatchParameters::new(Some(1), Some(0.1)).is_ok());
    }

    #[test]
    fn test_queue_defaults_and_bounds() {
        let queue: QueueParameters = serde_yaml::from_str("{}").unwrap();
        assert_eq!(queue.max_timestamp_batches(), 10);
        assert_eq!(queue.max_event_batches(), 10);

        assert!(QueueParameters::new(0, 1).is_err());
        assert!(QueueParameters::new(1, 0).is_err());
        assert!(serde_yaml::from_str::<QueueParameters>("max_event_batches: 0").is_err());
        assert!(serde_yaml::from_str::<QueueParameters>("extra: 1").is_err());
    }

    #[test]
    fn test_generation_defaults() {
        let params: GenerationParameters = serde_yaml::from_str("{}").unwrap();
        assert_eq!(params.timezone(), Tz::UTC);
        assert_eq!(params.max_concurrency(), 100);
        assert_eq!(params.write_timeout(), Duration::from_secs(10));
        assert!(!params.keep_order());
        assert_eq!(params.on_write_failure(), WriteFailurePolicy::Skip);
    }

    #[test]
    fn test_generation_unknown_timezone() {
        let err = serde_yaml::from_str::<GenerationParameters>("timezone: Mars/Olympus").unwrap_err();
        assert!(err.to_string().contains("Unknown time zone"));
        assert!(GenerationParameters::default().with_timezone("UT").is_err());
    }

    #[test]
    fn test_generation_bounds() {
        assert!(serde_yaml::from_str::<GenerationParameters>("max_concurrency: 0").is_err());
        assert!(serde_yaml::from_str::<GenerationParameters>("write_timeout: 0").is_err());
    }

    #[test]
    fn test_write_failure_policy_forms() {
        let params: GenerationParameters =
            serde_yaml::from_str("on_write_failure: {policy: retry, attempts: 2}").unwrap();
        assert_eq!(
            params.on_write_failure(),
            WriteFailurePolicy::Retry { attempts: 2 }
        );
        assert_eq!(params.on_write_failure().retries(), 2);

        let params: GenerationParameters =
            serde_yaml::from_str("on_write_failure: {policy: abort}").unwrap();
        assert_eq!(params.on_write_failure(), WriteFailurePolicy::Abort);

        assert!(serde_yaml::from_str::<GenerationParameters>(
            "on_write_failure: {policy: retry, attempts: 0}"
        )
        .is_err());
    }

    #[test]
    fn test_generator_parameters_from_yaml() {
        let yaml = r#"
id: web
path: generators/web/generator.yml
live_mode: false
timezone: Europe/Berlin
batch: {size: 5}
params: {host: web-1, port: 8080}
"#;
        let params: GeneratorParameters = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.id(), "web");
        assert!(!params.live_mode());
        assert!(params.skip_past());
        assert_eq!(params.generation().timezone().name(), "Europe/Berlin");
        assert_eq!(params.generation().batch().size(), Some(5));
        assert_eq!(params.params()["port"], serde_json::json!(8080));
        assert_eq!(params.base_path(), PathBuf::from("generators/web"));
    }

    #[test]
    fn test_generator_parameters_reject_empty_id_and_unknown_fields() {
        assert!(serde_yaml::from_str::<GeneratorParameters>("id: ''\npath: g.yml").is_err());
        assert!(
            serde_yaml::from_str::<GeneratorParameters>("id: a\npath: g.yml\nturbo: true").is_err()
        );
    }

    #[test]
    fn test_as_absolute_and_as_relative() {
        let params = GeneratorParameters::new("g", "web/generator.yml").unwrap();

        let absolute = params.as_absolute(Path::new("/srv/eventum"));
        assert_eq!(absolute.path(), Path::new("/srv/eventum/web/generator.yml"));
        assert_eq!(absolute.as_absolute(Path::new("/other")), absolute);

        let relative = absolute.as_relative(Path::new("/srv/eventum")).unwrap();
        assert_eq!(relative.path(), Path::new("web/generator.yml"));
        assert_eq!(relative.as_relative(Path::new("/srv")).unwrap(), relative);

        assert!(absolute.as_relative(Path::new("/opt")).is_err());
    }

    #[test]
    fn test_serialize_flattens_generation() {
        let params = GeneratorParameters::new("g", "g.yml").unwrap();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["timezone"], "UTC");
        assert_eq!(value["max_concurrency"], 100);
        assert_eq!(value["batch"]["size"], 10_000);
    }
}
