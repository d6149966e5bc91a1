//! Eventum Library
//!
//! Generates synthetic, time-stamped event streams for testing ingestion
//! pipelines. A generator schedules or replays timestamps with input plugins,
//! renders payloads with an event plugin and delivers them to one or more
//! output plugins.
//!
//! # Crates
//!
//! - `eventum_config` - configuration loading with `${params.*}` and
//!   `${secrets.*}` placeholders
//! - `eventum_samples` - CSV/JSON/inline samples with weighted picking
//! - `eventum_plugins` - plugin traits, registry and builtin plugins
//!
//! # Example
//!
//! ```no_run
//! use eventum::{Generator, GeneratorParameters};
//!
//! let params = GeneratorParameters::new("web", "generators/web/generator.yml")?
//!     .with_live_mode(false);
//! let generator = Generator::new(params);
//!
//! if generator.start() {
//!     generator.join();
//! }
//! assert!(generator.is_ended_up());
//! # Ok::<(), eventum::ParametersError>(())
//! ```

pub mod executor;
pub mod generator;
pub mod initializer;
pub mod parameters;

pub use executor::{ExecutionError, ExecutionSummary, Executor, ImproperlyConfiguredError};
pub use generator::{Generator, GeneratorError, GeneratorState};
pub use initializer::{
    init_plugin, init_plugins, InitializationError, InitializationErrorKind, InitializedPlugins,
    PluginFamily, PluginInfo,
};
pub use parameters::{
    BatchParameters, GenerationParameters, GeneratorParameters, ParametersError,
    QueueParameters, WriteFailurePolicy,
};
