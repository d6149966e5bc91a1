//! Generator lifecycle.
//!
//! A [`Generator`] owns one configuration and runs it on a dedicated thread
//! with its own tokio runtime:
//!
//! ```text
//! Idle ──start()──► Initializing ──► Running ──stop()──► Stopping ──► Ended(ok | failed)
//!                        │                                   ▲
//!                        └──────── failure ──► Ended(failed) │ inputs exhausted
//!                                                 Running ───┘
//! ```

use crate::executor::{ExecutionError, ExecutionSummary, Executor, ImproperlyConfiguredError};
use crate::initializer::{init_plugins, InitializationError, PluginInfo};
use crate::parameters::GeneratorParameters;
use chrono::{DateTime, Utc};
use eventum_config::{ConfigurationLoadError, EnvSecretStore, GeneratorConfig, SecretStore};
use eventum_plugins::PluginRegistry;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Failed to read configuration file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigurationLoadError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(#[from] ImproperlyConfiguredError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Failed to start execution: {0}")]
    Runtime(String),

    /// Queried before a successful start.
    #[error("No information about {0}")]
    NoInformation(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Initializing,
    Running,
    Stopping,
    Ended { success: bool },
}

#[derive(Debug)]
struct Inner {
    state: GeneratorState,
    start_time: Option<DateTime<Utc>>,
    cancel: Option<CancellationToken>,
    plugins_info: Option<Vec<PluginInfo>>,
    config: Option<GeneratorConfig>,
    summary: Option<ExecutionSummary>,
    handle: Option<JoinHandle<()>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe handle of one generator.
pub struct Generator {
    params: GeneratorParameters,
    secrets: Arc<dyn SecretStore>,
    registry: Arc<PluginRegistry>,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("id", &self.params.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Generator {
    pub fn new(params: GeneratorParameters) -> Self {
        Self {
            params,
            secrets: Arc::new(EnvSecretStore::new()),
            registry: PluginRegistry::builtin(),
            inner: Arc::new(Mutex::new(Inner {
                state: GeneratorState::Idle,
                start_time: None,
                cancel: None,
                plugins_info: None,
                config: None,
                summary: None,
                handle: None,
            })),
        }
    }

    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn params(&self) -> &GeneratorParameters {
        &self.params
    }

    /// Load the configuration and build the executor.
    fn prepare(&self) -> Result<(GeneratorConfig, Vec<PluginInfo>, Executor), GeneratorError> {
        let path = self.params.path();
        let content = std::fs::read_to_string(path).map_err(|source| GeneratorError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;

        let config = eventum_config::load(&content, self.params.params(), self.secrets.as_ref())?;
        let plugins = init_plugins(&config, &self.params, &self.registry)?;
        let info = plugins.info();
        let executor = Executor::new(plugins, &self.params)?;

        Ok((config, info, executor))
    }

    /// Start the generator in the background.
    ///
    /// Returns `false` if it is already active or fails to initialize; the
    /// reason is logged. Never panics on configuration errors.
    pub fn start(&self) -> bool {
        let cancel = {
            let mut inner = lock(&self.inner);
            match inner.state {
                GeneratorState::Initializing
                | GeneratorState::Running
                | GeneratorState::Stopping => {
                    warn!("Generator {} is already active", self.params.id());
                    return false;
                }
                GeneratorState::Idle | GeneratorState::Ended { .. } => {}
            }
            let cancel = CancellationToken::new();
            inner.state = GeneratorState::Initializing;
            inner.cancel = Some(cancel.clone());
            inner.summary = None;
            cancel
        };

        info!("Starting generator {}", self.params.id());
        let (config, plugins_info, executor) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Failed to start generator {}: {}", self.params.id(), e);
                let mut inner = lock(&self.inner);
                inner.state = GeneratorState::Ended { success: false };
                inner.cancel = None;
                return false;
            }
        };

        let mut inner = lock(&self.inner);
        let id = self.params.id().to_string();
        let shared = Arc::clone(&self.inner);
        let token = cancel.clone();

        // The thread records its outcome under the same lock, so it cannot
        // finish before the state below is set.
        let spawned = std::thread::Builder::new()
            .name(format!("generator-{id}"))
            .spawn(move || {
                let outcome = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .thread_name(format!("generator-{id}-worker"))
                    .build()
                    .map_err(|e| GeneratorError::Runtime(e.to_string()))
                    .and_then(|runtime| {
                        runtime
                            .block_on(executor.execute(token))
                            .map_err(GeneratorError::from)
                    });

                let mut inner = lock(&shared);
                match outcome {
                    Ok(summary) => {
                        info!("Generator {} ended successfully", id);
                        inner.summary = Some(summary);
                        inner.state = GeneratorState::Ended { success: true };
                    }
                    Err(e) => {
                        error!("Generator {} ended with error: {}", id, e);
                        inner.state = GeneratorState::Ended { success: false };
                    }
                }
                inner.cancel = None;
            });

        match spawned {
            Ok(handle) => {
                inner.state = if cancel.is_cancelled() {
                    GeneratorState::Stopping
                } else {
                    GeneratorState::Running
                };
                inner.start_time = Some(Utc::now());
                inner.plugins_info = Some(plugins_info);
                inner.config = Some(config);
                inner.handle = Some(handle);
                true
            }
            Err(e) => {
                error!(
                    "Failed to spawn thread for generator {}: {}",
                    self.params.id(),
                    e
                );
                inner.state = GeneratorState::Ended { success: false };
                inner.cancel = None;
                false
            }
        }
    }

    /// Request cooperative shutdown. A no-op unless initializing or running.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        if !matches!(
            inner.state,
            GeneratorState::Initializing | GeneratorState::Running
        ) {
            return;
        }
        if let Some(cancel) = &inner.cancel {
            cancel.cancel();
        }
        inner.state = GeneratorState::Stopping;
        info!("Stopping generator {}", self.params.id());
    }

    /// Block until the execution thread finishes. A no-op if never started.
    pub fn join(&self) {
        let handle = lock(&self.inner).handle.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Generator {} thread panicked", self.params.id());
                lock(&self.inner).state = GeneratorState::Ended { success: false };
            }
        }
    }

    pub fn state(&self) -> GeneratorState {
        lock(&self.inner).state
    }

    pub fn is_initializing(&self) -> bool {
        self.state() == GeneratorState::Initializing
    }

    pub fn is_running(&self) -> bool {
        self.state() == GeneratorState::Running
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == GeneratorState::Stopping
    }

    pub fn is_ended_up(&self) -> bool {
        matches!(self.state(), GeneratorState::Ended { .. })
    }

    pub fn is_ended_up_successfully(&self) -> bool {
        self.state() == GeneratorState::Ended { success: true }
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner).start_time
    }

    pub fn get_plugins_info(&self) -> Result<Vec<PluginInfo>, GeneratorError> {
        lock(&self.inner)
            .plugins_info
            .clone()
            .ok_or(GeneratorError::NoInformation("plugins"))
    }

    pub fn get_config(&self) -> Result<GeneratorConfig, GeneratorError> {
        lock(&self.inner)
            .config
            .clone()
            .ok_or(GeneratorError::NoInformation("config"))
    }

    /// Counters of the last successful run.
    pub fn summary(&self) -> Option<ExecutionSummary> {
        lock(&self.inner).summary.clone()
    }
}
