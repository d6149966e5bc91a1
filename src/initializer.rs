//! Plugins initializer.
//!
//! Turns the plugin entries of a loaded [`GeneratorConfig`] into plugin
//! instances: registry lookup, definition loading, typed validation and
//! construction. Every failure names the plugin it belongs to.

use crate::parameters::GeneratorParameters;
use eventum_config::{GeneratorConfig, PluginEntry};
use eventum_plugins::{
    EventPlugin, InputPlugin, InstanceParams, OutputPlugin, PluginDefinition, PluginError,
    PluginKind, PluginRegistry, RegistryError,
};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, info};

/// Why a plugin could not be initialized.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationErrorKind {
    #[error("Plugin not found")]
    NotFound,

    #[error("Failed to load plugin: {0}")]
    Load(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    /// The plugin rejected its configuration while being constructed.
    #[error("{0}")]
    Construction(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to initialize {plugin_type} plugin `{plugin_name}`: {kind}")]
pub struct InitializationError {
    pub plugin_type: PluginKind,
    pub plugin_name: String,
    pub kind: InitializationErrorKind,
}

impl InitializationError {
    fn new(plugin_type: PluginKind, plugin_name: &str, kind: InitializationErrorKind) -> Self {
        Self {
            plugin_type,
            plugin_name: plugin_name.to_string(),
            kind,
        }
    }
}

/// A plugin family that can be resolved in the registry.
pub trait PluginFamily: 'static {
    const KIND: PluginKind;

    fn definition(
        registry: &PluginRegistry,
        name: &str,
    ) -> Result<PluginDefinition<Self>, RegistryError>;
}

impl PluginFamily for dyn InputPlugin {
    const KIND: PluginKind = PluginKind::Input;

    fn definition(
        registry: &PluginRegistry,
        name: &str,
    ) -> Result<PluginDefinition<Self>, RegistryError> {
        registry.input(name)
    }
}

impl PluginFamily for dyn EventPlugin {
    const KIND: PluginKind = PluginKind::Event;

    fn definition(
        registry: &PluginRegistry,
        name: &str,
    ) -> Result<PluginDefinition<Self>, RegistryError> {
        registry.event(name)
    }
}

impl PluginFamily for dyn OutputPlugin {
    const KIND: PluginKind = PluginKind::Output;

    fn definition(
        registry: &PluginRegistry,
        name: &str,
    ) -> Result<PluginDefinition<Self>, RegistryError> {
        registry.output(name)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "plugin panicked".to_string()
    }
}

/// Initialize one plugin of family `P` from its raw configuration.
pub fn init_plugin<P: PluginFamily + ?Sized>(
    registry: &PluginRegistry,
    name: &str,
    config: serde_yaml::Value,
    params: &InstanceParams,
) -> Result<Box<P>, InitializationError> {
    let fail = |kind| InitializationError::new(P::KIND, name, kind);

    let definition = P::definition(registry, name).map_err(|e| match e {
        RegistryError::NotFound { .. } => fail(InitializationErrorKind::NotFound),
        RegistryError::Load { reason, .. } => fail(InitializationErrorKind::Load(reason)),
    })?;

    let constructor = definition
        .validate(config)
        .map_err(|violations| fail(InitializationErrorKind::InvalidConfiguration(violations)))?;

    match catch_unwind(AssertUnwindSafe(|| constructor(params))) {
        Ok(Ok(plugin)) => {
            debug!("Initialized {} plugin `{}` (id {})", P::KIND, name, params.id);
            Ok(plugin)
        }
        Ok(Err(PluginError::Configuration(message))) => {
            Err(fail(InitializationErrorKind::Construction(message)))
        }
        Ok(Err(other)) => Err(fail(InitializationErrorKind::Unexpected(other.to_string()))),
        Err(payload) => Err(fail(InitializationErrorKind::Unexpected(panic_message(
            payload.as_ref(),
        )))),
    }
}

/// Identity of an initialized plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub kind: PluginKind,
    pub name: String,
    pub id: usize,
}

/// Plugins of one generator, in configuration order.
pub struct InitializedPlugins {
    pub input: Vec<Box<dyn InputPlugin>>,
    pub event: Box<dyn EventPlugin>,
    pub output: Vec<Box<dyn OutputPlugin>>,
}

impl InitializedPlugins {
    pub fn info(&self) -> Vec<PluginInfo> {
        let inputs = self.input.iter().enumerate().map(|(id, p)| PluginInfo {
            kind: PluginKind::Input,
            name: p.name().to_string(),
            id,
        });
        let event = std::iter::once(PluginInfo {
            kind: PluginKind::Event,
            name: self.event.name().to_string(),
            id: 0,
        });
        let outputs = self.output.iter().enumerate().map(|(id, p)| PluginInfo {
            kind: PluginKind::Output,
            name: p.name().to_string(),
            id,
        });
        inputs.chain(event).chain(outputs).collect()
    }
}

impl std::fmt::Debug for InitializedPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializedPlugins")
            .field("plugins", &self.info())
            .finish()
    }
}

fn init_entries<P: PluginFamily + ?Sized>(
    registry: &PluginRegistry,
    entries: &[PluginEntry],
    base: &InstanceParams,
) -> Result<Vec<Box<P>>, InitializationError> {
    entries
        .iter()
        .enumerate()
        .map(|(id, entry)| {
            let params = base.clone().with_id(id);
            init_plugin::<P>(registry, &entry.name, entry.config.clone(), &params)
        })
        .collect()
}

/// Initialize every plugin of a generator configuration.
///
/// Input and output ids are their positions in the configuration lists.
pub fn init_plugins(
    config: &GeneratorConfig,
    params: &GeneratorParameters,
    registry: &PluginRegistry,
) -> Result<InitializedPlugins, InitializationError> {
    let base = InstanceParams::new(params.id(), params.base_path())
        .with_timezone(params.generation().timezone())
        .with_live_mode(params.live_mode());

    let input = init_entries::<dyn InputPlugin>(registry, &config.input, &base)?;
    let event = init_plugin::<dyn EventPlugin>(
        registry,
        &config.event.name,
        config.event.config.clone(),
        &base,
    )?;
    let output = init_entries::<dyn OutputPlugin>(registry, &config.output, &base)?;

    info!(
        "Initialized plugins of generator {}: {} input(s), event `{}`, {} output(s)",
        params.id(),
        input.len(),
        event.name(),
        output.len()
    );

    Ok(InitializedPlugins {
        input,
        event,
        output,
    })
}
