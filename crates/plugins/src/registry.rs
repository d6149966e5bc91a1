//! Static plugin registry.
//!
//! Each plugin family maps a name to a loader. A loader returns the plugin's
//! [`PluginDefinition`], which validates raw configuration against the typed
//! schema and yields a constructor for the validated configuration.

use crate::error::{PluginError, RegistryError};
use crate::event::template::TemplateEvent;
use crate::input::cron::CronInput;
use crate::input::linspace::LinspaceInput;
use crate::input::static_input::StaticInput;
use crate::input::timer::TimerInput;
use crate::input::timestamps::TimestampsInput;
use crate::output::file::FileOutput;
use crate::output::http::HttpOutput;
use crate::output::stdout::StdoutOutput;
use crate::plugin::{
    EventPlugin, InputPlugin, InstanceParams, OutputPlugin, PluginKind, PluginSpec, Upcast,
    Validate,
};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Builds a plugin instance from an already validated configuration.
pub type Constructor<P> = Box<dyn FnOnce(&InstanceParams) -> Result<Box<P>, PluginError> + Send>;

/// Loads the definition of a registered plugin.
pub type PluginLoader<P> = fn() -> Result<PluginDefinition<P>, String>;

/// Schema and constructor of a plugin within family `P`.
pub struct PluginDefinition<P: ?Sized> {
    name: &'static str,
    validate: fn(serde_yaml::Value) -> Result<Constructor<P>, Vec<String>>,
}

impl<P: ?Sized> std::fmt::Debug for PluginDefinition<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<P: ?Sized + 'static> PluginDefinition<P> {
    /// Definition of plugin type `S`.
    pub fn of<S>() -> Self
    where
        S: PluginSpec + Upcast<P>,
    {
        Self {
            name: S::NAME,
            validate: validate_config::<S, P>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Validate raw configuration, returning every violation on failure.
    pub fn validate(&self, config: serde_yaml::Value) -> Result<Constructor<P>, Vec<String>> {
        (self.validate)(config)
    }
}

fn validate_config<S, P>(config: serde_yaml::Value) -> Result<Constructor<P>, Vec<String>>
where
    S: PluginSpec + Upcast<P>,
    P: ?Sized + 'static,
{
    let config: S::Config = serde_yaml::from_value(config).map_err(|e| vec![e.to_string()])?;
    config.validate()?;

    Ok(Box::new(move |params: &InstanceParams| {
        S::build(config, params).map(|plugin| <S as Upcast<P>>::upcast(Box::new(plugin)))
    }))
}

/// Name to loader mapping for every plugin family.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    inputs: BTreeMap<String, PluginLoader<dyn InputPlugin>>,
    events: BTreeMap<String, PluginLoader<dyn EventPlugin>>,
    outputs: BTreeMap<String, PluginLoader<dyn OutputPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

static BUILTIN: OnceLock<Arc<PluginRegistry>> = OnceLock::new();

impl PluginRegistry {
    /// Registry without any plugins.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry of the builtin plugins, built once per process.
    pub fn builtin() -> Arc<PluginRegistry> {
        Arc::clone(BUILTIN.get_or_init(|| Arc::new(Self::with_builtins())))
    }

    /// Fresh registry containing the builtin plugins, for extension.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        registry.register_input(StaticInput::NAME, || Ok(PluginDefinition::of::<StaticInput>()));
        registry.register_input(TimestampsInput::NAME, || {
            Ok(PluginDefinition::of::<TimestampsInput>())
        });
        registry.register_input(LinspaceInput::NAME, || {
            Ok(PluginDefinition::of::<LinspaceInput>())
        });
        registry.register_input(TimerInput::NAME, || Ok(PluginDefinition::of::<TimerInput>()));
        registry.register_input(CronInput::NAME, || Ok(PluginDefinition::of::<CronInput>()));

        registry.register_event(TemplateEvent::NAME, || {
            Ok(PluginDefinition::of::<TemplateEvent>())
        });

        registry.register_output(StdoutOutput::NAME, || {
            Ok(PluginDefinition::of::<StdoutOutput>())
        });
        registry.register_output(FileOutput::NAME, || Ok(PluginDefinition::of::<FileOutput>()));
        registry.register_output(HttpOutput::NAME, || Ok(PluginDefinition::of::<HttpOutput>()));

        registry
    }

    pub fn register_input(&mut self, name: impl Into<String>, loader: PluginLoader<dyn InputPlugin>) {
        self.inputs.insert(name.into(), loader);
    }

    pub fn register_event(&mut self, name: impl Into<String>, loader: PluginLoader<dyn EventPlugin>) {
        self.events.insert(name.into(), loader);
    }

    pub fn register_output(
        &mut self,
        name: impl Into<String>,
        loader: PluginLoader<dyn OutputPlugin>,
    ) {
        self.outputs.insert(name.into(), loader);
    }

    pub fn input(&self, name: &str) -> Result<PluginDefinition<dyn InputPlugin>, RegistryError> {
        load(PluginKind::Input, name, self.inputs.get(name))
    }

    pub fn event(&self, name: &str) -> Result<PluginDefinition<dyn EventPlugin>, RegistryError> {
        load(PluginKind::Event, name, self.events.get(name))
    }

    pub fn output(&self, name: &str) -> Result<PluginDefinition<dyn OutputPlugin>, RegistryError> {
        load(PluginKind::Output, name, self.outputs.get(name))
    }

    /// Registered plugin names of a family, sorted.
    pub fn names(&self, kind: PluginKind) -> Vec<&str> {
        match kind {
            PluginKind::Input => self.inputs.keys().map(String::as_str).collect(),
            PluginKind::Event => self.events.keys().map(String::as_str).collect(),
            PluginKind::Output => self.outputs.keys().map(String::as_str).collect(),
        }
    }
}

fn load<P: ?Sized>(
    kind: PluginKind,
    name: &str,
    loader: Option<&PluginLoader<P>>,
) -> Result<PluginDefinition<P>, RegistryError> {
    let loader = loader.ok_or_else(|| RegistryError::NotFound {
        kind,
        name: name.to_string(),
    })?;

    loader().map_err(|reason| RegistryError::Load {
        kind,
        name: name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = PluginRegistry::builtin();
        assert_eq!(
            registry.names(PluginKind::Input),
            vec!["cron", "linspace", "static", "timer", "timestamps"]
        );
        assert_eq!(registry.names(PluginKind::Event), vec!["template"]);
        assert_eq!(registry.names(PluginKind::Output), vec!["file", "http", "stdout"]);
    }

    #[test]
    fn test_unknown_plugin_not_found() {
        let err = PluginRegistry::builtin().input("cron").unwrap_err();
        assert_eq!(err.to_string(), "input plugin `cron` not found");
    }

    #[test]
    fn test_failing_loader_is_load_error() {
        let mut registry = PluginRegistry::empty();
        registry.register_output("broken", || Err("module missing".to_string()));

        let err = registry.output("broken").unwrap_err();
        assert!(matches!(err, RegistryError::Load { .. }));
        assert!(err.to_string().contains("Failed to load"));
    }

    #[test]
    fn test_validate_reports_schema_violations() {
        let definition = PluginRegistry::builtin().input("static").unwrap();
        let config: serde_yaml::Value = serde_yaml::from_str("count: 0").unwrap();

        let violations = definition.validate(config).err().unwrap();
        assert!(violations.iter().any(|v| v.contains("count")));
    }

    #[test]
    fn test_validate_rejects_unknown_fields() {
        let definition = PluginRegistry::builtin().output("stdout").unwrap();
        let config: serde_yaml::Value = serde_yaml::from_str("colour: red").unwrap();
        assert!(definition.validate(config).is_err());
    }
}
