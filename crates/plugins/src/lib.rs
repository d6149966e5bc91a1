//! Plugins for eventum generators.
//!
//! A generator is wired from three plugin families:
//!
//! - **input** plugins produce the timestamps at which events happen
//! - the single **event** plugin renders zero or more payloads per timestamp
//! - **output** plugins deliver batches of payloads to sinks
//!
//! Plugins are looked up by name in a [`PluginRegistry`]. Each registered
//! plugin carries a typed configuration schema, so configuration is validated
//! before the plugin is constructed.

pub mod error;
pub mod event;
pub mod input;
pub mod normalize;
pub mod output;
mod plugin;
mod registry;

pub use error::{PluginError, RegistryError};
pub use plugin::{
    EventPlugin, InputPlugin, InstanceParams, OutputPlugin, PluginKind, PluginSpec,
    RenderContext, Upcast, Validate,
};
pub use registry::{Constructor, PluginDefinition, PluginLoader, PluginRegistry};
