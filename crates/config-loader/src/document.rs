//! Generator configuration document.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Top-level generator configuration.
///
/// Plugin sections are kept as raw YAML; the plugins initializer validates
/// each of them against the plugin's own schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Input plugins, in order. List position is the plugin id.
    pub input: Vec<PluginEntry>,

    /// The single event plugin.
    pub event: PluginEntry,

    /// Output plugins, in order. List position is the plugin id.
    pub output: Vec<PluginEntry>,
}

/// A single-key `{plugin_name: config}` mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEntry {
    pub name: String,
    pub config: Value,
}

impl PluginEntry {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl TryFrom<Mapping> for PluginEntry {
    type Error = String;

    fn try_from(mapping: Mapping) -> Result<Self, Self::Error> {
        if mapping.len() != 1 {
            return Err(format!(
                "plugin entry must contain exactly one key (the plugin name), found {}",
                mapping.len()
            ));
        }

        let Some((key, config)) = mapping.into_iter().next() else {
            return Err("plugin entry is empty".to_string());
        };

        let Value::String(name) = key else {
            return Err(format!("plugin name must be a string, got {key:?}"));
        };

        // `- stdout:` with no body means "use defaults"
        let config = match config {
            Value::Null => Value::Mapping(Mapping::new()),
            other => other,
        };

        Ok(Self { name, config })
    }
}

impl From<&PluginEntry> for Mapping {
    fn from(entry: &PluginEntry) -> Self {
        let mut mapping = Mapping::new();
        mapping.insert(Value::String(entry.name.clone()), entry.config.clone());
        mapping
    }
}

impl Serialize for PluginEntry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Mapping::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PluginEntry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mapping = Mapping::deserialize(deserializer)?;
        PluginEntry::try_from(mapping).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let yaml = r#"
input:
  - static:
      count: 3
  - linspace:
      start: now
      end: +1h
      count: 10
event:
  template:
    mode: all
output:
  - stdout:
"#;
        let config: GeneratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.input.len(), 2);
        assert_eq!(config.input[0].name, "static");
        assert_eq!(config.input[1].name, "linspace");
        assert_eq!(config.event.name, "template");
        assert_eq!(config.output[0].name, "stdout");
        assert!(config.output[0].config.as_mapping().unwrap().is_empty());
    }

    #[test]
    fn test_plugin_entry_requires_single_key() {
        let yaml = r#"
input:
  - static: {count: 1}
    linspace: {count: 1}
event:
  template: {}
output:
  - stdout: {}
"#;
        let err = serde_yaml::from_str::<GeneratorConfig>(yaml).unwrap_err();
        assert!(err.to_string().contains("exactly one key"));
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let yaml = "input: []\nevent: {template: {}}\noutput: []\nextra: 1\n";
        assert!(serde_yaml::from_str::<GeneratorConfig>(yaml).is_err());
    }

    #[test]
    fn test_serialize_keeps_single_key_shape() {
        let entry = PluginEntry::new("stdout", Value::Mapping(Mapping::new()));
        let yaml = serde_yaml::to_string(&entry).unwrap();
        assert_eq!(yaml.trim(), "stdout: {}");
    }
}
