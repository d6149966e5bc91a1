//! Template event plugin.
//!
//! Renders events from minijinja templates. Templates can pick rows from
//! configured samples:
//!
//! ```jinja
//! {%- set user = weighted_pick('users', 'weight') -%}
//! {{ timestamp }} user={{ user.name }} level={{ pick('levels')['_0'] }}
//! ```

use crate::error::PluginError;
use crate::plugin::{EventPlugin, InstanceParams, PluginSpec, RenderContext, Validate};
use eventum_samples::{SampleConfig, SamplePickError, SamplesReader};
use minijinja::{context, Environment, ErrorKind, Value};
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How templates are chosen for each timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplatePickingMode {
    /// Render every template.
    #[default]
    All,
    /// Render one template chosen uniformly.
    Any,
    /// Render one template chosen proportionally to its `chance`.
    Chance,
    /// Render templates one after another, round-robin.
    Spin,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    pub template: PathBuf,
    #[serde(default)]
    pub chance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    #[serde(default)]
    pub mode: TemplatePickingMode,

    /// Constant values exposed to templates as `params`.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub samples: BTreeMap<String, SampleConfig>,

    /// List of single-key `{alias: {template, chance}}` mappings.
    pub templates: Vec<BTreeMap<String, TemplateSpec>>,
}

impl Validate for TemplateConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();
        let mut aliases = HashSet::new();

        if self.templates.is_empty() {
            violations.push("templates must contain at least one item".to_string());
        }

        for (index, entry) in self.templates.iter().enumerate() {
            if entry.len() != 1 {
                violations.push(format!(
                    "templates[{index}] must contain exactly one key (the template alias)"
                ));
                continue;
            }

            for (alias, spec) in entry {
                if !aliases.insert(alias.as_str()) {
                    violations.push(format!("template alias `{alias}` is used more than once"));
                }

                match (self.mode, spec.chance) {
                    (TemplatePickingMode::Chance, None) => violations.push(format!(
                        "template `{alias}` must define `chance` in `chance` mode"
                    )),
                    (_, Some(chance)) if chance.is_nan() || chance <= 0.0 => violations.push(
                        format!("chance of template `{alias}` must be > 0, got {chance}"),
                    ),
                    _ => {}
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Renders events from templates with access to samples.
pub struct TemplateEvent {
    env: Environment<'static>,
    mode: TemplatePickingMode,
    aliases: Vec<String>,
    cumulative_chances: Vec<f64>,
    params: serde_json::Map<String, serde_json::Value>,
    spin: AtomicUsize,
}

fn pick_error(error: SamplePickError) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, error.to_string())
}

fn register_sample_functions(env: &mut Environment<'static>, samples: Arc<SamplesReader>) {
    let reader = Arc::clone(&samples);
    env.add_function("pick", move |sample: String| -> Result<Value, minijinja::Error> {
        let row = reader
            .get(&sample)
            .and_then(|s| s.pick())
            .map_err(pick_error)?;
        Ok(Value::from_serialize(row))
    });

    let reader = Arc::clone(&samples);
    env.add_function(
        "pick_n",
        move |sample: String, n: usize| -> Result<Value, minijinja::Error> {
            let rows = reader
                .get(&sample)
                .and_then(|s| s.pick_n(n))
                .map_err(pick_error)?;
            Ok(Value::from_serialize(&rows))
        },
    );

    let reader = Arc::clone(&samples);
    env.add_function(
        "weighted_pick",
        move |sample: String, column: String| -> Result<Value, minijinja::Error> {
            let row = reader
                .get(&sample)
                .and_then(|s| s.weighted_pick(&column))
                .map_err(pick_error)?;
            Ok(Value::from_serialize(row))
        },
    );

    let reader = samples;
    env.add_function(
        "weighted_pick_n",
        move |sample: String, column: String, n: usize| -> Result<Value, minijinja::Error> {
            let rows = reader
                .get(&sample)
                .and_then(|s| s.weighted_pick_n(&column, n))
                .map_err(pick_error)?;
            Ok(Value::from_serialize(&rows))
        },
    );
}

impl PluginSpec for TemplateEvent {
    const NAME: &'static str = "template";
    type Config = TemplateConfig;

    fn build(config: TemplateConfig, params: &InstanceParams) -> Result<Self, PluginError> {
        let samples = SamplesReader::load(&config.samples, &params.base_path)
            .map_err(|e| PluginError::configuration(e.to_string()))?;

        let mut env = Environment::new();
        let mut aliases = Vec::with_capacity(config.templates.len());
        let mut cumulative_chances = Vec::with_capacity(config.templates.len());
        let mut total_chance = 0.0;

        for (alias, spec) in config.templates.into_iter().flatten() {
            let path = params.resolve_path(&spec.template);
            let source = std::fs::read_to_string(&path).map_err(|e| {
                PluginError::configuration(format!(
                    "Failed to read template `{alias}` from {}: {e}",
                    path.display()
                ))
            })?;

            env.add_template_owned(alias.clone(), source).map_err(|e| {
                PluginError::configuration(format!("Failed to compile template `{alias}`: {e}"))
            })?;

            total_chance += spec.chance.unwrap_or(1.0);
            cumulative_chances.push(total_chance);
            aliases.push(alias);
        }

        if aliases.is_empty() {
            return Err(PluginError::configuration("No templates configured"));
        }

        register_sample_functions(&mut env, Arc::new(samples));

        debug!(
            "Template plugin loaded {} template(s) in {:?} mode",
            aliases.len(),
            config.mode
        );

        Ok(Self {
            env,
            mode: config.mode,
            aliases,
            cumulative_chances,
            params: config.params,
            spin: AtomicUsize::new(0),
        })
    }
}

impl TemplateEvent {
    fn render_one(&self, alias: &str, context: &Value) -> Result<String, PluginError> {
        Ok(self.env.get_template(alias)?.render(context)?)
    }

    fn chance_index(&self) -> usize {
        let total = self.cumulative_chances[self.cumulative_chances.len() - 1];
        let target = rand::rng().random::<f64>() * total;
        self.cumulative_chances
            .partition_point(|&c| c <= target)
            .min(self.aliases.len() - 1)
    }
}

impl EventPlugin for TemplateEvent {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<Vec<String>, PluginError> {
        let context = context! {
            timestamp => ctx.timestamp.to_rfc3339(),
            tags => ctx.tags,
            params => &self.params,
        };

        match self.mode {
            TemplatePickingMode::All => self
                .aliases
                .iter()
                .map(|alias| self.render_one(alias, &context))
                .collect(),
            TemplatePickingMode::Any => {
                let index = rand::rng().random_range(0..self.aliases.len());
                Ok(vec![self.render_one(&self.aliases[index], &context)?])
            }
            TemplatePickingMode::Chance => {
                let index = self.chance_index();
                Ok(vec![self.render_one(&self.aliases[index], &context)?])
            }
            TemplatePickingMode::Spin => {
                let index = self.spin.fetch_add(1, Ordering::Relaxed) % self.aliases.len();
                Ok(vec![self.render_one(&self.aliases[index], &context)?])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn setup(templates: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, body) in templates {
            std::fs::write(dir.path().join(name), body).unwrap();
        }
        dir
    }

    fn build(dir: &TempDir, yaml: &str) -> Result<TemplateEvent, PluginError> {
        let config: TemplateConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().map_err(|v| PluginError::configuration(v.join("; ")))?;
        TemplateEvent::build(config, &InstanceParams::new("test", dir.path()))
    }

    fn render(plugin: &TemplateEvent, tags: &[String]) -> Vec<String> {
        let timestamp = Tz::UTC.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        plugin.render(&RenderContext { timestamp, tags }).unwrap()
    }

    #[test]
    fn test_render_all_with_context() {
        let dir = setup(&[
            ("a.jinja", "{{ timestamp }} {{ params.host }}"),
            ("b.jinja", "{{ tags | join(',') }}"),
        ]);
        let plugin = build(
            &dir,
            "params: {host: web-1}\ntemplates:\n  - first: {template: a.jinja}\n  - second: {template: b.jinja}\n",
        )
        .unwrap();

        let events = render(&plugin, &["x".to_string(), "y".to_string()]);
        assert_eq!(events, vec!["2024-01-01T12:00:00+00:00 web-1", "x,y"]);
    }

    #[test]
    fn test_render_spin_round_robin() {
        let dir = setup(&[("a.jinja", "a"), ("b.jinja", "b")]);
        let plugin = build(
            &dir,
            "mode: spin\ntemplates:\n  - a: {template: a.jinja}\n  - b: {template: b.jinja}\n",
        )
        .unwrap();

        let sequence: Vec<String> = (0..4).flat_map(|_| render(&plugin, &[])).collect();
        assert_eq!(sequence, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_render_chance_prefers_heavier_template() {
        let dir = setup(&[("a.jinja", "a"), ("b.jinja", "b")]);
        let plugin = build(
            &dir,
            "mode: chance\ntemplates:\n  - a: {template: a.jinja, chance: 90}\n  - b: {template: b.jinja, chance: 10}\n",
        )
        .unwrap();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..2_000 {
            for event in render(&plugin, &[]) {
                *counts.entry(event).or_default() += 1;
            }
        }
        assert!(counts["a"] > counts["b"], "{counts:?}");
    }

    #[test]
    fn test_chance_mode_requires_chance() {
        let dir = setup(&[("a.jinja", "a")]);
        let result = build(&dir, "mode: chance\ntemplates:\n  - a: {template: a.jinja}\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_samples_are_available_in_templates() {
        let dir = setup(&[(
            "a.jinja",
            "{{ pick('levels')['_0'] }}|{{ weighted_pick('users', 'weight').name }}|{{ pick_n('levels', 3) | length }}",
        )]);
        std::fs::write(dir.path().join("users.csv"), "name,weight\nalice,1\nbob,0\n").unwrap();

        let plugin = build(
            &dir,
            r#"
samples:
  levels:
    type: items
    source: [info]
  users:
    type: csv
    source: users.csv
    header: true
templates:
  - a: {template: a.jinja}
"#,
        )
        .unwrap();

        assert_eq!(render(&plugin, &[]), vec!["info|alice|3"]);
    }

    #[test]
    fn test_unknown_sample_is_render_error() {
        let dir = setup(&[("a.jinja", "{{ pick('nope') }}")]);
        let plugin = build(&dir, "templates:\n  - a: {template: a.jinja}\n").unwrap();

        let timestamp = Tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = plugin
            .render(&RenderContext {
                timestamp,
                tags: &[],
            })
            .unwrap_err();
        assert!(err.to_string().contains("No such sample"));
    }

    #[test]
    fn test_missing_template_file_is_configuration_error() {
        let dir = setup(&[]);
        let result = build(&dir, "templates:\n  - a: {template: missing.jinja}\n");
        assert!(matches!(result, Err(PluginError::Configuration(_))));
    }
}
