use crate::config::SampleConfig;
use crate::error::{SampleLoadError, SamplePickError};
use crate::loaders::load_sample;
use crate::sample::Sample;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Named collection of loaded samples.
#[derive(Debug, Clone, Default)]
pub struct SamplesReader {
    samples: HashMap<String, Arc<Sample>>,
}

impl SamplesReader {
    /// Load every configured sample. Relative sources resolve against `base_path`.
    pub fn load(
        configs: &BTreeMap<String, SampleConfig>,
        base_path: &Path,
    ) -> Result<Self, SampleLoadError> {
        let mut samples = HashMap::with_capacity(configs.len());

        for (name, config) in configs {
            let sample =
                load_sample(config, base_path).map_err(|source| SampleLoadError::Named {
                    name: name.clone(),
                    source: Box::new(source),
                })?;
            samples.insert(name.clone(), Arc::new(sample));
        }

        if !samples.is_empty() {
            info!("Loaded {} sample(s)", samples.len());
        }

        Ok(Self { samples })
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Sample>, SamplePickError> {
        self.samples
            .get(name)
            .ok_or_else(|| SamplePickError::NoSuchSample(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
