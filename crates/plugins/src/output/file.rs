use super::{default_separator, join_events};
use crate::error::PluginError;
use crate::plugin::{InstanceParams, OutputPlugin, PluginSpec, Validate};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Validate for FileConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.path.as_os_str().is_empty() {
            return Err(vec!["path must not be empty".to_string()]);
        }
        Ok(())
    }
}

/// Writes events to a local file.
pub struct FileOutput {
    path: PathBuf,
    write_mode: WriteMode,
    separator: String,
    file: Option<File>,
}

impl PluginSpec for FileOutput {
    const NAME: &'static str = "file";
    type Config = FileConfig;

    fn build(config: FileConfig, params: &InstanceParams) -> Result<Self, PluginError> {
        let path = params.resolve_path(&config.path);

        if path.is_dir() {
            return Err(PluginError::configuration(format!(
                "Output path {} is a directory",
                path.display()
            )));
        }

        Ok(Self {
            path,
            write_mode: config.write_mode,
            separator: config.separator,
            file: None,
        })
    }
}

#[async_trait]
impl OutputPlugin for FileOutput {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn open(&mut self) -> Result<(), PluginError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match self.write_mode {
            WriteMode::Append => options.append(true),
            WriteMode::Overwrite => options.write(true).truncate(true),
        };

        self.file = Some(options.open(&self.path).await?);
        debug!("Opened output file {}", self.path.display());
        Ok(())
    }

    async fn write(&mut self, events: &[String]) -> Result<usize, PluginError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PluginError::runtime("File output is not opened"))?;

        file.write_all(join_events(events, &self.separator).as_bytes())
            .await?;
        file.flush().await?;

        Ok(events.len())
    }

    async fn close(&mut self) -> Result<(), PluginError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
