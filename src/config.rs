// src/config.rs

use crate::analysis::{AnalyzerConfig, PartKeywords};
use crate::cycle::CycleConfig;
use crate::detection::ModelConfig;
use crate::pipeline::RuntimeConfig;
use crate::source::SourceConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub model: ModelConfig,
    pub parts: PartKeywords,
    pub analysis: AnalyzerConfig,
    pub cycle: CycleConfig,
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub write_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "reports".to_string(),
            write_report: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&contents).with_context(|| format!("load config {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.source.validate().context("invalid source section")?;
        self.model.validate().context("invalid model section")?;
        self.parts.validate().context("invalid parts section")?;
        self.analysis.validate().context("invalid analysis section")?;
        self.cycle.validate().context("invalid cycle section")?;
        self.runtime.validate().context("invalid runtime section")?;
        Ok(())
    }

    /// Filter directive used when RUST_LOG is not set.
    pub fn log_filter(&self) -> String {
        format!("excavator_monitor={},ort=warn", self.logging.level)
    }
}
