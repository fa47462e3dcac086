//! Configuration management for the analyzer
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-metrics.toml)
//! - Environment variables (SCHEMA_METRICS__*)
//!
//! ## Example config file (schema-metrics.toml):
//! ```toml
//! [resolution]
//! max_rounds = 10
//!
//! [fetch]
//! enabled = true
//! timeout_secs = 30
//! offline = [{ prefix = "http://json-schema.org/", dir = "mirrors/json-schema.org" }]
//!
//! [validation]
//! enabled = true
//! require_schema_keyword = true
//!
//! [batch]
//! workers = 0
//! extensions = ["json"]
//!
//! [output]
//! format = "pretty"
//! log_filter = "info"
//!
//! [[counters]]
//! key = "format_count"
//! name = "^format$"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::graph::MAX_ROUNDS;

/// Main configuration for the analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Remote document loading
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    /// Corpus processing
    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Extra keyword counters
    #[serde(default)]
    pub counters: Vec<CounterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Upper bound on resolution rounds per document
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Allow network access for remote references
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Local mirrors consulted before the network
    #[serde(default)]
    pub offline: Vec<MirrorConfig>,
}

/// URL prefix served from a local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub prefix: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Check documents against their draft meta-schema
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reject documents without a `$schema` keyword
    #[serde(default = "default_true")]
    pub require_schema_keyword: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads; 0 means one per CPU
    #[serde(default)]
    pub workers: usize,

    /// File extensions picked up when walking directories
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Stop after this many documents; 0 means no limit
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Write diagnostics here instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Default tracing filter, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Regex keyword counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Report key
    pub key: String,

    /// Pattern for node names
    pub name: String,

    /// Pattern for leaf values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_rounds() -> usize {
    MAX_ROUNDS
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { max_rounds: default_max_rounds() }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_timeout_secs(),
            offline: Vec::new(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true, require_schema_keyword: true }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            extensions: default_extensions(),
            limit: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pretty,
            log_file: None,
            log_filter: default_log_filter(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-metrics.toml",
            ".schema-metrics.toml",
            "config/schema-metrics.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-metrics") {
            let xdg_config = config_dir.config_dir().join("schema-metrics.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_METRICS__FETCH__ENABLED=false
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_METRICS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        std::fs::write(path, self.to_toml()?)
    }

    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Worker count with 0 resolved to the CPU count
    pub fn worker_count(&self) -> usize {
        match self.batch.workers {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.resolution.max_rounds, 10);
        assert!(config.fetch.enabled);
        assert!(config.validation.require_schema_keyword);
        assert_eq!(config.batch.extensions, vec!["json".to_string()]);
        assert_eq!(config.output.format, OutputFormat::Pretty);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_serialize_config() {
        let config = AnalyzerConfig::default();
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("[resolution]"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("max_rounds = 10"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[resolution]
max_rounds = 3

[fetch]
enabled = false
offline = [{ prefix = "http://example.com/", dir = "/tmp/mirror" }]

[[counters]]
key = "format_count"
name = "^format$"
"#,
        )
        .unwrap();

        let config = AnalyzerConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.resolution.max_rounds, 3);
        assert!(!config.fetch.enabled);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.fetch.offline[0].prefix, "http://example.com/");
        assert_eq!(config.counters.len(), 1);
        assert_eq!(config.counters[0].value, None);
    }
}
