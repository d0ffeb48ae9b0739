//! Layered configuration for scalescope.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/scalescope/config.toml` (system)
//! 2. `~/.config/scalescope/config.toml` (user)
//! 3. `./scalescope.toml` (local override, replaced by `--config`)
//! 4. Environment variables (`SCALESCOPE_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [scan]
//! extensions = ["mid", "midi", "smf"]
//! exclude = ["/drafts/"]
//! workers = 4
//!
//! [playback]
//! port = "FLUID"
//! tempo = 100.0
//!
//! [telemetry]
//! log_level = "info"
//! ```
//!
//! ```rust,no_run
//! let config = scaleconf::ScalescopeConfig::load().expect("config");
//! println!("scan workers: {}", config.scan.workers);
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{PlaybackConfig, ScanConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete scalescope configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScalescopeConfig {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ScalescopeConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, with `config_path` taking the place of
    /// `./scalescope.toml`. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (mut config, mut sources) = Self::load_files(&files)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        Ok((config, sources))
    }

    /// Merge the given files in order over the compiled defaults.
    /// Environment variables are not consulted.
    pub fn load_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let config = loader::from_table(merged, &origin)?;
        Ok((config, sources))
    }

    /// Parse a config from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let path = Path::new("<string>");
        let table: toml::Table =
            contents
                .parse()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
        loader::from_table(table, path)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# scalescope configuration\n\n");

        output.push_str("[scan]\n");
        output.push_str(&format!(
            "extensions = {}\n",
            string_array(&self.scan.extensions)
        ));
        output.push_str(&format!("exclude = {}\n", string_array(&self.scan.exclude)));
        output.push_str(&format!("recursive = {}\n", self.scan.recursive));
        output.push_str(&format!("workers = {}\n", self.scan.workers));
        output.push_str(&format!(
            "min_alternative_confidence = {}\n",
            float(self.scan.min_alternative_confidence)
        ));

        output.push_str("\n[playback]\n");
        output.push_str(&format!(
            "poll_interval_ms = {}\n",
            self.playback.poll_interval_ms
        ));
        output.push_str(&format!(
            "tolerance_beats = {}\n",
            float(self.playback.tolerance_beats)
        ));
        output.push_str(&format!(
            "completion_tail_beats = {}\n",
            float(self.playback.completion_tail_beats)
        ));
        output.push_str(&format!("port = {}\n", string(&self.playback.port)));
        output.push_str(&format!(
            "client_name = {}\n",
            string(&self.playback.client_name)
        ));
        match self.playback.tempo {
            Some(bpm) => output.push_str(&format!("tempo = {}\n", float(bpm))),
            None => output.push_str("# tempo = 120.0\n"),
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = {}\n",
            string(&self.telemetry.log_level)
        ));

        output
    }
}

fn string(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn string_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| string(s)).collect();
    format!("[{}]", quoted.join(", "))
}

fn float(v: f64) -> String {
    toml::Value::Float(v).to_string()
}
