//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ScalescopeConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local override. A CLI path is
/// returned even when missing so the read error names it.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/scalescope/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("scalescope/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("scalescope.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table, checking it deserializes on its own.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

/// Load a single file as a complete config (defaults fill the gaps).
pub fn load_from_file(path: &Path) -> Result<ScalescopeConfig, ConfigError> {
    let table = load_table(path)?;
    from_table(table, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Surface type errors against the file that caused them.
    from_table(table.clone(), path)?;

    Ok(table)
}

pub(crate) fn from_table(table: toml::Table, path: &Path) -> Result<ScalescopeConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base` key by key. Nested tables merge
/// recursively; any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides.
pub fn apply_env_overrides(config: &mut ScalescopeConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |name| env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Values that fail to parse are ignored and not recorded.
pub fn apply_overrides_from(
    config: &mut ScalescopeConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("SCALESCOPE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("SCALESCOPE_LOG_LEVEL".to_string());
    }
    // RUST_LOG is the standard and wins over ours
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Some(v) = lookup("SCALESCOPE_MIDI_PORT") {
        config.playback.port = v;
        sources.env_overrides.push("SCALESCOPE_MIDI_PORT".to_string());
    }

    if let Some(v) = lookup("SCALESCOPE_SCAN_WORKERS") {
        if let Ok(workers) = v.trim().parse::<usize>() {
            if workers > 0 {
                config.scan.workers = workers;
                sources.env_overrides.push("SCALESCOPE_SCAN_WORKERS".to_string());
            }
        }
    }

    if let Some(v) = lookup("SCALESCOPE_TEMPO") {
        if let Ok(bpm) = v.trim().parse::<f64>() {
            if bpm.is_finite() && bpm > 0.0 {
                config.playback.tempo = Some(bpm);
                sources.env_overrides.push("SCALESCOPE_TEMPO".to_string());
            }
        }
    }
}
