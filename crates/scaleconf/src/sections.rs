//! Configuration sections.

use serde::{Deserialize, Serialize};

/// Batch analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Lowercase file extensions, without the dot.
    #[serde(default = "ScanConfig::default_extensions")]
    pub extensions: Vec<String>,

    /// Paths containing any of these substrings are skipped.
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default = "ScanConfig::default_recursive")]
    pub recursive: bool,

    /// Files analyzed concurrently.
    #[serde(default = "ScanConfig::default_workers")]
    pub workers: usize,

    #[serde(default = "ScanConfig::default_min_alternative_confidence")]
    pub min_alternative_confidence: f64,
}

impl ScanConfig {
    fn default_extensions() -> Vec<String> {
        vec!["mid".to_string(), "midi".to_string(), "smf".to_string()]
    }

    fn default_recursive() -> bool {
        true
    }

    fn default_workers() -> usize {
        4
    }

    fn default_min_alternative_confidence() -> f64 {
        0.6
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: Self::default_extensions(),
            exclude: Vec::new(),
            recursive: Self::default_recursive(),
            workers: Self::default_workers(),
            min_alternative_confidence: Self::default_min_alternative_confidence(),
        }
    }
}

/// Live preview settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "PlaybackConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Half-width of the firing window, in beats.
    #[serde(default = "PlaybackConfig::default_tolerance_beats")]
    pub tolerance_beats: f64,

    /// Beats past the last event before playback completes.
    #[serde(default = "PlaybackConfig::default_completion_tail_beats")]
    pub completion_tail_beats: f64,

    /// Substring of the output port name. Empty picks the first port.
    #[serde(default)]
    pub port: String,

    #[serde(default = "PlaybackConfig::default_client_name")]
    pub client_name: String,

    /// Fixed host tempo; overrides the file's tempo when set.
    #[serde(default)]
    pub tempo: Option<f64>,
}

impl PlaybackConfig {
    fn default_poll_interval_ms() -> u64 {
        1
    }

    fn default_tolerance_beats() -> f64 {
        0.01
    }

    fn default_completion_tail_beats() -> f64 {
        1.0
    }

    fn default_client_name() -> String {
        "scalescope".to_string()
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
            tolerance_beats: Self::default_tolerance_beats(),
            completion_tail_beats: Self::default_completion_tail_beats(),
            port: String::new(),
            client_name: Self::default_client_name(),
            tempo: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info,scalescope=debug".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
