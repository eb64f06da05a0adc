//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Watched-directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    /// Directory to monitor for incoming images
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Path of the persisted state snapshot (processed set + watermark).
    /// Defaults to `.imglite-state.json` inside the watched directory.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_directory() -> PathBuf {
    PathBuf::from("downloads")
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            state_file: None,
        }
    }
}

impl WatchConfig {
    /// Resolve the state file path, falling back to a dotfile inside the
    /// watched directory so the scanner's hidden-name filter ignores it.
    pub fn resolved_state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.directory.join(".imglite-state.json"))
    }
}

/// Per-file processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingConfig {
    /// Delete the source file after its compressed sibling is finalized (default true)
    #[serde(default = "default_true")]
    pub delete_originals: bool,
    /// Convert alpha-free PNG inputs to JPEG output (default true)
    #[serde(default = "default_true")]
    pub convert_png_to_jpeg: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            delete_originals: true,
            convert_png_to_jpeg: true,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// Maximum retained log entries; oldest entries are dropped past the cap (default 500)
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

fn default_log_capacity() -> usize {
    500
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - IMGLITE_DIRECTORY -> watch.directory
    /// - IMGLITE_STATE_FILE -> watch.state_file
    /// - IMGLITE_DELETE_ORIGINALS -> processing.delete_originals
    /// - IMGLITE_CONVERT_PNG_TO_JPEG -> processing.convert_png_to_jpeg
    /// - IMGLITE_LOG_CAPACITY -> log.capacity
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("IMGLITE_DIRECTORY") {
            if !val.is_empty() {
                self.watch.directory = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("IMGLITE_STATE_FILE") {
            if !val.is_empty() {
                self.watch.state_file = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("IMGLITE_DELETE_ORIGINALS") {
            if let Some(flag) = parse_bool(&val) {
                self.processing.delete_originals = flag;
            }
        }

        if let Ok(val) = env::var("IMGLITE_CONVERT_PNG_TO_JPEG") {
            if let Some(flag) = parse_bool(&val) {
                self.processing.convert_png_to_jpeg = flag;
            }
        }

        if let Ok(val) = env::var("IMGLITE_LOG_CAPACITY") {
            if let Ok(capacity) = val.parse::<usize>() {
                if capacity > 0 {
                    self.log.capacity = capacity;
                }
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Accept "true", "1", "yes" as true; "false", "0", "no" as false.
/// Anything else keeps the existing value.
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
