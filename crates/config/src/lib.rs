//! Configuration loading for the imglite daemon

pub mod config;

pub use config::{Config, ConfigError, LogConfig, ProcessingConfig, WatchConfig};
