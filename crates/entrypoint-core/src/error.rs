//! Error types for the entrypoint.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for boot operations.
pub type BootResult<T> = Result<T, BootError>;

/// Main error type for boot operations.
#[derive(Error, Debug)]
pub enum BootError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Init(#[from] InitError),

    #[error("Dependency {name} ({host}:{port}) not reachable after {attempts} attempts")]
    DependencyTimeout {
        name: String,
        host: String,
        port: u16,
        attempts: u32,
    },

    #[error("Daemon binary not found: {0}")]
    DaemonNotFound(PathBuf),

    #[error("Command not found on PATH: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors from the guarded one-time initialization actions.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Storage format failed: {0}")]
    FormatFailed(String),

    #[error("Schema migration failed after {attempts} attempts: {last}")]
    MigrationFailed { attempts: u32, last: String },

    #[error("Failed to run {tool}: {source}")]
    ToolFailed {
        tool: String,
        source: std::io::Error,
    },
}

impl From<toml::de::Error> for BootError {
    fn from(e: toml::de::Error) -> Self {
        BootError::Config(e.to_string())
    }
}
