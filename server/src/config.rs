//! Configuration management for the server.

use std::env;
use std::path::PathBuf;

/// Largest frame body accepted by default (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of backend worker threads
    pub worker_threads: usize,
    /// Largest accepted frame body, in bytes
    pub max_frame_size: usize,
    /// Optional JSON dataset to seed the backend with
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            worker_threads: 4,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            seed_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidPort)?,
            None => defaults.port,
        };

        let worker_threads = match lookup("WORKER_THREADS") {
            Some(value) => value
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or(ConfigError::InvalidWorkerThreads)?,
            None => defaults.worker_threads,
        };

        let max_frame_size = match lookup("MAX_FRAME_SIZE") {
            Some(value) => value
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0 && *n <= u32::MAX as usize)
                .ok_or(ConfigError::InvalidMaxFrameSize)?,
            None => defaults.max_frame_size,
        };

        let seed_file = lookup("SEED_FILE").map(PathBuf::from);

        Ok(Self {
            host,
            port,
            worker_threads,
            max_frame_size,
            seed_file,
        })
    }

    /// `host:port` string to bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("WORKER_THREADS must be a positive integer")]
    InvalidWorkerThreads,

    #[error("MAX_FRAME_SIZE must be between 1 and 4294967295")]
    InvalidMaxFrameSize,
}
