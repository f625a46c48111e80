//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for request-scoped archive extraction work dirs.
    /// Each expansion gets its own temporary directory underneath.
    pub work_dir_root: PathBuf,

    /// Capacity of the storage engine's sequencing event channel
    pub sequencing_channel_capacity: usize,

    /// Default tracing filter, overridden by the `RUST_LOG` env var
    pub rust_log: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let config = Self {
            work_dir_root: env::var("STRATA_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),

            sequencing_channel_capacity: env::var("STRATA_SEQUENCING_CHANNEL_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),

            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "strata=debug".to_string()),
        };

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir_root: env::temp_dir(),
            sequencing_channel_capacity: 256,
            rust_log: "strata=debug".to_string(),
        }
    }
}
