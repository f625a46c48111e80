//! Shared utilities, configuration, and error handling for Strata
//!
//! This crate provides common functionality used across the Strata core:
//! - Configuration management following 12-factor principles
//! - Error types and handling
//! - Content hashing utilities

pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;

pub use config::Config;
pub use crypto::sha256_hex;
pub use logging::init_tracing;
pub use error::{Error, Result, ValidationViolation};
