//! Core types shared across passbench crates.
//!
//! Provides:
//! - Centralized error types via thiserror
//! - Configuration management with TOML support

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{AppConfig, ExecutionConfig, ReportConfig};
pub use error::{PassbenchError, Result};
