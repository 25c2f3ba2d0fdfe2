//! Configuration module for Kumo-Sync
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files.
//!
//! # Example
//!
//! ```no_run
//! use kumo_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("kumo.toml")).unwrap();
//! println!("Configured crawlers: {}", config.crawler.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, SourceConfig, SyncConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
