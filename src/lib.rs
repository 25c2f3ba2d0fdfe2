//! Kumo-Sync: a generic crawl/synchronize engine
//!
//! This crate mirrors a remote, tree-shaped namespace into a local directory
//! and keeps the local copy synchronized across repeated runs. The remote side
//! is abstracted behind a [`source::SourceAdapter`]; what lives here is the
//! path-transformation rule engine, the bounded-concurrency crawl scheduler,
//! and the local-state reconciliation logic (redownload policy, conflict
//! resolution, change report).

pub mod auth;
pub mod config;
pub mod crawler;
pub mod limiter;
pub mod output;
pub mod path;
pub mod prompt;
pub mod report;
pub mod source;
pub mod transform;

use thiserror::Error;

/// Main error type for Kumo-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule error: {0}")]
    Rule(#[from] transform::RuleParseError),

    #[error("Template error: {0}")]
    Template(#[from] transform::TemplateError),

    #[error("Unsafe output path {path}: {reason}")]
    PathSafety { path: PurePath, reason: String },

    #[error("Transient failure for {path}: {message}")]
    Transient { path: PurePath, message: String },

    #[error("Authentication expired and could not be refreshed")]
    AuthExpired,

    #[error("Fatal transport error: {0}")]
    FatalTransport(String),

    #[error("Path bookkeeping error: {0}")]
    Mark(#[from] report::MarkError),

    #[error("Report error: {0}")]
    Report(#[from] report::ReportLoadError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transient { .. } => true,
            SyncError::Http(e) => e.is_timeout() || e.is_connect(),
            SyncError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether this error invalidates the whole run.
    ///
    /// A fatal error stops scheduling new tasks and suppresses the cleanup
    /// pass, since local state can no longer be judged against a complete
    /// remote listing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::Rule(_)
                | SyncError::Template(_)
                | SyncError::AuthExpired
                | SyncError::FatalTransport(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transform rules: {0}")]
    Rules(#[from] transform::RuleParseError),
}

/// Result type alias for Kumo-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, CrawlerState};
pub use output::{OnConflict, Redownload};
pub use path::{fmt_path, PurePath};
pub use report::Report;
pub use transform::{TransformResult, Transformer};
