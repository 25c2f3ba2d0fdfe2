use crate::output::{OnConflict, Redownload};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Kumo-Sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,

    /// One section per crawler, each synchronizing one source
    #[serde(default)]
    pub crawler: Vec<CrawlerConfig>,
}

/// Settings shared by all crawlers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Directory all output directories are relative to. Defaults to the
    /// current working directory.
    #[serde(rename = "working-dir")]
    pub working_dir: Option<PathBuf>,

    /// Whether output names must be representable on Windows. Defaults to
    /// true on Windows, false elsewhere.
    #[serde(rename = "windows-paths")]
    pub windows_paths: Option<bool>,
}

impl SyncConfig {
    pub fn windows_paths(&self) -> bool {
        self.windows_paths.unwrap_or(cfg!(windows))
    }
}

/// Configuration of a single crawler
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    pub name: String,

    /// Where the crawler's files end up. Defaults to the crawler's name.
    #[serde(rename = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Concurrent crawl/download tasks
    #[serde(default = "default_tasks")]
    pub tasks: usize,

    /// Concurrent downloads, at most `tasks`. Defaults to `tasks`.
    pub downloads: Option<usize>,

    /// Minimum delay between consecutive task starts, in milliseconds
    #[serde(rename = "task-delay-ms", default)]
    pub task_delay_ms: u64,

    #[serde(default)]
    pub redownload: Redownload,

    #[serde(rename = "on-conflict", default)]
    pub on_conflict: OnConflict,

    /// Whether kept local-only files are listed in the report
    #[serde(rename = "report-orphans", default = "default_true")]
    pub report_orphans: bool,

    /// Transformation rules, one per line
    #[serde(default)]
    pub transform: String,

    /// Attempts per remote operation before its failure is recorded
    #[serde(rename = "retry-attempts", default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Initial backoff between retries, in milliseconds
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    pub source: SourceConfig,
}

impl CrawlerConfig {
    pub fn downloads(&self) -> usize {
        self.downloads.unwrap_or(self.tasks)
    }

    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Where a crawler's files come from
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    /// A directory on the local filesystem
    Local {
        path: PathBuf,

        /// Artificial delay before each operation, in milliseconds
        #[serde(rename = "crawl-delay-ms", default)]
        crawl_delay_ms: u64,
    },

    /// An HTTP server answering directory requests with JSON listings
    Http {
        /// Root URL of the remote tree, must end in a slash
        #[serde(rename = "base-url")]
        base_url: String,

        username: String,
        password: String,
    },
}

fn default_tasks() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}
