//! Crawl scheduling and orchestration
//!
//! A [`Crawler`] walks one source, pushes every discovered path through the
//! transformer, and hands downloads to its output directory. Directory
//! listings fan out into concurrent tasks bounded by the [`Limiter`]; a
//! directory's task only finishes once all its children have, so a finished
//! run has seen the complete remote tree.
//!
//! Per-path failures are recorded in the report and don't stop the run.
//! Fatal errors (expired sessions, broken config) cancel all outstanding
//! work. The orphan cleanup pass only runs after a fully error-free crawl,
//! since an incomplete listing makes local-only files indistinguishable from
//! not-yet-visited ones.

mod dedup;
mod retry;

pub use dedup::Deduplicator;
pub use retry::with_retries;

use crate::limiter::Limiter;
use crate::output::{Heuristics, OutputDirectory};
use crate::path::{fmt_path, PurePath};
use crate::source::{ByteStream, RemoteEntry, SourceAdapter};
use crate::transform::{TransformResult, Transformer};
use crate::SyncError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Directory nesting beyond this aborts the subtree, assuming a cycle
const MAX_DEPTH: usize = 32;

/// Where a crawler currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// How often and how patiently to retry transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Synchronizes one source into one output directory
pub struct Crawler {
    name: String,
    source: Arc<dyn SourceAdapter>,
    transformer: Transformer,
    limiter: Limiter,
    output: OutputDirectory,
    dedup: Mutex<Deduplicator>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    state: Mutex<CrawlerState>,
    fatal: Mutex<Option<SyncError>>,
}

impl Crawler {
    pub fn new(
        name: String,
        source: Arc<dyn SourceAdapter>,
        transformer: Transformer,
        limiter: Limiter,
        output: OutputDirectory,
        windows_paths: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name,
            source,
            transformer,
            limiter,
            output,
            dedup: Mutex::new(Deduplicator::new(windows_paths)),
            retry,
            cancel: CancellationToken::new(),
            state: Mutex::new(CrawlerState::Idle),
            fatal: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CrawlerState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: CrawlerState) {
        *self.state.lock().unwrap() = state;
    }

    /// A token that cancels this crawler's run when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn output(&self) -> &OutputDirectory {
        &self.output
    }

    /// Runs one full synchronization pass.
    ///
    /// The report is stored even when the run fails or is cancelled, so the
    /// next run knows which local files this one managed to write.
    pub async fn run(self: &Arc<Self>) -> crate::Result<()> {
        info!("Synchronizing {}", self.name);
        self.set_state(CrawlerState::Running);

        let result = self.run_inner().await;

        if let Err(e) = self.output.store_report() {
            error!("Failed to store report for {}: {e}", self.name);
        }
        self.log_summary();

        match &result {
            Err(_) => self.set_state(CrawlerState::Failed),
            Ok(()) if self.cancel.is_cancelled() => self.set_state(CrawlerState::Cancelled),
            Ok(()) => self.set_state(CrawlerState::Completed),
        }
        result
    }

    async fn run_inner(self: &Arc<Self>) -> crate::Result<()> {
        self.output.prepare().await?;

        let result = Arc::clone(self).crawl_dir(PurePath::root(), 0).await;
        self.handle_result(&PurePath::root(), result);

        if let Some(fatal) = self.fatal.lock().unwrap().take() {
            return Err(fatal);
        }

        if self.cancel.is_cancelled() {
            info!("Run of {} was cancelled, skipping cleanup", self.name);
            return Ok(());
        }

        if self.output.error_free() {
            self.output.cleanup().await?;
        } else {
            info!(
                "Run of {} had warnings or errors, skipping cleanup",
                self.name
            );
        }
        Ok(())
    }

    /// Lists a directory and fans out into one task per entry. Resolves once
    /// the whole subtree is done.
    fn crawl_dir(
        self: Arc<Self>,
        remote: PurePath,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = crate::Result<()>> + Send>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if depth > MAX_DEPTH {
                self.output.add_warning(format!(
                    "Not descending into {}, nesting too deep (cycle?)",
                    fmt_path(&remote)
                ));
                return Ok(());
            }

            let entries = {
                let _permit = self.limiter.limit_crawl().await;
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                debug!("Listing {}", fmt_path(&remote));
                let retry = self.retry;
                with_retries(retry.attempts, retry.base_delay, || {
                    self.source.list(&remote)
                })
                .await?
            };

            let mut tasks: JoinSet<()> = JoinSet::new();
            for entry in entries {
                let child = remote.child(&entry.name);
                if let Err(e) = self.schedule_entry(&mut tasks, &remote, entry, depth) {
                    // Stop scheduling, but let already spawned siblings settle
                    self.handle_result(&child, Err(e));
                    break;
                }
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    // Task panics should not take down unrelated subtrees
                    self.output.add_error(format!("internal task failure: {e}"));
                }
            }
            Ok(())
        })
    }

    fn schedule_entry(
        self: &Arc<Self>,
        tasks: &mut JoinSet<()>,
        parent: &PurePath,
        entry: RemoteEntry,
        depth: usize,
    ) -> crate::Result<()> {
        let remote = parent.child(&entry.name);
        self.output.found(remote.clone());

        let transformed = match self.transformer.transform(&remote)? {
            TransformResult::Ignored => {
                debug!("Ignoring {}", fmt_path(&remote));
                return Ok(());
            }
            result => result.output(&remote).unwrap_or_else(|| remote.clone()),
        };

        if entry.is_dir() {
            // Reserve the directory name so file dedup can't claim it
            self.dedup.lock().unwrap().mark(&transformed);
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let result = Arc::clone(&this).crawl_dir(remote.clone(), depth + 1).await;
                this.handle_result(&remote, result);
            });
        } else {
            let output = self.dedup.lock().unwrap().mark(&transformed);
            let heuristics = Heuristics {
                mtime: entry.mtime,
                size: entry.size,
            };
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let result = this.process_file(&remote, &output, heuristics).await;
                this.handle_result(&remote, result);
            });
        }
        Ok(())
    }

    async fn process_file(
        &self,
        remote: &PurePath,
        output: &PurePath,
        heuristics: Heuristics,
    ) -> crate::Result<()> {
        let _permit = self.limiter.limit_download().await;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let Some(mut sink) = self.output.download(output, heuristics).await? else {
            return Ok(());
        };

        debug!("Downloading {}", fmt_path(remote));
        let retry = self.retry;
        let mut body = with_retries(retry.attempts, retry.base_delay, || {
            self.source.fetch(remote)
        })
        .await?;

        while let Some(chunk) = body.next_chunk().await? {
            sink.write_all(&chunk).await?;
        }
        sink.done().await
    }

    /// Records a subtree's outcome. Fatal errors cancel the whole run, other
    /// errors are logged per path and the run continues.
    fn handle_result(&self, path: &PurePath, result: crate::Result<()>) {
        let Err(e) = result else { return };

        if e.is_fatal() {
            error!("Fatal error in {}: {e}", self.name);
            let mut fatal = self.fatal.lock().unwrap();
            if fatal.is_none() {
                *fatal = Some(e);
            }
            self.cancel.cancel();
        } else {
            error!("Error at {}: {e}", fmt_path(path));
            self.output.add_error(format!("{}: {e}", fmt_path(path)));
        }
    }

    fn log_summary(&self) {
        self.output.with_report(|report| {
            info!(
                "Report for {}: {} added, {} changed, {} deleted, {} errors",
                self.name,
                report.added_files().len(),
                report.changed_files().len(),
                report.deleted_files().len(),
                report.encountered_errors().len(),
            );
        });
    }
}
