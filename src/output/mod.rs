//! Local output directory management
//!
//! An [`OutputDirectory`] owns everything below one filesystem root: mapping
//! pure paths onto it safely, deciding whether existing files need refetching,
//! resolving conflicts with local state, and deleting orphans after a clean
//! run. Downloads go through temporary files and are only moved into place
//! once complete, so an interrupted run never leaves half-written files under
//! their final names.

mod policy;

pub use policy::{
    resolve, should_download, ConflictKind, Heuristics, LocalFile, OnConflict, Redownload,
    Resolution,
};

use crate::path::{fmt_path, PurePath};
use crate::prompt::DecisionProvider;
use crate::report::Report;
use crate::SyncError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Name of the report file kept in the output root
pub const REPORT_FILE: &str = ".kumo-report.json";

/// Attempts at finding an unused temporary file name
const TMP_TRIES: u64 = 5;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A synchronized local directory
pub struct OutputDirectory {
    root: PathBuf,
    redownload: Redownload,
    on_conflict: OnConflict,
    decider: Arc<dyn DecisionProvider>,
    report: Mutex<Report>,
    prev_report: Option<Report>,
    report_orphans: bool,
    dry_run: bool,
}

impl OutputDirectory {
    /// Creates an output directory rooted at `root`.
    ///
    /// Loads the previous run's report if one is stored under the root. Under
    /// [`OnConflict::LocalFirst`] the redownload policy is forced to
    /// [`Redownload::Never`], since local files always win anyway.
    pub fn new(
        root: PathBuf,
        redownload: Redownload,
        on_conflict: OnConflict,
        decider: Arc<dyn DecisionProvider>,
        report_orphans: bool,
    ) -> Self {
        let redownload = if on_conflict == OnConflict::LocalFirst {
            Redownload::Never
        } else {
            redownload
        };

        let report_os_path = root.join(REPORT_FILE);
        let prev_report = if report_os_path.is_file() {
            match Report::load(&report_os_path) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Ignoring unreadable previous report: {e}");
                    None
                }
            }
        } else {
            None
        };

        let mut report = Report::new();
        report.mark_reserved(PurePath::parse(REPORT_FILE));

        Self {
            root,
            redownload,
            on_conflict,
            decider,
            report: Mutex::new(report),
            prev_report,
            report_orphans,
            dry_run: false,
        }
    }

    /// Turns all filesystem writes into log lines.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the output root if it doesn't exist yet.
    pub async fn prepare(&self) -> crate::Result<()> {
        if !self.dry_run {
            tokio::fs::create_dir_all(&self.root).await?;
        }
        Ok(())
    }

    /// Maps a pure path onto the filesystem below the output root.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::PathSafety`] if any segment could escape the
    /// root or carries a path separator.
    pub fn resolve(&self, path: &PurePath) -> crate::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for part in path.parts() {
            let reason = if part.is_empty() {
                Some("empty path segment")
            } else if part == "." || part == ".." {
                Some("path traversal segment")
            } else if part.contains('/') || part.contains('\\') {
                Some("path separator inside segment")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(SyncError::PathSafety {
                    path: path.clone(),
                    reason: reason.to_string(),
                });
            }
            resolved.push(part);
        }
        Ok(resolved)
    }

    /// Records a remote path as found, before transformation.
    pub fn found(&self, path: PurePath) {
        self.report.lock().unwrap().found(path);
    }

    pub fn add_warning(&self, warning: String) {
        self.report.lock().unwrap().add_warning(warning);
    }

    pub fn add_error(&self, error: String) {
        self.report.lock().unwrap().add_error(error);
    }

    /// Whether the run recorded neither warnings nor errors so far.
    pub fn error_free(&self) -> bool {
        self.report.lock().unwrap().error_free()
    }

    /// Runs a closure against the current report.
    pub fn with_report<R>(&self, f: impl FnOnce(&Report) -> R) -> R {
        f(&self.report.lock().unwrap())
    }

    /// Writes the report into the output root.
    pub fn store_report(&self) -> crate::Result<()> {
        if self.dry_run {
            debug!("Dry run, not storing report");
            return Ok(());
        }
        let path = self.root.join(REPORT_FILE);
        self.report.lock().unwrap().store(&path)?;
        Ok(())
    }

    fn is_marked(&self, path: &PurePath) -> bool {
        self.report.lock().unwrap().is_marked(path)
    }

    fn was_ours(&self, path: &PurePath) -> bool {
        self.prev_report
            .as_ref()
            .map(|report| report.is_marked(path))
            .unwrap_or(false)
    }

    /// Resolves a conflict, asking the user when the policy says to.
    /// Returns true when the remote side wins.
    async fn decide(&self, kind: ConflictKind, question: String) -> bool {
        match policy::resolve(kind, self.on_conflict) {
            Resolution::Remote => true,
            Resolution::Local => false,
            Resolution::Ask { default } => self.decider.ask(&question, default).await,
        }
    }

    /// Claims an output path and opens a sink for its content, unless the
    /// redownload policy or a conflict resolution decides the local state
    /// should stay as it is.
    ///
    /// Returns `None` when nothing should be written. The path counts as seen
    /// either way, so cleanup won't touch it.
    pub async fn download(
        &self,
        path: &PurePath,
        remote: Heuristics,
    ) -> crate::Result<Option<FileSink<'_>>> {
        if path.is_root() {
            return Err(SyncError::PathSafety {
                path: path.clone(),
                reason: "the output root is not a file path".to_string(),
            });
        }

        self.report.lock().unwrap().mark(path.clone())?;
        let local = self.resolve(path)?;

        // A directory sitting where the file belongs
        if local.is_dir() {
            let question = format!(
                "Replace local directory {} with a remote file?",
                fmt_path(path)
            );
            if !self.decide(ConflictKind::NewRemoteType, question).await {
                info!("Skipping {}, a local directory is in the way", fmt_path(path));
                return Ok(None);
            }
            if !self.dry_run {
                tokio::fs::remove_dir_all(&local).await?;
            }
        }

        // A file sitting on the path to the file
        if let Some(blocker) = self.blocking_ancestor(path)? {
            let question = format!(
                "Replace local file {} with a remote directory?",
                fmt_path(&blocker)
            );
            if !self.decide(ConflictKind::NewRemoteType, question).await {
                info!("Skipping {}, a local file is in the way", fmt_path(path));
                return Ok(None);
            }
            if !self.dry_run {
                tokio::fs::remove_file(self.resolve(&blocker)?).await?;
            }
        }

        if let Ok(meta) = tokio::fs::metadata(&local).await {
            let local_file = LocalFile {
                mtime: meta.modified().ok().map(DateTime::<Utc>::from),
                size: meta.len(),
            };
            if !policy::should_download(self.redownload, &local_file, &remote) {
                debug!("Not redownloading {}", fmt_path(path));
                return Ok(None);
            }
        }

        if self.dry_run {
            info!("Would download {}", fmt_path(path));
            return Ok(None);
        }

        let parent = local.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent).await?;
        let (file, tmp) = create_tmp_file(parent).await?;

        Ok(Some(FileSink {
            dir: self,
            file: Some(file),
            tmp,
            local,
            path: path.clone(),
            mtime: remote.mtime,
            done: false,
        }))
    }

    /// Finds the first ancestor of `path` that exists locally as a file.
    fn blocking_ancestor(&self, path: &PurePath) -> crate::Result<Option<PurePath>> {
        for ancestor in path.ancestors() {
            if ancestor.is_root() {
                break;
            }
            if self.resolve(&ancestor)?.is_file() {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    /// Moves a completed download into place, resolving conflicts with
    /// whatever is already there.
    async fn finalize(&self, sink: &mut FileSink<'_>) -> crate::Result<()> {
        let existed = sink.local.is_file();

        if existed {
            if same_content(&sink.tmp, &sink.local).await? {
                debug!("Content of {} unchanged", fmt_path(&sink.path));
                tokio::fs::remove_file(&sink.tmp).await?;
                apply_mtime(&sink.local, sink.mtime);
                return Ok(());
            }

            let kind = if self.was_ours(&sink.path) {
                ConflictKind::ChangedRemote
            } else {
                ConflictKind::NewRemote
            };
            let question = format!("Overwrite local file {}?", fmt_path(&sink.path));
            if !self.decide(kind, question).await {
                info!("Keeping local version of {}", fmt_path(&sink.path));
                tokio::fs::remove_file(&sink.tmp).await?;
                return Ok(());
            }
        }

        tokio::fs::rename(&sink.tmp, &sink.local).await?;
        apply_mtime(&sink.local, sink.mtime);

        let mut report = self.report.lock().unwrap();
        if existed {
            info!("Changed {}", fmt_path(&sink.path));
            report.change_file(sink.path.clone());
        } else {
            info!("Added {}", fmt_path(&sink.path));
            report.add_file(sink.path.clone());
        }
        Ok(())
    }

    /// Deletes local files no remote entry claimed this run, bottom-up,
    /// subject to the conflict policy. Empty directories are removed along
    /// the way. The caller must only invoke this after an error-free crawl.
    pub async fn cleanup(&self) -> crate::Result<()> {
        debug!("Looking for orphaned files");
        self.cleanup_dir(self.root.clone(), PurePath::root(), true)
            .await
    }

    fn cleanup_dir(
        &self,
        dir: PathBuf,
        pure: PurePath,
        top: bool,
    ) -> Pin<Box<dyn Future<Output = crate::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut entries = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                entries.push(entry);
            }
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child_pure = pure.child(&name);
                let child_os = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    self.cleanup_dir(child_os, child_pure, false).await?;
                } else if !self.is_marked(&child_pure) {
                    self.cleanup_orphan(&child_os, &child_pure).await?;
                }
            }

            if !top {
                // Only succeeds once the directory is empty
                let _ = tokio::fs::remove_dir(&dir).await;
            }
            Ok(())
        })
    }

    async fn cleanup_orphan(&self, os_path: &Path, path: &PurePath) -> crate::Result<()> {
        let question = format!("Delete local-only file {}?", fmt_path(path));
        if !self.decide(ConflictKind::RemovedLocalOnly, question).await {
            if self.report_orphans {
                self.report.lock().unwrap().not_delete_file(path.clone());
            }
            return Ok(());
        }

        if self.dry_run {
            info!("Would delete {}", fmt_path(path));
            return Ok(());
        }

        tokio::fs::remove_file(os_path).await?;
        info!("Deleted {}", fmt_path(path));
        self.report.lock().unwrap().delete_file(path.clone());
        Ok(())
    }
}

/// An open download, writing into a temporary file
pub struct FileSink<'a> {
    dir: &'a OutputDirectory,
    file: Option<tokio::fs::File>,
    tmp: PathBuf,
    local: PathBuf,
    path: PurePath,
    mtime: Option<DateTime<Utc>>,
    done: bool,
}

impl FileSink<'_> {
    /// The open temporary file.
    pub fn file(&mut self) -> &mut tokio::fs::File {
        self.file.as_mut().unwrap()
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.file().write_all(buf).await
    }

    /// Marks the download complete and moves it into place.
    ///
    /// Dropping a sink without calling this discards the temporary file and
    /// leaves the final path untouched.
    pub async fn done(mut self) -> crate::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        self.done = true;
        self.dir.finalize(&mut self).await
    }
}

impl Drop for FileSink<'_> {
    fn drop(&mut self) {
        if !self.done {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

async fn create_tmp_file(parent: &Path) -> std::io::Result<(tokio::fs::File, PathBuf)> {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let mut last_error = None;
    for _ in 0..TMP_TRIES {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = parent.join(format!(".tmp-{nanos:08x}-{n}"));
        match tokio::fs::File::options()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await
        {
            Ok(file) => return Ok((file, tmp)),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| std::io::Error::other("no free temporary file name")))
}

async fn same_content(a: &Path, b: &Path) -> std::io::Result<bool> {
    let a = tokio::fs::read(a).await?;
    let b = tokio::fs::read(b).await?;
    if a.len() != b.len() {
        return Ok(false);
    }
    Ok(Sha256::digest(&a) == Sha256::digest(&b))
}

fn apply_mtime(local: &Path, mtime: Option<DateTime<Utc>>) {
    if let Some(mtime) = mtime {
        let result = std::fs::File::options()
            .write(true)
            .open(local)
            .and_then(|file| file.set_modified(mtime.into()));
        if let Err(e) = result {
            debug!("Could not set modification time of {local:?}: {e}");
        }
    }
}
