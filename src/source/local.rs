//! Local filesystem source
//!
//! Mirrors one local directory tree as if it were remote. Mostly useful for
//! testing the full pipeline without a network, but also handles the mundane
//! case of synchronizing out of a mounted share.

use super::{ByteStream, RemoteEntry, RemoteKind, SourceAdapter};
use crate::path::PurePath;
use crate::SyncError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Read size for streamed file content
const CHUNK_SIZE: usize = 64 * 1024;

/// A source backed by a local directory
pub struct LocalSource {
    root: PathBuf,
    /// Artificial delay before every operation, to exercise concurrency in
    /// tests. Zero by default.
    crawl_delay: Duration,
}

impl LocalSource {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            crawl_delay: Duration::ZERO,
        }
    }

    pub fn with_crawl_delay(mut self, delay: Duration) -> Self {
        self.crawl_delay = delay;
        self
    }

    fn resolve(&self, path: &PurePath) -> crate::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for part in path.parts() {
            if part == "." || part == ".." || part.contains('/') || part.contains('\\') {
                return Err(SyncError::PathSafety {
                    path: path.clone(),
                    reason: "unsafe segment in source path".to_string(),
                });
            }
            resolved.push(part);
        }
        Ok(resolved)
    }

    async fn pause(&self) {
        if !self.crawl_delay.is_zero() {
            tokio::time::sleep(self.crawl_delay).await;
        }
    }
}

#[async_trait]
impl SourceAdapter for LocalSource {
    async fn list(&self, path: &PurePath) -> crate::Result<Vec<RemoteEntry>> {
        self.pause().await;
        let dir = self.resolve(path)?;

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let meta = entry.metadata().await?;
            let kind = if meta.is_dir() {
                RemoteKind::Directory
            } else {
                RemoteKind::File
            };
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size: meta.is_file().then(|| meta.len()),
                mtime: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn fetch(&self, path: &PurePath) -> crate::Result<Box<dyn ByteStream>> {
        self.pause().await;
        let file = self.resolve(path)?;
        let file = tokio::fs::File::open(&file).await?;
        Ok(Box::new(FileStream { file }))
    }
}

struct FileStream {
    file: tokio::fs::File,
}

#[async_trait]
impl ByteStream for FileStream {
    async fn next_chunk(&mut self) -> crate::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}
