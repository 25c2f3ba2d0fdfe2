//! Remote source adapters
//!
//! The crawler only speaks [`SourceAdapter`]: list a remote directory, fetch
//! a remote file. Everything service-specific (URL layout, session handling,
//! rate limits the service imposes) lives behind this trait.

mod http;
mod local;

pub use http::{HttpSource, HttpTransport};
pub use local::LocalSource;

use crate::path::PurePath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What kind of remote object an entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    File,
    Directory,
}

/// One entry in a remote directory listing
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Name of the entry within its directory, a single path segment
    pub name: String,
    pub kind: RemoteKind,
    /// Remote size in bytes, if the source reports one
    pub size: Option<u64>,
    /// Remote modification time, if the source reports one
    pub mtime: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == RemoteKind::Directory
    }
}

/// A remote, tree-shaped namespace the crawler can explore
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Lists the entries of a remote directory. The root directory is the
    /// empty path.
    async fn list(&self, path: &PurePath) -> crate::Result<Vec<RemoteEntry>>;

    /// Opens a remote file for reading. The content arrives in chunks, so
    /// large files never have to fit in memory.
    async fn fetch(&self, path: &PurePath) -> crate::Result<Box<dyn ByteStream>>;
}

/// Content of one remote file, delivered in chunks
#[async_trait]
pub trait ByteStream: Send {
    /// The next chunk of content, or `None` once the file is exhausted.
    async fn next_chunk(&mut self) -> crate::Result<Option<Vec<u8>>>;
}

/// Drains a whole stream into memory. Meant for small payloads.
pub async fn read_to_end(stream: &mut dyn ByteStream) -> crate::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next_chunk().await? {
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
