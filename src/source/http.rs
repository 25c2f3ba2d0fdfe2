//! Shared HTTP plumbing for network-backed sources
//!
//! [`HttpTransport`] wraps a [`reqwest::Client`] with the behavior every
//! HTTP source needs: a proper user agent, basic-auth credentials from an
//! [`AuthProvider`], one re-authentication attempt on 401, and detection of
//! the login-redirect pattern that means the session is gone for good.

use super::{ByteStream, RemoteEntry, RemoteKind, SourceAdapter};
use crate::auth::AuthProvider;
use crate::path::{fmt_path, PurePath};
use crate::SyncError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Redirect chains longer than this are treated as an error
const MAX_REDIRECTS: usize = 10;

/// An HTTP client bound to one source's credentials
pub struct HttpTransport {
    client: Client,
    auth: Arc<dyn AuthProvider>,
}

impl HttpTransport {
    /// Builds a transport with the crate's standard client configuration.
    pub fn new(auth: Arc<dyn AuthProvider>) -> Result<Self, reqwest::Error> {
        let user_agent = format!("kumo-sync/{}", env!("CARGO_PKG_VERSION"));

        // Redirects are followed manually so login redirects can be spotted
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, auth })
    }

    /// Fetches a URL and returns its body.
    ///
    /// A 401 response invalidates the credentials and retries once with
    /// fresh ones; a second 401 fails with [`SyncError::AuthExpired`]. A
    /// redirect whose target looks like a login page is fatal too, since it
    /// means every further request would silently fetch login HTML.
    pub async fn get_bytes(&self, url: &Url) -> crate::Result<Vec<u8>> {
        let response = self.get(url, true).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get(&self, url: &Url, retry_auth: bool) -> crate::Result<reqwest::Response> {
        let mut url = url.clone();

        for _ in 0..MAX_REDIRECTS {
            let credentials = self.auth.credentials().await?;
            let response = self
                .client
                .get(url.clone())
                .basic_auth(&credentials.username, Some(&credentials.password))
                .send()
                .await?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if !retry_auth {
                    return Err(SyncError::AuthExpired);
                }
                debug!("Got 401 for {url}, refreshing credentials");
                self.auth.invalidate();
                return Box::pin(self.get(&url, false)).await;
            }

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        SyncError::FatalTransport(format!("redirect without location from {url}"))
                    })?;
                let target = url.join(location).map_err(|e| {
                    SyncError::FatalTransport(format!("invalid redirect target {location}: {e}"))
                })?;
                if looks_like_login(&target) {
                    return Err(SyncError::FatalTransport(format!(
                        "redirected to login page at {target}"
                    )));
                }
                debug!("Following redirect {url} -> {target}");
                url = target;
                continue;
            }

            if status.is_server_error() {
                return Err(SyncError::Transient {
                    path: crate::path::PurePath::root(),
                    message: format!("{status} from {url}"),
                });
            }

            if !status.is_success() {
                return Err(SyncError::FatalTransport(format!("{status} from {url}")));
            }

            return Ok(response);
        }

        Err(SyncError::FatalTransport(format!(
            "too many redirects starting from {url}"
        )))
    }
}

fn looks_like_login(url: &Url) -> bool {
    url.path().to_ascii_lowercase().contains("login")
}

/// A source whose directories answer with JSON listings.
///
/// `GET <base>/<dir>/` returns an array of entries, `GET <base>/<file>`
/// returns the file's bytes:
///
/// ```json
/// [
///   {"name": "slides.pdf", "type": "file", "size": 4, "mtime": "2024-01-01T00:00:00Z"},
///   {"name": "week2", "type": "directory"}
/// ]
/// ```
pub struct HttpSource {
    transport: HttpTransport,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    name: String,
    #[serde(rename = "type")]
    kind: WireKind,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mtime: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
    File,
    Directory,
}

impl HttpSource {
    pub fn new(base: Url, auth: Arc<dyn AuthProvider>) -> Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(auth)?;
        Ok(Self { transport, base })
    }

    fn url_for(&self, path: &PurePath, directory: bool) -> crate::Result<Url> {
        // The base URL must end in a slash for join() to append to it
        if path.is_root() {
            return Ok(self.base.clone());
        }
        let mut relative = path.parts().join("/");
        if directory {
            relative.push('/');
        }
        self.base.join(&relative).map_err(|e| {
            SyncError::FatalTransport(format!("cannot build URL for {}: {e}", fmt_path(path)))
        })
    }
}

#[async_trait]
impl SourceAdapter for HttpSource {
    async fn list(&self, path: &PurePath) -> crate::Result<Vec<RemoteEntry>> {
        let url = self.url_for(path, true)?;
        let body = self.transport.get_bytes(&url).await?;
        let wire: Vec<WireEntry> = serde_json::from_slice(&body)?;

        Ok(wire
            .into_iter()
            .map(|entry| RemoteEntry {
                name: entry.name,
                kind: match entry.kind {
                    WireKind::File => RemoteKind::File,
                    WireKind::Directory => RemoteKind::Directory,
                },
                size: entry.size,
                mtime: entry.mtime,
            })
            .collect())
    }

    async fn fetch(&self, path: &PurePath) -> crate::Result<Box<dyn ByteStream>> {
        let url = self.url_for(path, false)?;
        let response = self.transport.get(&url, true).await?;
        Ok(Box::new(ResponseStream { response }))
    }
}

struct ResponseStream {
    response: reqwest::Response,
}

#[async_trait]
impl ByteStream for ResponseStream {
    async fn next_chunk(&mut self) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.response.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}
