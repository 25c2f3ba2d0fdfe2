//! Credential providers
//!
//! Sources that need authentication get their credentials through an
//! [`AuthProvider`]. When a source notices its session died it calls
//! [`AuthProvider::invalidate`]; a provider that cannot produce fresh
//! credentials after that reports [`SyncError::AuthExpired`], which is fatal
//! for the run.

use crate::SyncError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// A username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Hands out credentials for a source
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns credentials to authenticate with.
    async fn credentials(&self) -> crate::Result<Credentials>;

    /// Tells the provider its last credentials were rejected.
    fn invalidate(&self);
}

/// Fixed credentials from the configuration.
///
/// Static credentials can't be refreshed, so once they are rejected every
/// further request fails with [`SyncError::AuthExpired`].
pub struct StaticAuth {
    credentials: Credentials,
    invalidated: AtomicBool,
}

impl StaticAuth {
    pub fn new(username: String, password: String) -> Self {
        Self {
            credentials: Credentials { username, password },
            invalidated: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn credentials(&self) -> crate::Result<Credentials> {
        if self.invalidated.load(Ordering::Acquire) {
            return Err(SyncError::AuthExpired);
        }
        Ok(self.credentials.clone())
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }
}
