// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity token sources.
//!
//! The session socket only needs "the current token, or nothing". Providers
//! never fail: a missing identity is `None`, and callers decide what that
//! means (for the socket: cannot queue).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Yields the current identity token.
pub trait TokenProvider: Send + Sync {
    /// Return a valid token, or `None` when no identity is established.
    ///
    /// With `force_refresh`, bypass any cache and ask the source again.
    fn token(&self, force_refresh: bool) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;
}

/// A fixed token supplied on the command line.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl TokenProvider for StaticToken {
    fn token(&self, _force_refresh: bool) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        let token = Some(self.token.clone()).filter(|t| !t.is_empty());
        Box::pin(async move { token })
    }
}

/// Token kept in a file by an external sign-in helper.
///
/// The file is read once and cached; a forced refresh re-reads it so the
/// helper can rotate expired tokens.
pub struct FileToken {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cached: Mutex::new(None) }
    }

    async fn read(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim().to_owned();
                if token.is_empty() {
                    debug!(path = %self.path.display(), "token file is empty");
                    None
                } else {
                    Some(token)
                }
            }
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "cannot read token file");
                None
            }
        }
    }
}

impl TokenProvider for FileToken {
    fn token(&self, force_refresh: bool) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let cached = self.cached.lock().clone();
            if let (false, Some(token)) = (force_refresh, cached) {
                return Some(token);
            }
            let token = self.read().await;
            *self.cached.lock() = token.clone();
            token
        })
    }
}

/// No identity at all; queueing is refused.
pub struct NoIdentity;

impl TokenProvider for NoIdentity {
    fn token(&self, _force_refresh: bool) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async { None })
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
