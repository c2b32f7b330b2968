// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single duplex connection to the game server.
//!
//! [`SessionSocket`] owns at most one live [`SessionHandle`]. Acquiring while
//! a handle is connecting or open hands back the same one, so a match survives
//! the front-end moving between screens. Each handle is backed by a
//! background task (see `conn.rs`) that owns the WebSocket stream; it is the
//! only writer of the handle's [`ConnectionState`] and reports frames and
//! closure on the socket event channel.

mod conn;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;
use crate::game::MatchStatus;
use crate::identity::TokenProvider;
use crate::protocol::Outbound;

use conn::Connection;

/// Lifecycle of the transport behind a [`SessionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Absent,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// Released or closed by this client.
    Local,
    /// The server closed the channel.
    Remote { reason: String },
    /// The server rejected the token, also after one forced refresh.
    AuthRejected,
    /// The server could not be reached.
    Unreachable { reason: String },
    /// Read or write failure on an open channel.
    Error { reason: String },
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::Remote { reason } => write!(f, "server closed the connection: {reason}"),
            Self::AuthRejected => f.write_str("identity token rejected"),
            Self::Unreachable { reason } => write!(f, "server unreachable: {reason}"),
            Self::Error { reason } => write!(f, "connection error: {reason}"),
        }
    }
}

/// Reported by connection tasks. `session` is the handle id, so events from
/// a connection that has since been replaced can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open { session: u64 },
    Frame { session: u64, text: String },
    Closed { session: u64, cause: CloseCause },
}

/// Shared reference to one logical connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Connecting or open.
    pub fn is_live(&self) -> bool {
        matches!(self.state(), ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Queue a frame. Frames queued before the socket opens are sent, in
    /// order, once it does.
    pub fn send(&self, frame: Outbound) -> Result<(), ClientError> {
        let label = frame.label();
        self.outbound
            .send(frame)
            .map_err(|_| ClientError::transport(format!("connection {} is gone", self.id)))?;
        debug!(session = self.id, frame = label, "frame queued");
        Ok(())
    }

    /// Wait until the connection reaches `Open`. Errors if it closes first.
    pub async fn opened(&self) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Closed))
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Closed);
        match reached {
            ConnectionState::Open => Ok(()),
            _ => Err(ClientError::transport(format!("connection {} closed before opening", self.id))),
        }
    }

    /// Wait until the connection task has finished.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionHandle {}

/// Connection manager: the only place a [`SessionHandle`] is created.
pub struct SessionSocket {
    endpoint: Url,
    tokens: Arc<dyn TokenProvider>,
    events: mpsc::Sender<SocketEvent>,
    connect_timeout: Duration,
    current: Option<SessionHandle>,
    next_id: u64,
}

impl SessionSocket {
    pub fn new(
        endpoint: Url,
        tokens: Arc<dyn TokenProvider>,
        events: mpsc::Sender<SocketEvent>,
    ) -> Self {
        Self {
            endpoint,
            tokens,
            events,
            connect_timeout: Duration::from_secs(10),
            current: None,
            next_id: 0,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Return the live handle, or open a new connection.
    ///
    /// Fails with an `Auth` error when no identity token is available; no
    /// connection is attempted in that case.
    pub async fn acquire(&mut self) -> Result<SessionHandle, ClientError> {
        self.reap();
        if let Some(handle) = &self.current {
            if handle.is_live() {
                debug!(session = handle.id, state = %handle.state(), "reusing session");
                return Ok(handle.clone());
            }
            // Still closing: let it finish so two sockets never overlap.
            let closing = handle.clone();
            if tokio::time::timeout(self.connect_timeout, closing.closed()).await.is_err() {
                warn!(session = closing.id, "previous connection did not close in time");
            }
            self.current = None;
        }

        let Some(token) = self.tokens.token(false).await else {
            return Err(ClientError::auth("no identity token available"));
        };

        self.next_id += 1;
        let id = self.next_id;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let conn = Connection {
            id,
            endpoint: self.endpoint.clone(),
            token,
            tokens: Arc::clone(&self.tokens),
            events: self.events.clone(),
            state: state_tx,
            outbound: outbound_rx,
            cancel: cancel.clone(),
            connect_timeout: self.connect_timeout,
        };
        tokio::spawn(conn.run());
        info!(session = id, endpoint = %redacted(&self.endpoint), "connecting");

        let handle = SessionHandle { id, state: state_rx, outbound: outbound_tx, cancel };
        self.current = Some(handle.clone());
        Ok(handle)
    }

    /// Drop the connection unless a match is running on it.
    ///
    /// Releasing before the socket opened aborts the attempt.
    pub fn release(&mut self, status: MatchStatus) {
        if status == MatchStatus::Playing {
            debug!("release skipped: match in progress");
            return;
        }
        self.close();
    }

    /// Close the connection regardless of match status.
    pub fn close(&mut self) {
        if let Some(handle) = self.current.take() {
            info!(session = handle.id, state = %handle.state(), "closing session");
            handle.cancel.cancel();
        }
    }

    /// Queue a frame on the live connection.
    pub fn send(&self, frame: Outbound) -> Result<(), ClientError> {
        match &self.current {
            Some(handle) if handle.is_live() => handle.send(frame),
            _ => Err(ClientError::transport(format!("no live session for {}", frame.label()))),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.current.as_ref().map_or(ConnectionState::Absent, SessionHandle::state)
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// Whether `session` is the handle currently installed.
    pub fn is_current(&self, session: u64) -> bool {
        self.current.as_ref().is_some_and(|h| h.id == session)
    }

    /// Forget a handle whose connection has already closed.
    pub fn reap(&mut self) {
        if self.current.as_ref().is_some_and(|h| h.state() == ConnectionState::Closed) {
            if let Some(handle) = self.current.take() {
                debug!(session = handle.id, "reaped closed session");
            }
        }
    }
}

impl Drop for SessionSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Endpoint with the token credential attached as a query parameter.
///
/// Any `token` already present on the endpoint is replaced.
pub fn session_url(endpoint: &Url, token: &str) -> Url {
    let kept: Vec<(String, String)> = endpoint
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut url = endpoint.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query.append_pair("token", token);
    }
    url
}

/// Endpoint for logs, without query credentials.
fn redacted(endpoint: &Url) -> String {
    let mut url = endpoint.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
