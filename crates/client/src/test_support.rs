// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted game server, token stubs, and
//! assertion helpers.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use url::Url;

use crate::identity::TokenProvider;

/// Default wait for anything a test expects to happen.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Token provider that walks a fixed list: the cached token is the current
/// entry, and each forced refresh advances to the next one.
pub struct ScriptedTokens {
    tokens: Vec<String>,
    index: AtomicUsize,
    calls: AtomicU32,
    refreshes: AtomicU32,
}

impl ScriptedTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            index: AtomicUsize::new(0),
            calls: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl TokenProvider for ScriptedTokens {
    fn token(&self, force_refresh: bool) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let index = if force_refresh {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
            self.index.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.index.load(Ordering::Relaxed)
        };
        let token = self.tokens.get(index).cloned();
        Box::pin(async move { token })
    }
}

/// Something the scripted server pushes to the client.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    Json(serde_json::Value),
    Close { code: u16, reason: String },
}

/// Server side of one accepted client connection.
pub struct ServerPeer {
    pub token: String,
    to_client: mpsc::UnboundedSender<ServerFrame>,
    from_client: mpsc::UnboundedReceiver<serde_json::Value>,
}

impl ServerPeer {
    pub fn send(&self, value: serde_json::Value) -> anyhow::Result<()> {
        self.to_client
            .send(ServerFrame::Json(value))
            .map_err(|_| anyhow::anyhow!("peer connection is gone"))
    }

    pub fn close(&self, code: u16, reason: &str) -> anyhow::Result<()> {
        self.to_client
            .send(ServerFrame::Close { code, reason: reason.to_owned() })
            .map_err(|_| anyhow::anyhow!("peer connection is gone"))
    }

    /// Next JSON frame the client sent.
    pub async fn recv(&mut self) -> anyhow::Result<serde_json::Value> {
        tokio::time::timeout(TEST_TIMEOUT, self.from_client.recv())
            .await
            .map_err(|_| anyhow::anyhow!("peer recv timeout"))?
            .ok_or_else(|| anyhow::anyhow!("client disconnected"))
    }

    /// Next client frame whose `type` is `kind`, skipping others.
    pub async fn recv_type(&mut self, kind: &str) -> anyhow::Result<serde_json::Value> {
        loop {
            let frame = self.recv().await?;
            if frame.get("type").and_then(|t| t.as_str()) == Some(kind) {
                return Ok(frame);
            }
        }
    }

    /// Wait for the client to disconnect. Frames still in flight are dropped.
    pub async fn closed(&mut self) -> anyhow::Result<()> {
        tokio::time::timeout(TEST_TIMEOUT, async {
            while self.from_client.recv().await.is_some() {}
        })
        .await
        .map_err(|_| anyhow::anyhow!("client did not disconnect"))
    }
}

struct FakeState {
    valid: Vec<String>,
    policy_close: Vec<String>,
    peers: mpsc::UnboundedSender<ServerPeer>,
    attempts: AtomicU32,
    seen: Mutex<Vec<String>>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// In-process game server on a random port.
///
/// Tokens in `valid` are upgraded and handed to the test as [`ServerPeer`]s.
/// Tokens passed as `close_on_open` to [`FakeServer::spawn_with`] are upgraded
/// and then closed with code 4001. Anything else gets HTTP 401.
pub struct FakeServer {
    pub addr: std::net::SocketAddr,
    state: Arc<FakeState>,
    peers: mpsc::UnboundedReceiver<ServerPeer>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeServer {
    pub async fn spawn(valid: &[&str]) -> anyhow::Result<Self> {
        Self::spawn_with(valid, &[]).await
    }

    pub async fn spawn_with(valid: &[&str], close_on_open: &[&str]) -> anyhow::Result<Self> {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let state = Arc::new(FakeState {
            valid: valid.iter().map(|s| (*s).to_owned()).collect(),
            policy_close: close_on_open.iter().map(|s| (*s).to_owned()).collect(),
            peers: peers_tx,
            attempts: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let router = Router::new().route("/ws", get(fake_ws)).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, state, peers: peers_rx, handle })
    }

    pub fn endpoint(&self) -> anyhow::Result<Url> {
        Ok(Url::parse(&format!("ws://{}/ws", self.addr))?)
    }

    /// Next accepted connection.
    pub async fn accept(&mut self) -> anyhow::Result<ServerPeer> {
        tokio::time::timeout(TEST_TIMEOUT, self.peers.recv())
            .await
            .map_err(|_| anyhow::anyhow!("no connection accepted"))?
            .ok_or_else(|| anyhow::anyhow!("server stopped"))
    }

    /// Number of upgrade requests seen, accepted or not.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::Relaxed)
    }

    /// Tokens presented, in order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.state.seen.lock().clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn fake_ws(
    State(state): State<Arc<FakeState>>,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    state.attempts.fetch_add(1, Ordering::Relaxed);
    let token = query.token.unwrap_or_default();
    state.seen.lock().push(token.clone());

    if state.policy_close.contains(&token) {
        return ws
            .on_upgrade(|mut socket| async move {
                let frame = CloseFrame { code: 4001, reason: Utf8Bytes::from_static("invalid token") };
                let _ = socket.send(Message::Close(Some(frame))).await;
                // Read until the client hangs up so its frames are not reset away.
                while let Some(Ok(_)) = socket.recv().await {}
            })
            .into_response();
    }
    if !state.valid.contains(&token) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let peers = state.peers.clone();
    ws.on_upgrade(move |socket| serve_peer(socket, token, peers)).into_response()
}

async fn serve_peer(socket: WebSocket, token: String, peers: mpsc::UnboundedSender<ServerPeer>) {
    let (to_client_tx, mut to_client_rx) = mpsc::unbounded_channel();
    let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
    let peer = ServerPeer { token, to_client: to_client_tx, from_client: from_client_rx };
    if peers.send(peer).is_err() {
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            frame = to_client_rx.recv() => match frame {
                Some(ServerFrame::Json(value)) => {
                    if ws_tx.send(Message::Text(value.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Some(ServerFrame::Close { code, reason }) => {
                    let frame = CloseFrame { code, reason: reason.into() };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str(text.as_str()) {
                        let _ = from_client_tx.send(value);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Server game frame: `{"type": "game", "message": .., "extra": ..}`.
pub fn game_frame(message: &str, extra: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"type": "game", "message": message, "extra": extra})
}
