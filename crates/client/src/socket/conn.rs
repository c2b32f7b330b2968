// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{session_url, CloseCause, ConnectionState, SocketEvent};
use crate::identity::TokenProvider;
use crate::protocol::{encode, Outbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close codes treated as a token rejection when they arrive before any frame.
const AUTH_CLOSE_CODES: [u16; 3] = [1008, 4001, 4003];

/// Background task behind one [`super::SessionHandle`].
pub(super) struct Connection {
    pub(super) id: u64,
    pub(super) endpoint: Url,
    pub(super) token: String,
    pub(super) tokens: Arc<dyn TokenProvider>,
    pub(super) events: mpsc::Sender<SocketEvent>,
    pub(super) state: watch::Sender<ConnectionState>,
    pub(super) outbound: mpsc::UnboundedReceiver<Outbound>,
    pub(super) cancel: CancellationToken,
    pub(super) connect_timeout: Duration,
}

enum Pumped {
    /// Server closed with an auth code before sending anything. Carries the
    /// frames written to the rejected connection, for replay.
    RejectedEarly(Vec<Outbound>),
    Done(CloseCause),
}

impl Connection {
    pub(super) async fn run(mut self) {
        let cause = self.drive().await;
        self.state.send_replace(ConnectionState::Closed);
        info!(session = self.id, %cause, "connection closed");
        let _ = self.events.send(SocketEvent::Closed { session: self.id, cause }).await;
    }

    async fn drive(&mut self) -> CloseCause {
        let mut token = self.token.clone();
        let mut refreshed = false;
        let mut replay = Vec::new();
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            let url = session_url(&self.endpoint, &token);
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return CloseCause::Local,
                r = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url.as_str())) => r,
            };
            match attempt {
                Err(_) => {
                    return CloseCause::Unreachable { reason: "connect timed out".to_owned() };
                }
                Ok(Err(e)) if is_auth_rejection(&e) => {}
                Ok(Err(e)) => return CloseCause::Unreachable { reason: e.to_string() },
                Ok(Ok((stream, _response))) => {
                    match self.pump(stream, std::mem::take(&mut replay)).await {
                        Pumped::RejectedEarly(unconfirmed) => replay = unconfirmed,
                        Pumped::Done(cause) => return cause,
                    }
                }
            }

            // Rejected: one forced refresh, then give up.
            if refreshed {
                return CloseCause::AuthRejected;
            }
            refreshed = true;
            warn!(session = self.id, "token rejected, refreshing once");
            match self.tokens.token(true).await {
                Some(fresh) => token = fresh,
                None => return CloseCause::AuthRejected,
            }
        }
    }

    /// Run one open connection. `replay` goes out before anything queued.
    async fn pump(&mut self, stream: WsStream, replay: Vec<Outbound>) -> Pumped {
        let (mut ws_tx, mut ws_rx) = stream.split();
        self.state.send_replace(ConnectionState::Open);
        info!(session = self.id, "connection open");
        if self.events.send(SocketEvent::Open { session: self.id }).await.is_err() {
            return Pumped::Done(CloseCause::Local);
        }

        // Frames written before the server said anything; an early auth
        // close sends them back to `drive` instead of dropping them.
        let mut unconfirmed = Vec::new();
        for frame in replay {
            let Ok(text) = encode(&frame) else { continue };
            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                return Pumped::Done(CloseCause::Error { reason: e.to_string() });
            }
            debug!(session = self.id, frame = frame.label(), "frame replayed");
            unconfirmed.push(frame);
        }

        let mut received_any = false;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.state.send_replace(ConnectionState::Closing);
                    // Flush what was queued before the close (a final quit).
                    while let Ok(frame) = self.outbound.try_recv() {
                        if let Ok(text) = encode(&frame) {
                            let _ = ws_tx.send(Message::Text(text.into())).await;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Pumped::Done(CloseCause::Local);
                }
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        received_any = true;
                        unconfirmed.clear();
                        let frame = SocketEvent::Frame { session: self.id, text: text.to_string() };
                        if self.events.send(frame).await.is_err() {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            return Pumped::Done(CloseCause::Local);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        if !received_any && code.is_some_and(|c| AUTH_CLOSE_CODES.contains(&c)) {
                            return Pumped::RejectedEarly(unconfirmed);
                        }
                        let reason = match frame {
                            Some(f) if !f.reason.is_empty() => f.reason.to_string(),
                            Some(f) => format!("code {}", u16::from(f.code)),
                            None => "closed".to_owned(),
                        };
                        return Pumped::Done(CloseCause::Remote { reason });
                    }
                    // Control frames are answered by tungstenite; binary is not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Pumped::Done(CloseCause::Error { reason: e.to_string() }),
                    None => return Pumped::Done(CloseCause::Remote { reason: "stream ended".to_owned() }),
                },
                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        self.state.send_replace(ConnectionState::Closing);
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return Pumped::Done(CloseCause::Local);
                    };
                    let text = match encode(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(session = self.id, err = %e, "dropping unencodable frame");
                            continue;
                        }
                    };
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        return Pumped::Done(CloseCause::Error { reason: e.to_string() });
                    }
                    debug!(session = self.id, frame = frame.label(), "frame sent");
                    if !received_any {
                        unconfirmed.push(frame);
                    }
                }
            }
        }
    }
}

fn is_auth_rejection(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Http(resp) if matches!(resp.status().as_u16(), 401 | 403))
}
