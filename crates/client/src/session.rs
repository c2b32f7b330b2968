// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session loop: ties the socket, the codec and the match state machine
//! together.
//!
//! All match state lives in the [`MatchSession`] task. Intents from the
//! front-end and socket events are serialized by one `select!` loop, fed
//! through [`reduce`], and the results fanned out: outbound frames to the
//! socket, snapshots on a `watch` channel, notices on a `broadcast` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::game::{reduce, Event, MatchState, MatchStatus, Notice, Step};
use crate::identity::TokenProvider;
use crate::protocol::{decode, Decoded, Outbound};
use crate::socket::{CloseCause, ConnectionState, SessionSocket, SocketEvent};

/// Something the player asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Queue,
    /// Zero-based choice for the current question.
    Submit(u32),
    Leave,
    Reset,
    Chat(String),
}

/// Tuning for a [`MatchSession`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    /// Client ping interval; zero disables it.
    pub keepalive: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { connect_timeout: Duration::from_secs(10), keepalive: Duration::ZERO }
    }
}

/// Owns the connection and the match state for one player.
pub struct MatchSession {
    socket: SessionSocket,
    socket_rx: mpsc::Receiver<SocketEvent>,
    state: MatchState,
    state_tx: watch::Sender<MatchState>,
    notice_tx: broadcast::Sender<Notice>,
    keepalive: Duration,
    next_ping: u64,
}

impl MatchSession {
    pub fn new(endpoint: Url, tokens: Arc<dyn TokenProvider>, opts: SessionOptions) -> Self {
        let (socket_tx, socket_rx) = mpsc::channel(256);
        let socket = SessionSocket::new(endpoint, tokens, socket_tx)
            .with_connect_timeout(opts.connect_timeout);
        let (state_tx, _) = watch::channel(MatchState::default());
        let (notice_tx, _) = broadcast::channel(256);
        Self {
            socket,
            socket_rx,
            state: MatchState::default(),
            state_tx,
            notice_tx,
            keepalive: opts.keepalive,
            next_ping: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<MatchState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Run until `shutdown` fires or the intent channel closes.
    pub async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut keepalive = (!self.keepalive.is_zero()).then(|| {
            let mut interval = tokio::time::interval(self.keepalive);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                intent = intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent).await,
                    None => break,
                },
                Some(event) = self.socket_rx.recv() => self.handle_socket_event(event),
                _ = tick(&mut keepalive) => self.keepalive_ping(),
            }
        }

        self.socket.close();
        info!(status = %self.state.status, "match session stopped");
        Ok(())
    }

    async fn handle_intent(&mut self, intent: Intent) {
        debug!(?intent, status = %self.state.status, "intent");
        match intent {
            Intent::Queue => {
                if self.state.status != MatchStatus::Idle {
                    debug!(status = %self.state.status, "queue ignored outside idle");
                    return;
                }
                if let Err(e) = self.socket.acquire().await {
                    warn!(err = %e, "cannot queue");
                    self.publish(Notice::CannotQueue { reason: e.message });
                    return;
                }
                self.apply(Event::QueueIntent);
            }
            Intent::Submit(choice) => self.apply(Event::Submit(choice)),
            Intent::Leave => {
                self.apply(Event::Leave);
                self.socket.close();
            }
            Intent::Reset => {
                self.apply(Event::Reset);
                if self.state.status == MatchStatus::Idle {
                    self.socket.close();
                }
            }
            Intent::Chat(text) => {
                if let Err(e) = self.socket.send(Outbound::chat(&text)) {
                    warn!(err = %e, "chat not sent");
                }
            }
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open { session } => {
                debug!(session, "socket open");
            }
            SocketEvent::Frame { session, text } => {
                if !self.socket.is_current(session) {
                    debug!(session, "frame from stale connection ignored");
                    return;
                }
                match decode(&text) {
                    Decoded::Frame(frame) => {
                        debug!(session, frame = frame.label(), "frame received");
                        self.apply(Event::Frame(frame));
                    }
                    Decoded::Ignored { kind } => debug!(session, %kind, "unknown frame ignored"),
                    Decoded::Malformed { reason } => warn!(session, %reason, "malformed frame dropped"),
                }
            }
            SocketEvent::Closed { session, cause } => {
                if !self.socket.is_current(session) {
                    debug!(session, %cause, "close of stale connection ignored");
                    return;
                }
                self.socket.reap();
                if cause == CloseCause::Local {
                    return;
                }
                self.connection_lost(cause);
            }
        }
    }

    fn connection_lost(&mut self, cause: CloseCause) {
        let refused = self.state.status == MatchStatus::Queueing
            && matches!(cause, CloseCause::AuthRejected | CloseCause::Unreachable { .. });
        let reason = cause.to_string();
        let mut step = reduce(&self.state, Event::TransportLost { reason: reason.clone() });
        if refused {
            step.notices = vec![Notice::CannotQueue { reason }];
        }
        self.commit(step);
    }

    fn keepalive_ping(&mut self) {
        if self.socket.state() != ConnectionState::Open {
            return;
        }
        self.next_ping += 1;
        if let Err(e) = self.socket.send(Outbound::Ping { id: self.next_ping }) {
            debug!(err = %e, "keepalive ping not sent");
        }
    }

    fn apply(&mut self, event: Event) {
        let step = reduce(&self.state, event);
        self.commit(step);
    }

    fn commit(&mut self, step: Step) {
        let Step { state, outbound, notices } = step;
        for frame in outbound {
            if let Err(e) = self.socket.send(frame) {
                warn!(err = %e, "outbound frame not sent");
            }
        }

        let from = self.state.status;
        self.state = state;
        if from != self.state.status {
            info!(%from, to = %self.state.status, "match status changed");
        }
        self.state_tx.send_replace(self.state.clone());
        for notice in notices {
            self.publish(notice);
        }

        if self.state.status == MatchStatus::Ended {
            self.socket.release(self.state.status);
        }
    }

    fn publish(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notice_tx.send(notice);
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
