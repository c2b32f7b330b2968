// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session socket against an in-process game server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use trivia_duel::game::MatchStatus;
use trivia_duel::identity::{StaticToken, TokenProvider};
use trivia_duel::protocol::Outbound;
use trivia_duel::socket::{CloseCause, ConnectionState, SessionSocket, SocketEvent};
use trivia_duel::test_support::{AnyhowExt, FakeServer, ScriptedTokens, TEST_TIMEOUT};

async fn next_event(rx: &mut mpsc::Receiver<SocketEvent>) -> anyhow::Result<SocketEvent> {
    tokio::time::timeout(TEST_TIMEOUT, rx.recv())
        .await
        .map_err(|_| anyhow::anyhow!("socket event timeout"))?
        .ok_or_else(|| anyhow::anyhow!("socket event channel closed"))
}

fn socket(
    server: &FakeServer,
    tokens: Arc<dyn TokenProvider>,
) -> anyhow::Result<(SessionSocket, mpsc::Receiver<SocketEvent>)> {
    let (tx, rx) = mpsc::channel(64);
    let socket = SessionSocket::new(server.endpoint()?, tokens, tx)
        .with_connect_timeout(Duration::from_secs(2));
    Ok((socket, rx))
}

#[tokio::test]
async fn acquire_reuses_the_live_handle() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn(&["tok"]).await?;
    let (mut socket, mut events) = socket(&server, Arc::new(StaticToken::new("tok")))?;

    let first = socket.acquire().await.anyhow()?;
    let second = socket.acquire().await.anyhow()?;
    assert_eq!(first, second);

    let _peer = server.accept().await?;
    assert_eq!(next_event(&mut events).await?, SocketEvent::Open { session: first.id() });
    first.opened().await.anyhow()?;

    let third = socket.acquire().await.anyhow()?;
    assert_eq!(third.id(), first.id());
    assert_eq!(socket.state(), ConnectionState::Open);
    assert_eq!(server.attempts(), 1);
    Ok(())
}

#[tokio::test]
async fn release_before_open_aborts_the_attempt() -> anyhow::Result<()> {
    let server = FakeServer::spawn(&["tok"]).await?;
    let (mut socket, mut events) = socket(&server, Arc::new(StaticToken::new("tok")))?;

    let handle = socket.acquire().await.anyhow()?;
    socket.release(MatchStatus::Idle);
    assert!(socket.handle().is_none());

    assert_eq!(
        next_event(&mut events).await?,
        SocketEvent::Closed { session: handle.id(), cause: CloseCause::Local }
    );
    assert_eq!(handle.state(), ConnectionState::Closed);
    assert_eq!(socket.state(), ConnectionState::Absent);
    Ok(())
}

#[tokio::test]
async fn frames_sent_while_connecting_arrive_in_order() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn(&["tok"]).await?;
    let (mut socket, _events) = socket(&server, Arc::new(StaticToken::new("tok")))?;

    socket.acquire().await.anyhow()?;
    assert_eq!(socket.state(), ConnectionState::Connecting);
    socket.send(Outbound::chat("one")).anyhow()?;
    socket.send(Outbound::Answer { choice: 2 }).anyhow()?;
    socket.send(Outbound::chat("three")).anyhow()?;

    let mut peer = server.accept().await?;
    assert_eq!(peer.recv().await?, json!({"type": "chat", "text": "one"}));
    assert_eq!(peer.recv().await?, json!({"type": "answer", "choice": 2}));
    assert_eq!(peer.recv().await?, json!({"type": "chat", "text": "three"}));
    Ok(())
}

#[tokio::test]
async fn rejected_handshake_refreshes_token_once() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn(&["fresh"]).await?;
    let tokens = Arc::new(ScriptedTokens::new(["expired", "fresh"]));
    let (mut socket, mut events) = socket(&server, tokens.clone())?;

    let handle = socket.acquire().await.anyhow()?;
    let peer = server.accept().await?;
    assert_eq!(peer.token, "fresh");
    assert_eq!(next_event(&mut events).await?, SocketEvent::Open { session: handle.id() });
    assert_eq!(tokens.refreshes(), 1);
    assert_eq!(server.tokens_seen(), vec!["expired".to_owned(), "fresh".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn policy_close_before_any_frame_refreshes_token() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn_with(&["fresh"], &["expired"]).await?;
    let tokens = Arc::new(ScriptedTokens::new(["expired", "fresh"]));
    let (mut socket, _events) = socket(&server, tokens.clone())?;

    socket.acquire().await.anyhow()?;
    let peer = server.accept().await?;
    assert_eq!(peer.token, "fresh");
    assert_eq!(tokens.refreshes(), 1);
    Ok(())
}

#[tokio::test]
async fn frames_written_before_policy_close_are_replayed() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn_with(&["fresh"], &["expired"]).await?;
    let tokens = Arc::new(ScriptedTokens::new(["expired", "fresh"]));
    let (mut socket, _events) = socket(&server, tokens.clone())?;

    socket.acquire().await.anyhow()?;
    socket.send(Outbound::chat("one")).anyhow()?;
    socket.send(Outbound::Answer { choice: 1 }).anyhow()?;

    let mut peer = server.accept().await?;
    assert_eq!(peer.token, "fresh");
    assert_eq!(peer.recv().await?, json!({"type": "chat", "text": "one"}));
    assert_eq!(peer.recv().await?, json!({"type": "answer", "choice": 1}));

    // Nothing is sent twice on the accepted connection.
    socket.send(Outbound::chat("two")).anyhow()?;
    assert_eq!(peer.recv().await?, json!({"type": "chat", "text": "two"}));
    assert_eq!(tokens.refreshes(), 1);
    Ok(())
}

#[tokio::test]
async fn second_rejection_gives_up() -> anyhow::Result<()> {
    let server = FakeServer::spawn(&["never-issued"]).await?;
    let tokens = Arc::new(ScriptedTokens::new(["expired", "still-expired", "unused"]));
    let (mut socket, mut events) = socket(&server, tokens.clone())?;

    let handle = socket.acquire().await.anyhow()?;
    assert_eq!(
        next_event(&mut events).await?,
        SocketEvent::Closed { session: handle.id(), cause: CloseCause::AuthRejected }
    );
    assert_eq!(tokens.refreshes(), 1);
    assert_eq!(server.attempts(), 2);
    Ok(())
}

#[tokio::test]
async fn remote_close_is_reported_and_reaped() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn(&["tok"]).await?;
    let (mut socket, mut events) = socket(&server, Arc::new(StaticToken::new("tok")))?;

    let handle = socket.acquire().await.anyhow()?;
    let peer = server.accept().await?;
    assert_eq!(next_event(&mut events).await?, SocketEvent::Open { session: handle.id() });
    peer.send(json!({"type": "queue"}))?;
    assert!(matches!(next_event(&mut events).await?, SocketEvent::Frame { .. }));

    peer.close(1000, "server restart")?;
    assert_eq!(
        next_event(&mut events).await?,
        SocketEvent::Closed {
            session: handle.id(),
            cause: CloseCause::Remote { reason: "server restart".to_owned() },
        }
    );

    // A closed handle is replaced on the next acquire.
    let next = socket.acquire().await.anyhow()?;
    assert_ne!(next.id(), handle.id());
    assert!(!socket.is_current(handle.id()));
    let _second_peer = server.accept().await?;
    Ok(())
}

#[tokio::test]
async fn close_while_open_notifies_server() -> anyhow::Result<()> {
    let mut server = FakeServer::spawn(&["tok"]).await?;
    let (mut socket, mut events) = socket(&server, Arc::new(StaticToken::new("tok")))?;

    let handle = socket.acquire().await.anyhow()?;
    let mut peer = server.accept().await?;
    handle.opened().await.anyhow()?;

    socket.send(Outbound::Quit {}).anyhow()?;
    socket.close();
    assert_eq!(peer.recv().await?, json!({"type": "quit"}));
    peer.closed().await?;

    assert_eq!(next_event(&mut events).await?, SocketEvent::Open { session: handle.id() });
    assert_eq!(
        next_event(&mut events).await?,
        SocketEvent::Closed { session: handle.id(), cause: CloseCause::Local }
    );
    Ok(())
}
