// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use super::{session_url, CloseCause, ConnectionState, SessionSocket, SocketEvent};
use crate::error::ErrorKind;
use crate::game::MatchStatus;
use crate::identity::{NoIdentity, StaticToken};
use crate::protocol::Outbound;
use crate::test_support::AnyhowExt;

#[test]
fn token_is_appended_as_query_param() -> anyhow::Result<()> {
    let endpoint = Url::parse("ws://localhost:8000/ws")?;
    let url = session_url(&endpoint, "a b&c");
    assert_eq!(url.as_str(), "ws://localhost:8000/ws?token=a+b%26c");
    Ok(())
}

#[test]
fn existing_token_param_is_replaced() -> anyhow::Result<()> {
    let endpoint = Url::parse("wss://duel.example/ws?room=1&token=stale")?;
    let url = session_url(&endpoint, "fresh");
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        pairs,
        vec![("room".to_owned(), "1".to_owned()), ("token".to_owned(), "fresh".to_owned())]
    );
    Ok(())
}

#[tokio::test]
async fn acquire_without_identity_is_an_auth_error() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel(8);
    let mut socket = SessionSocket::new(Url::parse("ws://127.0.0.1:1/ws")?, Arc::new(NoIdentity), tx);

    let err = match socket.acquire().await {
        Ok(_) => anyhow::bail!("acquire should fail without a token"),
        Err(e) => e,
    };
    assert_eq!(err.kind, ErrorKind::Auth);
    assert_eq!(socket.state(), ConnectionState::Absent);
    assert!(socket.handle().is_none());
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn send_without_handle_is_a_transport_error() -> anyhow::Result<()> {
    let (tx, _rx) = mpsc::channel(8);
    let socket = SessionSocket::new(Url::parse("ws://127.0.0.1:1/ws")?, Arc::new(NoIdentity), tx);
    let err = match socket.send(Outbound::Quit {}) {
        Ok(()) => anyhow::bail!("send should fail without a session"),
        Err(e) => e,
    };
    assert_eq!(err.kind, ErrorKind::Transport);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_reports_closed() -> anyhow::Result<()> {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };
    let (tx, mut rx) = mpsc::channel(8);
    let endpoint = Url::parse(&format!("ws://127.0.0.1:{port}/ws"))?;
    let mut socket = SessionSocket::new(endpoint, Arc::new(StaticToken::new("t")), tx)
        .with_connect_timeout(Duration::from_secs(2));

    let handle = socket.acquire().await.anyhow()?;
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await?;
    match event {
        Some(SocketEvent::Closed { session, cause: CloseCause::Unreachable { .. } }) => {
            assert_eq!(session, handle.id());
        }
        other => anyhow::bail!("expected unreachable close, got {other:?}"),
    }
    handle.closed().await;
    socket.reap();
    assert_eq!(socket.state(), ConnectionState::Absent);
    Ok(())
}

#[tokio::test]
async fn release_is_ignored_while_playing() -> anyhow::Result<()> {
    let (tx, _rx) = mpsc::channel(8);
    let mut socket = SessionSocket::new(
        Url::parse("ws://127.0.0.1:1/ws")?,
        Arc::new(StaticToken::new("t")),
        tx,
    )
    .with_connect_timeout(Duration::from_secs(1));

    let handle = socket.acquire().await.anyhow()?;
    socket.release(MatchStatus::Playing);
    assert!(socket.is_current(handle.id()));

    socket.release(MatchStatus::Idle);
    assert!(socket.handle().is_none());
    assert_eq!(socket.state(), ConnectionState::Absent);
    Ok(())
}
