// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::Config;
use crate::identity::TokenProvider;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&["trivia-duel", "--token", "t"]);
    config.validate()?;
    assert_eq!(config.endpoint()?.as_str(), "ws://127.0.0.1:8000/ws");
    assert_eq!(config.log_format, "text");
    assert!(!config.auto_requeue);
    Ok(())
}

#[test]
fn wss_endpoint_with_token_file() -> anyhow::Result<()> {
    let config = parse(&[
        "trivia-duel",
        "--url",
        "wss://duel.example/ws",
        "--token-file",
        "/tmp/duel-token",
        "--auto-requeue",
    ]);
    config.validate()?;
    assert_eq!(config.endpoint()?.scheme(), "wss");
    assert!(config.auto_requeue);
    Ok(())
}

#[yare::parameterized(
    bad_url      = { &["trivia-duel", "--url", "not a url"], "invalid --url" },
    http_scheme  = { &["trivia-duel", "--url", "http://localhost/ws"], "unsupported url scheme" },
    both_tokens  = { &["trivia-duel", "--token", "t", "--token-file", "/tmp/t"], "cannot specify both" },
    bad_format   = { &["trivia-duel", "--log-format", "yaml"], "invalid log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[tokio::test]
async fn token_provider_follows_flags() -> anyhow::Result<()> {
    let with_token = parse(&["trivia-duel", "--token", "abc"]);
    assert_eq!(with_token.token_provider().token(false).await.as_deref(), Some("abc"));

    let without = parse(&["trivia-duel"]);
    assert_eq!(without.token_provider().token(false).await, None);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("token");
    std::fs::write(&path, "from-file\n")?;
    let from_file = Config { token_file: Some(path), ..Config::test() };
    let from_file = Config { token: None, ..from_file };
    assert_eq!(from_file.token_provider().token(false).await.as_deref(), Some("from-file"));
    Ok(())
}

#[test]
fn test_config_overrides_durations() -> anyhow::Result<()> {
    let config = Config::test();
    config.validate()?;
    let opts = config.session_options();
    assert_eq!(opts.connect_timeout, Duration::from_secs(1));
    assert_eq!(opts.keepalive, Duration::ZERO);
    Ok(())
}

#[test]
#[serial_test::serial]
fn duration_falls_back_to_env_then_default() {
    let config = Config { keepalive_ms: None, connect_timeout_ms: None, ..Config::test() };

    std::env::remove_var("DUEL_KEEPALIVE_MS");
    assert_eq!(config.keepalive(), Duration::ZERO);
    assert_eq!(config.connect_timeout(), Duration::from_secs(10));

    std::env::set_var("DUEL_KEEPALIVE_MS", "2500");
    assert_eq!(config.keepalive(), Duration::from_millis(2500));
    std::env::remove_var("DUEL_KEEPALIVE_MS");
}

#[test]
fn zero_connect_timeout_is_rejected() {
    let config = Config { connect_timeout_ms: Some(0), ..Config::test() };
    crate::assert_err_contains!(config.validate(), "connect timeout");
}
