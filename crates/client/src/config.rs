// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::identity::{FileToken, NoIdentity, StaticToken, TokenProvider};
use crate::session::SessionOptions;

/// Terminal client for real-time two-player trivia duels.
#[derive(Debug, Parser)]
#[command(name = "trivia-duel", version, about)]
pub struct Config {
    /// Game server WebSocket endpoint.
    #[arg(long, env = "DUEL_URL", default_value = "ws://127.0.0.1:8000/ws")]
    pub url: String,

    /// Identity token sent when connecting.
    #[arg(long, env = "DUEL_TOKEN")]
    pub token: Option<String>,

    /// File holding the identity token; re-read when the server rejects it.
    #[arg(long, env = "DUEL_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Own player id, used to tell a win from a loss.
    #[arg(long, env = "DUEL_PLAYER_ID")]
    pub player_id: Option<String>,

    /// Reset and queue again after each match.
    #[arg(long, env = "DUEL_AUTO_REQUEUE")]
    pub auto_requeue: bool,

    /// Log format (json or text).
    #[arg(long, env = "DUEL_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DUEL_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    // -- Duration overrides (skip from CLI; set in Config::test()) --------
    #[clap(skip)]
    pub connect_timeout_ms: Option<u64>,
    /// Client ping interval in ms (0 = disabled).
    #[clap(skip)]
    pub keepalive_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.endpoint()?;

        if self.token.is_some() && self.token_file.is_some() {
            anyhow::bail!("cannot specify both --token and --token-file");
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        if self.connect_timeout().is_zero() {
            anyhow::bail!("connect timeout must be non-zero");
        }

        Ok(())
    }

    /// Parsed server endpoint; only `ws` and `wss` are accepted.
    pub fn endpoint(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.url).map_err(|e| anyhow::anyhow!("invalid --url {}: {e}", self.url))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => anyhow::bail!("unsupported url scheme: {other} (expected ws or wss)"),
        }
    }

    /// Token source selected by the flags; no flag means no identity.
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        match (&self.token, &self.token_file) {
            (Some(token), _) => Arc::new(StaticToken::new(token.clone())),
            (None, Some(path)) => Arc::new(FileToken::new(path.clone())),
            (None, None) => Arc::new(NoIdentity),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions { connect_timeout: self.connect_timeout(), keepalive: self.keepalive() }
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(connect_timeout, connect_timeout_ms, "DUEL_CONNECT_TIMEOUT_MS", 10_000);
    duration_field!(keepalive, keepalive_ms, "DUEL_KEEPALIVE_MS", 0);

    /// Build a minimal `Config` for tests (local endpoint, static token).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            url: "ws://127.0.0.1:0/ws".into(),
            token: Some("test-token".into()),
            token_file: None,
            player_id: Some("A".into()),
            auto_requeue: false,
            log_format: "json".into(),
            log_level: "debug".into(),
            connect_timeout_ms: Some(1_000),
            keepalive_ms: Some(0),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
