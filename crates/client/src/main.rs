// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use trivia_duel::config::Config;
use trivia_duel::play::{self, PlayOptions};
use trivia_duel::session::MatchSession;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Exit explicitly: a pending stdin read would otherwise hold the runtime open.
    match run(config).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("fatal: {e:#}");
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // Stdout belongs to the game; logs go to stderr.
    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let session = MatchSession::new(config.endpoint()?, config.token_provider(), config.session_options());
    let notices = session.subscribe();
    let (intent_tx, intent_rx) = mpsc::channel(64);

    let session_task = tokio::spawn(session.run(intent_rx, shutdown.clone()));

    let opts = PlayOptions { player_id: config.player_id.clone(), auto_requeue: config.auto_requeue };
    let printer = tokio::spawn(play::print_notices(notices, intent_tx.clone(), opts, tokio::io::stdout()));

    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT");
                }
                _ = sd.cancelled() => return,
            }
            sd.cancel();
        });
    }

    println!("{}", play::HELP);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    play::read_commands(stdin, intent_tx, shutdown.clone()).await?;

    shutdown.cancel();
    session_task.await??;
    // The session dropped the notice sender; the printer drains and stops.
    printer.await??;
    Ok(())
}
