// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented terminal front-end: stdin commands in, notices out.

use std::fmt::Write as _;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::game::{EndResult, Notice, Outcome, QuestionState, RoundOutcome};
use crate::session::Intent;

pub const HELP: &str = "\
commands:
  q, queue      find an opponent
  1..n          answer the current question
  chat <text>   message your opponent
  leave         abandon the queue or match
  reset         back to the lobby after a match
  help          this text
  exit          quit the client";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    Help,
    Exit,
}

/// Parse a stdin line. Blank lines are `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word.to_lowercase().as_str() {
        "" => return Ok(None),
        "q" | "queue" => Command::Intent(Intent::Queue),
        "leave" => Command::Intent(Intent::Leave),
        "reset" => Command::Intent(Intent::Reset),
        "help" | "?" => Command::Help,
        "exit" => Command::Exit,
        "chat" => {
            if rest.is_empty() {
                anyhow::bail!("chat needs a message");
            }
            Command::Intent(Intent::Chat(rest.to_owned()))
        }
        other => match other.parse::<u32>() {
            Ok(0) => anyhow::bail!("choices are numbered from 1"),
            Ok(n) => Command::Intent(Intent::Submit(n - 1)),
            Err(_) => anyhow::bail!("unknown command: {other} (try help)"),
        },
    };
    Ok(Some(command))
}

/// Human-readable text for a notice. `player_id` decides win or loss.
pub fn render_notice(notice: &Notice, player_id: Option<&str>) -> String {
    match notice {
        Notice::Searching => "Searching for an opponent...".to_owned(),
        Notice::Paired { session_id: Some(id) } => format!("Opponent found (match {id})"),
        Notice::Paired { session_id: None } => "Opponent found".to_owned(),
        Notice::MatchStarted => "Match started".to_owned(),
        Notice::Question(q) => render_question(q),
        Notice::Answered { choice } => format!("Answer {} locked in", choice + 1),
        Notice::Revealed(round) => render_round(round),
        Notice::Ended(end) => render_end(end, player_id),
        Notice::ConnectionLost { reason, forfeited: true } => {
            format!("Connection lost: {reason}. The match is forfeited.")
        }
        Notice::ConnectionLost { reason, forfeited: false } => format!("Connection lost: {reason}"),
        Notice::CannotQueue { reason } => format!("Cannot queue: {reason}"),
        Notice::Left => "You left".to_owned(),
        Notice::Chat { from: Some(from), text } => format!("[{from}] {text}"),
        Notice::Chat { from: None, text } => format!("[?] {text}"),
        Notice::ServerError { message } => format!("Server error: {message}"),
    }
}

fn render_question(q: &QuestionState) -> String {
    let mut out = format!("Q{}: {} ({}s)", q.index + 1, q.prompt, q.timeout_secs);
    for (i, choice) in q.choices.iter().enumerate() {
        let _ = write!(out, "\n  {}) {choice}", i + 1);
    }
    out
}

fn render_round(round: &RoundOutcome) -> String {
    let verdict = match (round.local_choice, round.local_correct) {
        (None, _) => "no answer",
        (Some(_), true) => "correct",
        (Some(_), false) => "wrong",
    };
    format!("Answer was {}: {verdict}", round.correct + 1)
}

fn render_end(end: &EndResult, player_id: Option<&str>) -> String {
    let headline = match player_id.map(|uid| end.outcome_for(uid)) {
        Some(Outcome::Won) => "You won!".to_owned(),
        Some(Outcome::Lost) => "You lost.".to_owned(),
        Some(Outcome::Tie) | None if end.winner_id.is_none() => "It's a tie.".to_owned(),
        _ => format!("Winner: {}", end.winner_id.as_deref().unwrap_or("?")),
    };
    let mut out = if end.reason.is_empty() {
        format!("Match over. {headline}")
    } else {
        format!("Match over ({}). {headline}", end.reason)
    };
    for round in &end.recap {
        let _ = write!(out, "\n  Q{} {}: {}", round.index + 1, round.prompt, round.correct_answer);
        if let Some(correct) = player_id.and_then(|uid| round.per_player_correct.get(uid)) {
            out.push_str(if *correct { " (you: right)" } else { " (you: wrong)" });
        }
    }
    out
}

/// Options for the notice printer.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub player_id: Option<String>,
    /// Reset and queue again after each match.
    pub auto_requeue: bool,
}

/// Forward parsed stdin lines as intents until EOF or `exit`.
pub async fn read_commands<R>(
    input: R,
    intents: mpsc::Sender<Intent>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("stdin closed");
            shutdown.cancel();
            return Ok(());
        };
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(Command::Intent(intent))) => {
                if intents.send(intent).await.is_err() {
                    return Ok(());
                }
            }
            Ok(Some(Command::Help)) => println!("{HELP}"),
            Ok(Some(Command::Exit)) => {
                shutdown.cancel();
                return Ok(());
            }
            Err(e) => eprintln!("{e}"),
        }
    }
}

/// Write each notice as text until the notice channel closes.
pub async fn print_notices<W>(
    mut notices: broadcast::Receiver<Notice>,
    intents: mpsc::Sender<Intent>,
    opts: PlayOptions,
    mut out: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let notice = match notices.recv().await {
            Ok(notice) => notice,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "notice printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };
        let mut line = render_notice(&notice, opts.player_id.as_deref());
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;

        if opts.auto_requeue && matches!(notice, Notice::Ended(_)) {
            if intents.send(Intent::Reset).await.is_err() || intents.send(Intent::Queue).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[path = "play_tests.rs"]
mod tests;
