// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side view of a duel: status, lives, current question and result.
//!
//! All mutation goes through [`reduce`], which takes the previous snapshot and
//! one [`Event`] and returns the next snapshot plus the frames to send and the
//! notices to surface. Lives and results only ever come from server frames.

pub mod reduce;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::gate::AnswerGate;
use crate::protocol::{self, Inbound, LifeTable, Outbound};

pub use reduce::reduce;

/// Hit points each player starts with when the server does not say otherwise.
pub const DEFAULT_MAX_LIFE: u32 = 3;

/// Top-level match status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Idle,
    Queueing,
    Playing,
    Ended,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queueing => "queueing",
            Self::Playing => "playing",
            Self::Ended => "ended",
        }
    }

    /// Whether `self -> next` is a legal status change.
    ///
    /// Forward progression, plus the reset (`ended -> idle`), forfeit
    /// (`playing -> idle`) and abandoned-queue (`queueing -> idle`) paths.
    pub fn can_transition(self, next: MatchStatus) -> bool {
        use MatchStatus::*;
        matches!(
            (self, next),
            (Idle, Queueing)
                | (Queueing, Playing)
                | (Playing, Ended)
                | (Ended, Idle)
                | (Playing, Idle)
                | (Queueing, Idle)
        ) || self == next
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The question currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionState {
    pub index: u32,
    pub prompt: String,
    pub choices: Vec<String>,
    /// Advisory countdown; only the server ends a round.
    pub timeout_secs: f64,
}

impl From<protocol::Question> for QuestionState {
    fn from(q: protocol::Question) -> Self {
        Self { index: q.index, prompt: q.prompt, choices: q.choices, timeout_secs: q.timeout_secs }
    }
}

/// Pairing metadata from `game/found`, kept for the versus screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingInfo {
    pub session_id: Option<String>,
    pub players: Vec<Value>,
    pub raw: Value,
}

/// Correctness signal emitted for each revealed round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundOutcome {
    /// Question the reveal closed, when one was installed.
    pub index: Option<u32>,
    pub correct: u32,
    pub per_player: IndexMap<String, bool>,
    pub local_choice: Option<u32>,
    /// False when the local player never submitted.
    pub local_correct: bool,
}

/// One recap row of the finished match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecap {
    pub index: u32,
    pub prompt: String,
    pub correct_answer: String,
    pub per_player_correct: IndexMap<String, bool>,
}

impl From<protocol::RecapItem> for RoundRecap {
    fn from(item: protocol::RecapItem) -> Self {
        Self {
            index: item.index,
            prompt: item.prompt,
            correct_answer: item.correct_answer,
            per_player_correct: item.per_player_correct,
        }
    }
}

/// How the match ended for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Won,
    Lost,
    Tie,
}

/// Terminal result, created once per match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndResult {
    /// `None` is a tie, not an error.
    pub winner_id: Option<String>,
    pub reason: String,
    pub recap: Vec<RoundRecap>,
}

impl EndResult {
    pub fn outcome_for(&self, uid: &str) -> Outcome {
        match self.winner_id.as_deref() {
            None => Outcome::Tie,
            Some(winner) if winner == uid => Outcome::Won,
            Some(_) => Outcome::Lost,
        }
    }
}

impl From<protocol::End> for EndResult {
    fn from(end: protocol::End) -> Self {
        Self {
            winner_id: end.winner,
            reason: end.reason,
            recap: end.questions.into_iter().map(RoundRecap::from).collect(),
        }
    }
}

/// Immutable snapshot of the match as the client sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchState {
    pub status: MatchStatus,
    pub lifes: LifeTable,
    pub question: Option<QuestionState>,
    pub gate: AnswerGate,
    pub pairing: Option<PairingInfo>,
    pub last_round: Option<RoundOutcome>,
    pub end: Option<EndResult>,
}

impl MatchState {
    /// Whether the local player may no longer answer the current question.
    pub fn answered(&self) -> bool {
        self.gate.answered()
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The player asked to find an opponent (connection already acquired).
    QueueIntent,
    Frame(Inbound),
    /// The player picked a choice for the current question.
    Submit(u32),
    /// The channel dropped without a local close.
    TransportLost { reason: String },
    /// Back to the lobby after a finished match.
    Reset,
    /// Abandon the queue or the running match.
    Leave,
}

/// Something the player should be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Searching,
    Paired { session_id: Option<String> },
    MatchStarted,
    Question(QuestionState),
    Answered { choice: u32 },
    Revealed(RoundOutcome),
    Ended(EndResult),
    /// The channel dropped; `forfeited` when a match was running.
    ConnectionLost { reason: String, forfeited: bool },
    /// Queueing failed before the match could start (no or rejected token,
    /// unreachable server).
    CannotQueue { reason: String },
    Left,
    Chat { from: Option<String>, text: String },
    ServerError { message: String },
}

/// Result of one [`reduce`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub state: MatchState,
    pub outbound: Vec<Outbound>,
    pub notices: Vec<Notice>,
}

#[cfg(test)]
#[path = "game_tests.rs"]
mod tests;
