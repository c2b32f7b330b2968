// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire codec for the duel protocol.
//!
//! Inbound frames are JSON objects shaped `{"type": .., "message": ..,
//! "extra": {..}}`. Decoding never fails outright: frames the client does not
//! understand come back as [`Decoded::Ignored`] or [`Decoded::Malformed`] so
//! the caller can log them and move on.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// Server default when a question frame omits `question_timeout`.
pub const DEFAULT_QUESTION_TIMEOUT_SECS: f64 = 10.0;

/// Longest chat line the server relays.
pub const MAX_CHAT_CHARS: usize = 500;

/// Remaining hit points keyed by player uid, in server order.
pub type LifeTable = IndexMap<String, u32>;

/// Raw inbound frame. Unknown top-level fields are kept in `rest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Game payloads
// ---------------------------------------------------------------------------

/// `game/found`: an opponent was paired.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Found {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Player metadata, kept as sent for the pre-match introduction.
    #[serde(default)]
    pub players: Vec<Value>,
    #[serde(default, deserialize_with = "life_table")]
    pub lifes: LifeTable,
    /// The whole `extra` object, verbatim.
    #[serde(skip)]
    pub raw: Value,
}

/// `game/start`: the match officially begins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Start {
    #[serde(default, deserialize_with = "life_table")]
    pub lifes: LifeTable,
}

/// `game/question`: a new round.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Question {
    pub index: u32,
    #[serde(rename = "question")]
    pub prompt: String,
    pub choices: Vec<String>,
    #[serde(rename = "question_timeout", default = "default_timeout", deserialize_with = "timeout_or_default")]
    pub timeout_secs: f64,
}

/// `game/reveal`: the round is resolved.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reveal {
    #[serde(default, deserialize_with = "life_table")]
    pub lifes: LifeTable,
    /// Each player's choice; `None` when they never answered or sent
    /// something that is not a valid choice.
    #[serde(default, deserialize_with = "answer_table")]
    pub answers: IndexMap<String, Option<u32>>,
    pub correct: u32,
}

impl Reveal {
    /// Whether each player in `answers` picked the correct choice.
    pub fn correctness(&self) -> IndexMap<String, bool> {
        self.answers
            .iter()
            .map(|(uid, choice)| (uid.clone(), *choice == Some(self.correct)))
            .collect()
    }
}

/// `game/end`: the match is over.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct End {
    /// Absent on a tie.
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub questions: Vec<RecapItem>,
}

/// One row of the end-of-match recap.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecapItem {
    pub index: u32,
    // Some server builds emit the key with a trailing colon.
    #[serde(rename = "question", alias = "question:", default)]
    pub prompt: String,
    #[serde(rename = "correct_ans", default, deserialize_with = "text_or_number")]
    pub correct_answer: String,
    #[serde(rename = "player_correct", default)]
    pub per_player_correct: IndexMap<String, bool>,
}

fn default_timeout() -> f64 {
    DEFAULT_QUESTION_TIMEOUT_SECS
}

/// `question_timeout` is advisory; null or a non-number means the default.
fn timeout_or_default<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64().unwrap_or(DEFAULT_QUESTION_TIMEOUT_SECS),
        _ => DEFAULT_QUESTION_TIMEOUT_SECS,
    })
}

/// The server relays whatever integer a player sent. Anything that is not a
/// choice index counts as no answer.
fn answer_table<'de, D>(de: D) -> Result<IndexMap<String, Option<u32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, Value> = IndexMap::deserialize(de)?;
    Ok(raw
        .into_iter()
        .map(|(uid, choice)| {
            let choice = choice.as_u64().and_then(|c| u32::try_from(c).ok());
            (uid, choice)
        })
        .collect())
}

/// Life counts can dip below zero server-side; clamp them.
fn life_table<'de, D>(de: D) -> Result<LifeTable, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, i64> = IndexMap::deserialize(de)?;
    Ok(raw
        .into_iter()
        .map(|(uid, hp)| (uid, u32::try_from(hp.max(0)).unwrap_or(u32::MAX)))
        .collect())
}

fn text_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A recognized server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Still searching for an opponent.
    Queue,
    /// Liveness probe; must be answered with a pong.
    Ping { id: Option<Value> },
    /// Reply to our own keepalive ping.
    Pong,
    /// Heartbeat variant with no effect.
    Zombie,
    Chat { from: Option<String>, text: String },
    ServerError { message: String },
    Found(Found),
    Start(Start),
    Question(Question),
    Reveal(Reveal),
    End(End),
}

impl Inbound {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Ping { .. } => "ping",
            Self::Pong => "pong",
            Self::Zombie => "zombie",
            Self::Chat { .. } => "chat",
            Self::ServerError { .. } => "error",
            Self::Found(_) => "game/found",
            Self::Start(_) => "game/start",
            Self::Question(_) => "game/question",
            Self::Reveal(_) => "game/reveal",
            Self::End(_) => "game/end",
        }
    }
}

/// Result of decoding one text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame(Inbound),
    /// Well-formed, but a `type`/`message` this client does not know.
    Ignored { kind: String },
    /// Not JSON, no `type`, or a known message with a bad payload.
    Malformed { reason: String },
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Decoded {
    let env: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => return Decoded::Malformed { reason: e.to_string() },
    };
    decode_envelope(env)
}

/// Interpret an already-parsed envelope.
pub fn decode_envelope(env: Envelope) -> Decoded {
    let frame = match env.kind.as_str() {
        "queue" | "queued" => Inbound::Queue,
        "ping" => Inbound::Ping { id: env.rest.get("id").filter(|v| !v.is_null()).cloned() },
        "pong" => Inbound::Pong,
        "zombie" => Inbound::Zombie,
        "chat" => Inbound::Chat {
            from: env.rest.get("from").and_then(Value::as_str).map(str::to_owned),
            text: env.rest.get("text").and_then(Value::as_str).unwrap_or_default().to_owned(),
        },
        "error" => Inbound::ServerError { message: env.message.unwrap_or_default() },
        "game" => return decode_game(env.message.as_deref(), env.extra),
        other => return Decoded::Ignored { kind: other.to_owned() },
    };
    Decoded::Frame(frame)
}

fn decode_game(message: Option<&str>, extra: Value) -> Decoded {
    let result = match message {
        Some("found") => payload::<Found>("found", extra.clone()).map(|mut found| {
            found.raw = extra;
            Inbound::Found(found)
        }),
        Some("start") => payload("start", extra).map(Inbound::Start),
        Some("question") => payload("question", extra).map(Inbound::Question),
        Some("reveal") => payload("reveal", extra).map(Inbound::Reveal),
        Some("end") => payload("end", extra).map(Inbound::End),
        Some(other) => return Decoded::Ignored { kind: format!("game/{other}") },
        None => return Decoded::Ignored { kind: "game".to_owned() },
    };
    match result {
        Ok(frame) => Decoded::Frame(frame),
        Err(reason) => Decoded::Malformed { reason },
    }
}

fn payload<T: DeserializeOwned>(message: &str, extra: Value) -> Result<T, String> {
    // `start` and `end` may legitimately arrive without an extra object.
    let extra = if extra.is_null() { Value::Object(Map::new()) } else { extra };
    serde_json::from_value(extra).map_err(|e| format!("game/{message}: {e}"))
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Client-to-server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Answer {
        choice: u32,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
    },
    Ping {
        id: u64,
    },
    Quit {},
    Chat {
        text: String,
    },
}

impl Outbound {
    /// Build a chat frame, truncated to what the server relays.
    pub fn chat(text: &str) -> Self {
        Self::Chat { text: text.chars().take(MAX_CHAT_CHARS).collect() }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Answer { .. } => "answer",
            Self::Pong { .. } => "pong",
            Self::Ping { .. } => "ping",
            Self::Quit {} => "quit",
            Self::Chat { .. } => "chat",
        }
    }
}

/// Serialize an outbound frame to its JSON text form.
pub fn encode(frame: &Outbound) -> Result<String, ClientError> {
    serde_json::to_string(frame).map_err(|e| ClientError::protocol(e.to_string()))
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
