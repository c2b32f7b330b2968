// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{EndResult, MatchStatus, Outcome};

#[yare::parameterized(
    idle_to_queueing = { MatchStatus::Idle, MatchStatus::Queueing, true },
    queueing_to_playing = { MatchStatus::Queueing, MatchStatus::Playing, true },
    playing_to_ended = { MatchStatus::Playing, MatchStatus::Ended, true },
    reset = { MatchStatus::Ended, MatchStatus::Idle, true },
    forfeit = { MatchStatus::Playing, MatchStatus::Idle, true },
    abandoned_queue = { MatchStatus::Queueing, MatchStatus::Idle, true },
    playing_back_to_queueing = { MatchStatus::Playing, MatchStatus::Queueing, false },
    ended_to_playing = { MatchStatus::Ended, MatchStatus::Playing, false },
    idle_to_playing = { MatchStatus::Idle, MatchStatus::Playing, false },
    idle_to_ended = { MatchStatus::Idle, MatchStatus::Ended, false },
    ended_to_queueing = { MatchStatus::Ended, MatchStatus::Queueing, false },
)]
fn status_transitions(from: MatchStatus, to: MatchStatus, legal: bool) {
    assert_eq!(from.can_transition(to), legal);
}

fn result(winner: Option<&str>) -> EndResult {
    EndResult { winner_id: winner.map(str::to_owned), reason: "life".to_owned(), recap: vec![] }
}

#[test]
fn outcome_for_winner_and_loser() {
    let end = result(Some("A"));
    assert_eq!(end.outcome_for("A"), Outcome::Won);
    assert_eq!(end.outcome_for("B"), Outcome::Lost);
}

#[test]
fn absent_winner_is_a_tie_for_both() {
    let end = result(None);
    assert_eq!(end.outcome_for("A"), Outcome::Tie);
    assert_eq!(end.outcome_for("B"), Outcome::Tie);
}

#[test]
fn status_serializes_lowercase() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_string(&MatchStatus::Queueing)?, "\"queueing\"");
    assert_eq!(MatchStatus::Ended.to_string(), "ended");
    Ok(())
}
