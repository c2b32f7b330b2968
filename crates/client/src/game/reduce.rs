// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The match reducer.

use tracing::debug;

use crate::protocol::{Found, Inbound, LifeTable, Outbound, Reveal};

use super::{
    EndResult, Event, MatchState, MatchStatus, Notice, PairingInfo, QuestionState, RoundOutcome,
    Step, DEFAULT_MAX_LIFE,
};

/// Apply one event to `state`, returning the next snapshot and its effects.
pub fn reduce(state: &MatchState, event: Event) -> Step {
    let mut step = Step { state: state.clone(), ..Step::default() };
    match event {
        Event::QueueIntent => queue(&mut step),
        Event::Frame(frame) => apply_frame(&mut step, frame),
        Event::Submit(choice) => submit(&mut step, choice),
        Event::TransportLost { reason } => transport_lost(&mut step, reason),
        Event::Reset => reset(&mut step),
        Event::Leave => leave(&mut step),
    }
    debug_assert!(
        state.status.can_transition(step.state.status),
        "illegal status change {} -> {}",
        state.status,
        step.state.status
    );
    step
}

fn queue(step: &mut Step) {
    if step.state.status != MatchStatus::Idle {
        debug!(status = %step.state.status, "queue intent ignored");
        return;
    }
    step.state = MatchState { status: MatchStatus::Queueing, ..MatchState::default() };
    step.notices.push(Notice::Searching);
}

fn submit(step: &mut Step, choice: u32) {
    let state = &mut step.state;
    if state.status != MatchStatus::Playing {
        debug!(status = %state.status, choice, "answer dropped: not playing");
        return;
    }
    let Some(question) = state.question.as_ref() else {
        debug!(choice, "answer dropped: no active question");
        return;
    };
    if choice as usize >= question.choices.len() {
        debug!(choice, choices = question.choices.len(), "answer dropped: out of range");
        return;
    }
    match state.gate.submit(choice) {
        Some(choice) => {
            step.outbound.push(Outbound::Answer { choice });
            step.notices.push(Notice::Answered { choice });
        }
        None => debug!(choice, "answer dropped: already answered"),
    }
}

fn transport_lost(step: &mut Step, reason: String) {
    let forfeited = match step.state.status {
        MatchStatus::Playing => true,
        MatchStatus::Queueing => false,
        MatchStatus::Idle | MatchStatus::Ended => return,
    };
    step.state = MatchState::default();
    step.notices.push(Notice::ConnectionLost { reason, forfeited });
}

fn reset(step: &mut Step) {
    if step.state.status != MatchStatus::Ended {
        debug!(status = %step.state.status, "reset ignored");
        return;
    }
    step.state = MatchState::default();
}

fn leave(step: &mut Step) {
    match step.state.status {
        MatchStatus::Playing => step.outbound.push(Outbound::Quit {}),
        MatchStatus::Queueing => {}
        MatchStatus::Idle | MatchStatus::Ended => return,
    }
    step.state = MatchState::default();
    step.notices.push(Notice::Left);
}

fn apply_frame(step: &mut Step, frame: Inbound) {
    let status = step.state.status;
    match frame {
        Inbound::Ping { id } => step.outbound.push(Outbound::Pong { id }),
        Inbound::Queue | Inbound::Pong | Inbound::Zombie => {}
        Inbound::Chat { from, text } => step.notices.push(Notice::Chat { from, text }),
        Inbound::ServerError { message } => step.notices.push(Notice::ServerError { message }),
        Inbound::Found(found) if status == MatchStatus::Queueing => paired(step, found),
        Inbound::Start(start) if status == MatchStatus::Playing => {
            step.state.lifes = start.lifes;
            step.notices.push(Notice::MatchStarted);
        }
        Inbound::Question(question) if status == MatchStatus::Playing => {
            let fresh = step.state.gate.arm(question.index);
            let question = QuestionState::from(question);
            step.state.question = Some(question.clone());
            if fresh {
                step.notices.push(Notice::Question(question));
            } else {
                debug!(index = question.index, "repeated question frame");
            }
        }
        Inbound::Reveal(reveal) => {
            // The round is over whatever the status: no more input.
            step.state.gate.lock();
            if status == MatchStatus::Playing {
                revealed(step, reveal);
            } else {
                debug!(%status, "reveal ignored");
            }
        }
        Inbound::End(end) => {
            step.state.gate.lock();
            if status == MatchStatus::Playing {
                let result = EndResult::from(end);
                step.state.status = MatchStatus::Ended;
                step.state.end = Some(result.clone());
                step.notices.push(Notice::Ended(result));
            } else {
                debug!(%status, "end ignored");
            }
        }
        other => debug!(frame = other.label(), %status, "frame ignored in this status"),
    }
}

fn paired(step: &mut Step, found: Found) {
    let lifes = if found.lifes.is_empty() { default_lifes(&found) } else { found.lifes };
    step.state = MatchState {
        status: MatchStatus::Playing,
        lifes,
        pairing: Some(PairingInfo {
            session_id: found.session_id.clone(),
            players: found.players,
            raw: found.raw,
        }),
        ..MatchState::default()
    };
    step.notices.push(Notice::Paired { session_id: found.session_id });
}

/// Full lives for every player listed by uid when `lifes` is missing.
fn default_lifes(found: &Found) -> LifeTable {
    found
        .players
        .iter()
        .filter_map(|p| p.as_str())
        .map(|uid| (uid.to_owned(), DEFAULT_MAX_LIFE))
        .collect()
}

fn revealed(step: &mut Step, reveal: Reveal) {
    let per_player = reveal.correctness();
    let local_choice = step.state.gate.submitted();
    let outcome = RoundOutcome {
        index: step.state.gate.question(),
        correct: reveal.correct,
        per_player,
        local_choice,
        local_correct: local_choice == Some(reveal.correct),
    };
    step.state.lifes = reveal.lifes;
    step.state.last_round = Some(outcome.clone());
    step.notices.push(Notice::Revealed(outcome));
}

#[cfg(test)]
#[path = "reduce_tests.rs"]
mod tests;
