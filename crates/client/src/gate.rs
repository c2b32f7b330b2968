// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At-most-once answer submission per question.
//!
//! The gate locks optimistically on submit, before the server has seen the
//! answer, so repeated UI triggers cannot send twice regardless of latency.

/// Answer lock for the current question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerGate {
    question: Option<u32>,
    answered: bool,
    choice: Option<u32>,
}

impl AnswerGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install question `index`. Any lock or choice from a previous question
    /// is dropped; re-arming the question already installed keeps both.
    ///
    /// Returns whether a new question was installed.
    pub fn arm(&mut self, index: u32) -> bool {
        if self.question == Some(index) {
            return false;
        }
        self.question = Some(index);
        self.answered = false;
        self.choice = None;
        true
    }

    /// Force the lock without recording a choice (round over).
    pub fn lock(&mut self) {
        self.answered = true;
    }

    /// Claim the single submission for the armed question.
    ///
    /// Returns the choice to transmit, or `None` when there is no armed
    /// question or it was already answered.
    pub fn submit(&mut self, choice: u32) -> Option<u32> {
        if self.answered || self.question.is_none() {
            return None;
        }
        self.answered = true;
        self.choice = Some(choice);
        Some(choice)
    }

    pub fn answered(&self) -> bool {
        self.answered
    }

    /// Index of the armed question, if any.
    pub fn question(&self) -> Option<u32> {
        self.question
    }

    /// The choice sent for the armed question.
    pub fn submitted(&self) -> Option<u32> {
        self.choice
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
