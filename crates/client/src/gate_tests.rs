// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::AnswerGate;

#[test]
fn submit_without_question_is_dropped() {
    let mut gate = AnswerGate::new();
    assert_eq!(gate.submit(1), None);
    assert!(!gate.answered());
}

#[test]
fn second_submit_is_dropped() {
    let mut gate = AnswerGate::new();
    gate.arm(0);
    assert_eq!(gate.submit(2), Some(2));
    assert_eq!(gate.submit(3), None);
    assert_eq!(gate.submitted(), Some(2));
    assert!(gate.answered());
}

#[test]
fn arming_next_question_reopens() {
    let mut gate = AnswerGate::new();
    gate.arm(0);
    gate.submit(1);
    gate.arm(1);
    assert!(!gate.answered());
    assert_eq!(gate.submitted(), None);
    assert_eq!(gate.question(), Some(1));
    assert_eq!(gate.submit(0), Some(0));
}

#[test]
fn forced_lock_blocks_late_submit() {
    let mut gate = AnswerGate::new();
    gate.arm(4);
    gate.lock();
    assert_eq!(gate.submit(1), None);
    assert_eq!(gate.submitted(), None);
}

#[test]
fn rearming_same_question_keeps_lock_and_choice() {
    let mut gate = AnswerGate::new();
    assert!(gate.arm(3));
    assert_eq!(gate.submit(1), Some(1));
    assert!(!gate.arm(3));
    assert!(gate.answered());
    assert_eq!(gate.submitted(), Some(1));
    assert_eq!(gate.submit(2), None);
}
