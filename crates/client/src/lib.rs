// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod config;
pub mod error;
pub mod game;
pub mod gate;
pub mod identity;
pub mod play;
pub mod protocol;
pub mod session;
pub mod socket;
pub mod test_support;
