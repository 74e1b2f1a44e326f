// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities shared by Keyward's unit and integration tests.

pub mod agent;
pub mod fixtures;

pub use agent::ScriptedAgent;
pub use fixtures::{fast_config, signed_process, unsigned_process, Signer};
