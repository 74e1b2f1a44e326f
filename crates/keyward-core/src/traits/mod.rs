// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces of the collaborators Keyward drives but does not implement.
//!
//! Both traits are synchronous: requests are served thread-per-request and
//! any call may block, including on user input.

pub mod agent;
pub mod crypto;

pub use agent::{AccessDecision, AccessPrompt, EquivalencePrompt, InteractiveAgent, PassphrasePrompt};
pub use crypto::CryptoProvider;
