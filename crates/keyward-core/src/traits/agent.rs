// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interactive user-prompt agent.

use secrecy::SecretString;

use crate::error::KeywardError;
use crate::types::{AuthorizationTag, ProcessContext};

/// Request for an existing store's passphrase.
#[derive(Debug, Clone, Copy)]
pub struct PassphrasePrompt<'a> {
    pub store: &'a str,
    /// 1-based attempt counter, so the agent can say "try again".
    pub attempt: u32,
}

/// Request to let a process use an item.
#[derive(Debug, Clone, Copy)]
pub struct AccessPrompt<'a> {
    pub description: &'a str,
    pub tag: AuthorizationTag,
    pub process: &'a ProcessContext,
}

/// Request to treat a process as the same application an ACL names.
#[derive(Debug, Clone, Copy)]
pub struct EquivalencePrompt<'a> {
    pub acl_name: &'a str,
    pub process: &'a ProcessContext,
}

/// The user's answer to an [`AccessPrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow { remember: bool },
    Deny,
}

/// Out-of-process UI that asks the user.
///
/// Every method returns [`KeywardError::UserCanceled`] when the user dismisses
/// the dialog; that outcome is terminal and must reach the original caller.
pub trait InteractiveAgent: Send + Sync {
    fn query_passphrase(&self, prompt: &PassphrasePrompt<'_>) -> Result<SecretString, KeywardError>;

    /// Ask for a passphrase for a store being created or re-keyed.
    fn query_new_passphrase(&self, store: &str) -> Result<SecretString, KeywardError>;

    fn confirm_access(&self, prompt: &AccessPrompt<'_>) -> Result<AccessDecision, KeywardError>;

    /// `Ok(false)` means the user declined.
    fn confirm_equivalence(&self, prompt: &EquivalencePrompt<'_>) -> Result<bool, KeywardError>;
}
