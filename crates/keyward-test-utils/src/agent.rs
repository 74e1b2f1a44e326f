// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An [`InteractiveAgent`] that replays scripted answers.
//!
//! Each prompt kind has its own queue. An exhausted queue behaves like the
//! user closing the dialog, i.e. [`KeywardError::UserCanceled`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use keyward_core::{
    AccessDecision, AccessPrompt, EquivalencePrompt, InteractiveAgent, KeywardError,
    PassphrasePrompt,
};
use parking_lot::Mutex;
use secrecy::SecretString;

type Answer<T> = Option<T>;

#[derive(Default)]
pub struct ScriptedAgent {
    passphrases: Mutex<VecDeque<Answer<String>>>,
    new_passphrases: Mutex<VecDeque<Answer<String>>>,
    access: Mutex<VecDeque<Answer<AccessDecision>>>,
    equivalence: Mutex<VecDeque<Answer<bool>>>,
    passphrase_calls: AtomicUsize,
    new_passphrase_calls: AtomicUsize,
    access_calls: AtomicUsize,
    equivalence_calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passphrase(self, passphrase: &str) -> Self {
        self.passphrases.lock().push_back(Some(passphrase.to_string()));
        self
    }

    pub fn cancel_passphrase(self) -> Self {
        self.passphrases.lock().push_back(None);
        self
    }

    pub fn new_passphrase(self, passphrase: &str) -> Self {
        self.new_passphrases
            .lock()
            .push_back(Some(passphrase.to_string()));
        self
    }

    pub fn cancel_new_passphrase(self) -> Self {
        self.new_passphrases.lock().push_back(None);
        self
    }

    pub fn allow(self, remember: bool) -> Self {
        self.access
            .lock()
            .push_back(Some(AccessDecision::Allow { remember }));
        self
    }

    pub fn deny(self) -> Self {
        self.access.lock().push_back(Some(AccessDecision::Deny));
        self
    }

    pub fn cancel_access(self) -> Self {
        self.access.lock().push_back(None);
        self
    }

    pub fn confirm_link(self, confirmed: bool) -> Self {
        self.equivalence.lock().push_back(Some(confirmed));
        self
    }

    pub fn passphrase_prompts(&self) -> usize {
        self.passphrase_calls.load(Ordering::SeqCst)
    }

    pub fn new_passphrase_prompts(&self) -> usize {
        self.new_passphrase_calls.load(Ordering::SeqCst)
    }

    pub fn access_prompts(&self) -> usize {
        self.access_calls.load(Ordering::SeqCst)
    }

    pub fn equivalence_prompts(&self) -> usize {
        self.equivalence_calls.load(Ordering::SeqCst)
    }
}

fn next<T>(queue: &Mutex<VecDeque<Answer<T>>>, calls: &AtomicUsize) -> Result<T, KeywardError> {
    calls.fetch_add(1, Ordering::SeqCst);
    queue
        .lock()
        .pop_front()
        .flatten()
        .ok_or(KeywardError::UserCanceled)
}

impl InteractiveAgent for ScriptedAgent {
    fn query_passphrase(&self, _prompt: &PassphrasePrompt<'_>) -> Result<SecretString, KeywardError> {
        next(&self.passphrases, &self.passphrase_calls).map(SecretString::from)
    }

    fn query_new_passphrase(&self, _store: &str) -> Result<SecretString, KeywardError> {
        next(&self.new_passphrases, &self.new_passphrase_calls).map(SecretString::from)
    }

    fn confirm_access(&self, _prompt: &AccessPrompt<'_>) -> Result<AccessDecision, KeywardError> {
        next(&self.access, &self.access_calls)
    }

    fn confirm_equivalence(&self, _prompt: &EquivalencePrompt<'_>) -> Result<bool, KeywardError> {
        next(&self.equivalence, &self.equivalence_calls)
    }
}
