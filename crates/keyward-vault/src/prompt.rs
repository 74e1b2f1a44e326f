// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal implementation of the interactive agent.
//!
//! Passphrases come from the `KEYWARD_PASSPHRASE` environment variable (for
//! headless use) or an `rpassword` prompt on the controlling TTY. Access and
//! equivalence confirmations are read from stdin. Without a terminal every
//! question that cannot be answered from the environment is canceled.

use std::io::{BufRead, IsTerminal};

use keyward_core::{
    AccessDecision, AccessPrompt, EquivalencePrompt, InteractiveAgent, KeywardError,
    PassphrasePrompt,
};
use secrecy::SecretString;
use tracing::{debug, warn};

/// The environment variable name for providing a store passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "KEYWARD_PASSPHRASE";

const NEW_PASSPHRASE_ATTEMPTS: u32 = 3;

fn env_passphrase() -> Option<SecretString> {
    std::env::var(PASSPHRASE_ENV_VAR)
        .ok()
        .filter(|key| !key.is_empty())
        .map(SecretString::from)
}

fn is_interactive() -> bool {
    std::io::stdin().is_terminal()
}

fn read_secret(prompt: &str) -> Result<String, KeywardError> {
    eprint!("{prompt}");
    rpassword::read_password()
        .map_err(|e| KeywardError::Internal(format!("failed to read passphrase: {e}")))
}

fn read_answer(prompt: &str) -> Result<String, KeywardError> {
    eprint!("{prompt}");
    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| KeywardError::Internal(format!("failed to read answer: {e}")))?;
    if read == 0 {
        return Err(KeywardError::UserCanceled);
    }
    Ok(line)
}

/// Interpret a y/n/a answer. Anything unrecognized is a denial.
pub fn parse_access_answer(answer: &str) -> AccessDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => AccessDecision::Allow { remember: false },
        "a" | "always" => AccessDecision::Allow { remember: true },
        _ => AccessDecision::Deny,
    }
}

/// Agent that talks to the user on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TtyAgent;

impl TtyAgent {
    pub fn new() -> Self {
        Self
    }
}

impl InteractiveAgent for TtyAgent {
    fn query_passphrase(&self, prompt: &PassphrasePrompt<'_>) -> Result<SecretString, KeywardError> {
        if let Some(passphrase) = env_passphrase() {
            return Ok(passphrase);
        }
        if !is_interactive() {
            debug!(store = prompt.store, "no terminal for passphrase prompt");
            return Err(KeywardError::UserCanceled);
        }
        if prompt.attempt > 1 {
            eprintln!("Wrong passphrase, try again.");
        }
        let passphrase = read_secret(&format!("Passphrase for `{}`: ", prompt.store))?;
        if passphrase.is_empty() {
            return Err(KeywardError::UserCanceled);
        }
        Ok(SecretString::from(passphrase))
    }

    fn query_new_passphrase(&self, store: &str) -> Result<SecretString, KeywardError> {
        // Env var does not need confirmation.
        if let Some(passphrase) = env_passphrase() {
            return Ok(passphrase);
        }
        if !is_interactive() {
            debug!(store, "no terminal for new passphrase prompt");
            return Err(KeywardError::UserCanceled);
        }
        for _ in 0..NEW_PASSPHRASE_ATTEMPTS {
            let first = read_secret(&format!("New passphrase for `{store}`: "))?;
            if first.is_empty() {
                return Err(KeywardError::UserCanceled);
            }
            let second = read_secret("Confirm passphrase: ")?;
            if first == second {
                return Ok(SecretString::from(first));
            }
            warn!(store, "passphrases do not match");
            eprintln!("Passphrases do not match.");
        }
        Err(KeywardError::UserCanceled)
    }

    fn confirm_access(&self, prompt: &AccessPrompt<'_>) -> Result<AccessDecision, KeywardError> {
        if !is_interactive() {
            return Err(KeywardError::UserCanceled);
        }
        let answer = read_answer(&format!(
            "`{}` wants to {} `{}`. Allow? [y]es / [n]o / [a]lways: ",
            prompt.process.path().display(),
            prompt.tag,
            prompt.description
        ))?;
        Ok(parse_access_answer(&answer))
    }

    fn confirm_equivalence(&self, prompt: &EquivalencePrompt<'_>) -> Result<bool, KeywardError> {
        if !is_interactive() {
            return Err(KeywardError::UserCanceled);
        }
        let answer = read_answer(&format!(
            "Treat `{}` as the same application as `{}`? [y/n]: ",
            prompt.process.path().display(),
            prompt.acl_name
        ))?;
        Ok(matches!(
            parse_access_answer(&answer),
            AccessDecision::Allow { .. }
        ))
    }
}
