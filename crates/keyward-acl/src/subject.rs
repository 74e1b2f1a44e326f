// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ACL subjects: the closed set of ways a request can be authorized.

use std::fmt;

use keyward_codesign::{CodeSubject, CodeVerdict};
use keyward_core::{AccessDecision, AccessPrompt, CryptoProvider, KeywardError};
use ring::digest;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::context::ValidationContext;

/// Deepest nesting of threshold subjects accepted in an ACL.
pub const MAX_SUBJECT_DEPTH: usize = 8;

/// Salted SHA-256 digest of a shared secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDigest {
    #[serde(with = "hex::serde")]
    salt: [u8; 16],
    #[serde(with = "hex::serde")]
    digest: [u8; 32],
}

impl SecretDigest {
    pub fn new(secret: &SecretString, provider: &dyn CryptoProvider) -> Result<Self, KeywardError> {
        let mut salt = [0u8; 16];
        provider.random_bytes(&mut salt)?;
        Ok(Self::with_salt(secret, salt))
    }

    pub fn with_salt(secret: &SecretString, salt: [u8; 16]) -> Self {
        Self {
            salt,
            digest: salted_digest(&salt, secret),
        }
    }

    pub fn matches(&self, candidate: &SecretString) -> bool {
        salted_digest(&self.salt, candidate).ct_eq(&self.digest).into()
    }
}

impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretDigest([REDACTED])")
    }
}

fn salted_digest(salt: &[u8; 16], secret: &SecretString) -> [u8; 32] {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(salt);
    ctx.update(secret.expose_secret().as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(ctx.finish().as_ref());
    out
}

/// Something that can authorize a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    /// Always satisfied.
    Any,
    /// Satisfied by a passphrase sample matching the stored digest.
    Secret { secret: SecretDigest },
    /// Satisfied when the requesting process has this code identity.
    CodeIdentity { code: CodeSubject },
    /// Satisfied when at least `required` of `subjects` are.
    Threshold { required: usize, subjects: Vec<Subject> },
    /// Satisfied when the user allows the request.
    Prompted { description: String },
    /// Satisfied when the owning store's ACL grants the same tag.
    PreAuthorized,
}

impl Subject {
    pub fn secret(secret: &SecretString, provider: &dyn CryptoProvider) -> Result<Self, KeywardError> {
        Ok(Self::Secret {
            secret: SecretDigest::new(secret, provider)?,
        })
    }

    pub fn code(code: CodeSubject) -> Self {
        Self::CodeIdentity { code }
    }

    pub fn prompted(description: impl Into<String>) -> Self {
        Self::Prompted {
            description: description.into(),
        }
    }

    /// A checked k-of-n threshold.
    pub fn threshold(required: usize, subjects: Vec<Subject>) -> Result<Self, KeywardError> {
        let subject = Self::Threshold { required, subjects };
        subject.check()?;
        Ok(subject)
    }

    /// Structural validation applied to every subject entering an ACL.
    pub fn check(&self) -> Result<(), KeywardError> {
        self.check_at(0)
    }

    fn check_at(&self, depth: usize) -> Result<(), KeywardError> {
        match self {
            Self::Threshold { required, subjects } => {
                if depth >= MAX_SUBJECT_DEPTH {
                    return Err(KeywardError::InvalidAclSubjectValue(format!(
                        "threshold subjects nested deeper than {MAX_SUBJECT_DEPTH}"
                    )));
                }
                if *required == 0 || *required > subjects.len() {
                    return Err(KeywardError::InvalidAclSubjectValue(format!(
                        "threshold requires {required} of {} subjects",
                        subjects.len()
                    )));
                }
                subjects.iter().try_for_each(|s| s.check_at(depth + 1))
            }
            Self::CodeIdentity {
                code: CodeSubject::Legacy { path, .. },
            } if path.is_empty() => Err(KeywardError::InvalidAclSubjectValue(
                "legacy code subject without a path".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Whether this is the canonical "these applications, or ask" shape.
    pub fn is_canonical(&self) -> bool {
        matches!(
            self,
            Self::Threshold { subjects, .. } if matches!(subjects.last(), Some(Self::Prompted { .. }))
        )
    }

    pub(crate) fn validate(&self, ctx: &mut ValidationContext<'_>) -> Result<bool, KeywardError> {
        match self {
            Self::Any => Ok(true),
            Self::Secret { secret } => Ok(ctx.credentials.passphrases().any(|p| secret.matches(p))),
            Self::CodeIdentity { code } => {
                let Some(verifier) = ctx.env.verifier else {
                    return Ok(false);
                };
                match verifier.verify(ctx.process, code, ctx.env.agent)? {
                    CodeVerdict::Accept => Ok(true),
                    CodeVerdict::Adopt(adopted) => {
                        ctx.upgrades.push(Subject::code(adopted));
                        Ok(true)
                    }
                    CodeVerdict::Ambiguous {
                        acl_name,
                        process_name,
                    } => {
                        ctx.ambiguous.get_or_insert((acl_name, process_name));
                        Ok(false)
                    }
                    CodeVerdict::RejectUnsigned | CodeVerdict::RejectOther => Ok(false),
                }
            }
            Self::Threshold { required, subjects } => {
                let start = ctx.upgrades.len();
                let mut satisfied = 0;
                for subject in subjects {
                    if ctx.attempt(|ctx| subject.validate(ctx))? {
                        satisfied += 1;
                        if satisfied >= *required {
                            return Ok(true);
                        }
                    }
                }
                ctx.upgrades.truncate(start);
                Ok(false)
            }
            Self::Prompted { description } => {
                let Some(agent) = ctx.env.agent else {
                    return Ok(false);
                };
                let decision = agent.confirm_access(&AccessPrompt {
                    description,
                    tag: ctx.tag,
                    process: ctx.process.context(),
                })?;
                match decision {
                    AccessDecision::Allow { remember } => {
                        if remember {
                            if let Some(code) = CodeSubject::for_process(ctx.process) {
                                ctx.upgrades.push(Subject::code(code));
                            }
                        }
                        Ok(true)
                    }
                    AccessDecision::Deny => {
                        debug!(tag = %ctx.tag, "access prompt denied");
                        Ok(false)
                    }
                }
            }
            Self::PreAuthorized => match ctx.env.preauthorized {
                Some(acl) => ctx.validate_preauthorized(acl),
                None => Ok(false),
            },
        }
    }
}
