// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides whether a requesting process satisfies a code identity subject.

use std::fmt;
use std::sync::Arc;

use keyward_config::CodesignConfig;
use keyward_core::{
    CodeCheck, CryptoProvider, EquivalencePrompt, InteractiveAgent, KeywardError, LegacyHash,
    Requirement,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::equivalence::{EquivalenceSource, LinkCheck};
use crate::identity::{ProcessIdentity, trimmed_name};

/// The code identity an ACL subject names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodeSubject {
    /// Checked cryptographically against the process signature.
    Requirement {
        requirement: Requirement,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// Matched by legacy hash, directly or through an equivalence link.
    Legacy { hash: LegacyHash, path: String },
}

impl CodeSubject {
    pub fn requirement(requirement: Requirement) -> Self {
        Self::Requirement {
            requirement,
            path: None,
        }
    }

    pub fn legacy(hash: LegacyHash, path: impl Into<String>) -> Self {
        Self::Legacy {
            hash,
            path: path.into(),
        }
    }

    /// Subject naming exactly this process: its designated requirement when
    /// signed, its legacy hash otherwise.
    pub fn for_process(process: &ProcessIdentity<'_>) -> Option<Self> {
        let path = process.context().path.to_string_lossy().into_owned();
        if let Some(signature) = process.signature() {
            return Some(Self::Requirement {
                requirement: Requirement::designated(signature),
                path: Some(path),
            });
        }
        process.legacy_hash().map(|hash| Self::legacy(hash, path))
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Requirement { path, .. } => path.as_deref(),
            Self::Legacy { path, .. } => Some(path),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy { .. })
    }
}

impl fmt::Display for CodeSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requirement { requirement, .. } => write!(f, "requirement `{requirement}`"),
            Self::Legacy { hash, path } => write!(f, "legacy {path} ({hash})"),
        }
    }
}

/// Outcome of [`CodeIdentityVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeVerdict {
    Accept,
    /// Accepted through the vendor fast path; the caller should record this
    /// subject in the ACL.
    Adopt(CodeSubject),
    RejectUnsigned,
    RejectOther,
    /// Both hashes are linked, to different applications.
    Ambiguous { acl_name: String, process_name: String },
}

impl CodeVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept | Self::Adopt(_))
    }
}

impl From<CodeCheck> for CodeVerdict {
    fn from(check: CodeCheck) -> Self {
        match check {
            CodeCheck::Accept => Self::Accept,
            CodeCheck::RejectUnsigned => Self::RejectUnsigned,
            CodeCheck::RejectOther => Self::RejectOther,
        }
    }
}

pub struct CodeIdentityVerifier {
    provider: Arc<dyn CryptoProvider>,
    equivalence: EquivalenceSource,
    vendor_requirement: Requirement,
}

impl fmt::Debug for CodeIdentityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeIdentityVerifier")
            .field("equivalence", &self.equivalence)
            .field("vendor_requirement", &self.vendor_requirement.to_string())
            .finish_non_exhaustive()
    }
}

impl CodeIdentityVerifier {
    pub fn new(
        provider: Arc<dyn CryptoProvider>,
        equivalence: EquivalenceSource,
        vendor_requirement: Requirement,
    ) -> Self {
        Self {
            provider,
            equivalence,
            vendor_requirement,
        }
    }

    pub fn from_config(
        provider: Arc<dyn CryptoProvider>,
        equivalence: EquivalenceSource,
        config: &CodesignConfig,
    ) -> Result<Self, KeywardError> {
        let vendor_requirement = Requirement::parse(&config.vendor_requirement)?;
        Ok(Self::new(provider, equivalence, vendor_requirement))
    }

    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Check `process` against `subject`.
    ///
    /// `agent` is consulted only to confirm a new equivalence link; without one
    /// an unlinked legacy mismatch is rejected. Declining the confirmation is
    /// [`KeywardError::UserCanceled`].
    pub fn verify(
        &self,
        process: &ProcessIdentity<'_>,
        subject: &CodeSubject,
        agent: Option<&dyn InteractiveAgent>,
    ) -> Result<CodeVerdict, KeywardError> {
        match subject {
            CodeSubject::Requirement { requirement, .. } => Ok(self
                .provider
                .check_code(process.signature(), requirement)
                .into()),
            CodeSubject::Legacy { hash, path } => self.verify_legacy(process, hash, path, agent),
        }
    }

    fn verify_legacy(
        &self,
        process: &ProcessIdentity<'_>,
        acl_hash: &LegacyHash,
        acl_path: &str,
        agent: Option<&dyn InteractiveAgent>,
    ) -> Result<CodeVerdict, KeywardError> {
        if process.legacy_hash().as_ref() == Some(acl_hash) {
            return Ok(CodeVerdict::Accept);
        }

        let names_match = process.matches_name(acl_path);
        if names_match && process.signature().is_some() {
            let check = self
                .provider
                .check_code(process.signature(), &self.vendor_requirement);
            if check == CodeCheck::Accept {
                if let Some(adopted) = CodeSubject::for_process(process) {
                    info!(path = acl_path, "vendor-signed client adopts legacy ACL entry");
                    return Ok(CodeVerdict::Adopt(adopted));
                }
            }
        }

        let Some(process_hash) = process.legacy_hash() else {
            return Ok(CodeVerdict::RejectOther);
        };
        let Some(db) = self.equivalence.resolve() else {
            return Ok(CodeVerdict::RejectOther);
        };
        let uid = process.uid();

        match resolve_pair(&db, acl_hash, &process_hash, uid)? {
            Resolved::Agree => return Ok(CodeVerdict::Accept),
            Resolved::Disagree(verdict) => return Ok(verdict),
            Resolved::Partial(_) => {}
        }

        let (Some(agent), true) = (agent, names_match) else {
            return Ok(CodeVerdict::RejectOther);
        };

        let _interaction = db.interaction_lock();
        // Another request may have linked these while we waited.
        let existing = match resolve_pair(&db, acl_hash, &process_hash, uid)? {
            Resolved::Agree => return Ok(CodeVerdict::Accept),
            Resolved::Disagree(verdict) => return Ok(verdict),
            Resolved::Partial(name) => name,
        };
        let acl_name = existing
            .clone()
            .or_else(|| trimmed_name(acl_path))
            .unwrap_or_else(|| acl_path.to_string());

        let confirmed = agent.confirm_equivalence(&EquivalencePrompt {
            acl_name: &acl_name,
            process: process.context(),
        })?;
        if !confirmed {
            debug!(acl_name = %acl_name, "equivalence declined");
            return Err(KeywardError::UserCanceled);
        }

        let name = existing.unwrap_or_else(|| process.canonical_name());
        match db.confirm_link(acl_hash, &process_hash, &name, uid)? {
            LinkCheck::Linked | LinkCheck::AlreadyEquivalent => Ok(CodeVerdict::Accept),
            LinkCheck::Conflict {
                acl_name,
                process_name,
            } => Ok(ambiguous(acl_name, process_name)),
        }
    }
}

enum Resolved {
    Agree,
    Disagree(CodeVerdict),
    /// At most one side resolved; carries its name.
    Partial(Option<String>),
}

fn resolve_pair(
    db: &crate::equivalence::EquivalenceDatabase,
    acl_hash: &LegacyHash,
    process_hash: &LegacyHash,
    uid: u32,
) -> Result<Resolved, KeywardError> {
    let acl_name = db.lookup(acl_hash, uid)?;
    let process_name = db.lookup(process_hash, uid)?;
    Ok(match (acl_name, process_name) {
        (Some(a), Some(p)) if a == p => Resolved::Agree,
        (Some(a), Some(p)) => Resolved::Disagree(ambiguous(a, p)),
        (a, p) => Resolved::Partial(a.or(p)),
    })
}

fn ambiguous(acl_name: String, process_name: String) -> CodeVerdict {
    warn!(
        acl_name = %acl_name,
        process_name = %process_name,
        "legacy hashes resolve to different applications"
    );
    CodeVerdict::Ambiguous {
        acl_name,
        process_name,
    }
}
