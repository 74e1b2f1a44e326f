// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request validation state.

use keyward_codesign::{CodeIdentityVerifier, ProcessIdentity};
use keyward_core::{AuthorizationTag, Credentials, InteractiveAgent, KeywardError};

use crate::acl::Acl;
use crate::heuristic::LegacyGroupHeuristic;
use crate::subject::Subject;

/// Collaborators a validation may consult. Every field is optional; a
/// missing collaborator makes the subjects that need it fail closed.
#[derive(Clone, Copy, Default)]
pub struct AclEnvironment<'a> {
    pub verifier: Option<&'a CodeIdentityVerifier>,
    pub agent: Option<&'a dyn InteractiveAgent>,
    pub heuristic: Option<&'a LegacyGroupHeuristic>,
    /// ACL consulted by [`Subject::PreAuthorized`], normally the owning store's.
    pub preauthorized: Option<&'a Acl>,
}

impl<'a> AclEnvironment<'a> {
    pub fn with_verifier(mut self, verifier: &'a CodeIdentityVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_agent(mut self, agent: &'a dyn InteractiveAgent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_heuristic(mut self, heuristic: &'a LegacyGroupHeuristic) -> Self {
        self.heuristic = Some(heuristic);
        self
    }

    pub fn with_preauthorized(mut self, acl: &'a Acl) -> Self {
        self.preauthorized = Some(acl);
        self
    }
}

/// State carried through one `validate` call.
pub struct ValidationContext<'a> {
    pub(crate) tag: AuthorizationTag,
    pub(crate) credentials: &'a Credentials,
    pub(crate) process: &'a ProcessIdentity<'a>,
    pub(crate) env: AclEnvironment<'a>,
    /// Subjects to insert through the self-modification rule if access is granted.
    pub(crate) upgrades: Vec<Subject>,
    /// First disagreeing equivalence pair seen, reported if nothing else grants.
    pub(crate) ambiguous: Option<(String, String)>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        tag: AuthorizationTag,
        credentials: &'a Credentials,
        process: &'a ProcessIdentity<'a>,
        env: AclEnvironment<'a>,
    ) -> Self {
        Self {
            tag,
            credentials,
            process,
            env,
            upgrades: Vec::new(),
            ambiguous: None,
        }
    }

    pub fn tag(&self) -> AuthorizationTag {
        self.tag
    }

    /// Run `acl` for the same request, without a further pre-authorizing ACL.
    pub(crate) fn validate_preauthorized(&mut self, acl: &Acl) -> Result<bool, KeywardError> {
        let env = AclEnvironment {
            preauthorized: None,
            ..self.env
        };
        let mut nested = ValidationContext::new(self.tag, self.credentials, self.process, env);
        let granted = acl.evaluate(&mut nested)?;
        if nested.ambiguous.is_some() && self.ambiguous.is_none() {
            self.ambiguous = nested.ambiguous;
        }
        // Upgrades found while checking the store's ACL belong to the store, not here.
        Ok(granted)
    }

    /// Run one alternative. Upgrades it proposed are kept only if it held.
    pub(crate) fn attempt(
        &mut self,
        check: impl FnOnce(&mut Self) -> Result<bool, KeywardError>,
    ) -> Result<bool, KeywardError> {
        let start = self.upgrades.len();
        let held = check(self)?;
        if !held {
            self.upgrades.truncate(start);
        }
        Ok(held)
    }

    pub(crate) fn denial(&self) -> KeywardError {
        match &self.ambiguous {
            Some((acl_name, process_name)) => KeywardError::AmbiguousEquivalenceMatch {
                acl_name: acl_name.clone(),
                process_name: process_name.clone(),
            },
            None => KeywardError::AuthenticationDenied,
        }
    }
}

/// A granted validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Granted,
    /// Granted, and these subjects should be inserted with
    /// [`Acl::apply_upgrades`]. The holder bumps its version when that
    /// changes anything.
    GrantedAclRewritten { upgrades: Vec<Subject> },
}

impl Outcome {
    pub fn upgrades(&self) -> &[Subject] {
        match self {
            Self::Granted => &[],
            Self::GrantedAclRewritten { upgrades } => upgrades,
        }
    }
}
