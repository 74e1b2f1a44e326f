// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trust upgrade for entries that list most of a well-known application group.
//!
//! Entries written before code signing name each application of a suite by
//! legacy hash. When an entry names at least `threshold` members of the
//! configured path set, any process meeting the group requirement is let in
//! and the entry gains a group-level code subject.

use std::collections::BTreeSet;

use keyward_codesign::{CodeSubject, ProcessIdentity};
use keyward_config::LegacyGroupConfig;
use keyward_core::{CodeCheck, CryptoProvider, KeywardError, Requirement};

use crate::subject::Subject;

#[derive(Debug, Clone)]
pub struct LegacyGroupHeuristic {
    threshold: usize,
    paths: BTreeSet<String>,
    requirement: Requirement,
}

impl LegacyGroupHeuristic {
    pub fn new(
        threshold: usize,
        paths: impl IntoIterator<Item = String>,
        requirement: Requirement,
    ) -> Result<Self, KeywardError> {
        let paths: BTreeSet<String> = paths.into_iter().collect();
        if threshold == 0 || threshold > paths.len() {
            return Err(KeywardError::Config(format!(
                "legacy group threshold {threshold} outside 1..={}",
                paths.len()
            )));
        }
        Ok(Self {
            threshold,
            paths,
            requirement,
        })
    }

    /// `None` when the heuristic is disabled.
    pub fn from_config(config: &LegacyGroupConfig) -> Result<Option<Self>, KeywardError> {
        if !config.enabled {
            return Ok(None);
        }
        let requirement = Requirement::parse(&config.group_requirement)?;
        Self::new(config.threshold, config.paths.iter().cloned(), requirement).map(Some)
    }

    /// Whether `subject` lists enough distinct well-known applications.
    pub fn qualifies(&self, subject: &Subject) -> bool {
        let Subject::Threshold { subjects, .. } = subject else {
            return false;
        };
        let listed: BTreeSet<&str> = subjects
            .iter()
            .filter_map(|s| match s {
                Subject::CodeIdentity {
                    code: CodeSubject::Legacy { path, .. },
                } => Some(path.as_str()),
                _ => None,
            })
            .filter(|path| self.paths.contains(*path))
            .collect();
        listed.len() >= self.threshold
    }

    pub fn satisfied_by(&self, process: &ProcessIdentity<'_>, provider: &dyn CryptoProvider) -> bool {
        provider.check_code(process.signature(), &self.requirement) == CodeCheck::Accept
    }

    /// The subject inserted into a qualifying entry.
    pub fn group_subject(&self) -> Subject {
        Subject::code(CodeSubject::requirement(self.requirement.clone()))
    }
}
