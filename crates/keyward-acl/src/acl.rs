// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ACL engine: an owner subject plus tagged entries.

use std::collections::BTreeSet;

use keyward_codesign::{CodeSubject, ProcessIdentity};
use keyward_core::{AuthorizationTag, Credentials, KeywardError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::{AclEnvironment, Outcome, ValidationContext};
use crate::subject::Subject;

/// Tags granted by the usage entry of [`Acl::standard`].
pub const USAGE_TAGS: &[AuthorizationTag] = &[
    AuthorizationTag::Decrypt,
    AuthorizationTag::Encrypt,
    AuthorizationTag::Sign,
    AuthorizationTag::Verify,
    AuthorizationTag::Derive,
    AuthorizationTag::ExportWrapped,
];

/// One ACL entry: which operations it covers and who may perform them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// `None` covers every tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<AuthorizationTag>>,
    pub subject: Subject,
}

impl Entry {
    pub fn unrestricted(subject: Subject) -> Self {
        Self { tags: None, subject }
    }

    pub fn for_tags(tags: impl IntoIterator<Item = AuthorizationTag>, subject: Subject) -> Self {
        Self {
            tags: Some(tags.into_iter().collect()),
            subject,
        }
    }

    pub fn authorizes(&self, tag: AuthorizationTag) -> bool {
        self.tags.as_ref().is_none_or(|tags| tags.contains(&tag))
    }
}

/// Insert `subject` at the front of a canonical-shaped entry.
///
/// Returns `None`, leaving the caller's entry alone, when the entry's subject
/// is not a threshold ending in a prompt or already lists `subject`.
pub fn try_upgrade(entry: &Entry, subject: Subject) -> Option<Entry> {
    let Subject::Threshold { required, subjects } = &entry.subject else {
        return None;
    };
    if !matches!(subjects.last(), Some(Subject::Prompted { .. })) || subjects.contains(&subject) {
        return None;
    }
    let mut upgraded = Vec::with_capacity(subjects.len() + 1);
    upgraded.push(subject);
    upgraded.extend(subjects.iter().cloned());
    Some(Entry {
        tags: entry.tags.clone(),
        subject: Subject::Threshold {
            required: *required,
            subjects: upgraded,
        },
    })
}

/// An administrative change to an entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclEdit {
    Add(Entry),
    Replace { index: usize, entry: Entry },
    Remove { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    owner: Subject,
    entries: Vec<Entry>,
}

impl Acl {
    pub fn new(owner: Subject, entries: Vec<Entry>) -> Result<Self, KeywardError> {
        owner.check()?;
        entries.iter().try_for_each(|e| e.subject.check())?;
        Ok(Self { owner, entries })
    }

    /// Default store ACL: anyone may administer and use it once unlocked.
    pub fn open() -> Self {
        Self {
            owner: Subject::Any,
            entries: vec![Entry::unrestricted(Subject::Any)],
        }
    }

    /// Default key ACL: the creating application, or whoever the user allows.
    ///
    /// The usage entry comes first and has the canonical shape, so "always
    /// allow" answers add the requesting application to it.
    pub fn standard(creator: Option<CodeSubject>, description: &str) -> Self {
        let mut usage = Vec::with_capacity(2);
        if let Some(code) = creator {
            usage.push(Subject::code(code));
        }
        usage.push(Subject::prompted(description));
        let admin = Subject::prompted(format!("{description} (change access)"));
        Self {
            owner: admin.clone(),
            entries: vec![
                Entry::for_tags(
                    USAGE_TAGS.iter().copied(),
                    Subject::Threshold {
                        required: 1,
                        subjects: usage,
                    },
                ),
                Entry::for_tags(
                    [
                        AuthorizationTag::ExportClear,
                        AuthorizationTag::Delete,
                        AuthorizationTag::ChangeAcl,
                        AuthorizationTag::ChangeOwner,
                    ],
                    admin,
                ),
            ],
        }
    }

    pub fn owner(&self) -> &Subject {
        &self.owner
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Grant or deny `tag` for this request.
    ///
    /// A denial is [`KeywardError::AuthenticationDenied`], or
    /// [`KeywardError::AmbiguousEquivalenceMatch`] when that is the reason
    /// nothing matched. [`KeywardError::UserCanceled`] aborts immediately.
    pub fn validate(
        &self,
        tag: AuthorizationTag,
        credentials: &Credentials,
        process: &ProcessIdentity<'_>,
        env: AclEnvironment<'_>,
    ) -> Result<Outcome, KeywardError> {
        let mut ctx = ValidationContext::new(tag, credentials, process, env);
        if !self.evaluate(&mut ctx)? {
            debug!(%tag, "ACL denied request");
            return Err(ctx.denial());
        }
        Ok(outcome(ctx.upgrades))
    }

    /// Check the owner subject, as required for ACL and owner changes.
    pub fn authorize_owner(
        &self,
        credentials: &Credentials,
        process: &ProcessIdentity<'_>,
        env: AclEnvironment<'_>,
    ) -> Result<Outcome, KeywardError> {
        let mut ctx =
            ValidationContext::new(AuthorizationTag::ChangeAcl, credentials, process, env);
        if !self.owner.validate(&mut ctx)? {
            debug!("ACL owner check failed");
            return Err(ctx.denial());
        }
        Ok(outcome(ctx.upgrades))
    }

    pub(crate) fn evaluate(&self, ctx: &mut ValidationContext<'_>) -> Result<bool, KeywardError> {
        let tag = ctx.tag();
        for entry in self.entries.iter().filter(|e| e.authorizes(tag)) {
            if self.group_upgrade(entry, ctx) {
                return Ok(true);
            }
            if ctx.attempt(|ctx| entry.subject.validate(ctx))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn group_upgrade(&self, entry: &Entry, ctx: &mut ValidationContext<'_>) -> bool {
        let (Some(heuristic), Some(verifier)) = (ctx.env.heuristic, ctx.env.verifier) else {
            return false;
        };
        if !heuristic.qualifies(&entry.subject)
            || !heuristic.satisfied_by(ctx.process, verifier.provider().as_ref())
        {
            return false;
        }
        debug!(tag = %ctx.tag(), "well-known group member accepted");
        ctx.upgrades.push(heuristic.group_subject());
        true
    }

    /// Apply the self-modification rule for each subject. Returns whether the
    /// ACL changed.
    pub fn apply_upgrades(&mut self, upgrades: &[Subject]) -> bool {
        let mut changed = false;
        for subject in upgrades {
            let Some(first) = self.entries.first_mut() else {
                break;
            };
            if let Some(upgraded) = try_upgrade(first, subject.clone()) {
                *first = upgraded;
                changed = true;
            }
        }
        if changed {
            warn!(added = upgrades.len(), "ACL rewritten by validation");
        }
        changed
    }

    pub fn apply_edit(&mut self, edit: AclEdit) -> Result<(), KeywardError> {
        match edit {
            AclEdit::Add(entry) => {
                entry.subject.check()?;
                self.entries.push(entry);
            }
            AclEdit::Replace { index, entry } => {
                entry.subject.check()?;
                let len = self.entries.len();
                let slot = self.entries.get_mut(index).ok_or_else(|| bad_index(index, len))?;
                *slot = entry;
            }
            AclEdit::Remove { index } => {
                if index >= self.entries.len() {
                    return Err(bad_index(index, self.entries.len()));
                }
                self.entries.remove(index);
            }
        }
        Ok(())
    }

    pub fn set_owner(&mut self, owner: Subject) -> Result<(), KeywardError> {
        owner.check()?;
        self.owner = owner;
        Ok(())
    }

    /// Encode as the public ACL section of a blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, KeywardError> {
        serde_json::to_vec(self).map_err(|e| KeywardError::Internal(format!("ACL encode: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeywardError> {
        let acl: Self = serde_json::from_slice(bytes)
            .map_err(|e| KeywardError::MalformedBlob(format!("ACL section: {e}")))?;
        acl.owner
            .check()
            .and_then(|()| acl.entries.iter().try_for_each(|e| e.subject.check()))
            .map_err(|e| KeywardError::MalformedBlob(format!("ACL section: {e}")))?;
        Ok(acl)
    }
}

fn outcome(upgrades: Vec<Subject>) -> Outcome {
    if upgrades.is_empty() {
        Outcome::Granted
    } else {
        Outcome::GrantedAclRewritten { upgrades }
    }
}

fn bad_index(index: usize, len: usize) -> KeywardError {
    KeywardError::InvalidAclSubjectValue(format!("entry index {index} out of range ({len} entries)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::LegacyGroupHeuristic;
    use crate::subject::SecretDigest;
    use keyward_codesign::{CodeIdentityVerifier, EquivalenceSource};
    use keyward_config::LegacyGroupConfig;
    use keyward_core::{LegacyHash, ProcessContext, Requirement};
    use keyward_crypto::RingCryptoProvider;
    use keyward_test_utils::{ScriptedAgent, Signer, signed_process, unsigned_process};
    use proptest::prelude::*;
    use secrecy::SecretString;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn secret(pass: &str) -> Subject {
        Subject::Secret {
            secret: SecretDigest::with_salt(&SecretString::from(pass), [7; 16]),
        }
    }

    fn creds(passes: &[&str]) -> Credentials {
        passes
            .iter()
            .fold(Credentials::none(), |c, p| c.with_passphrase(*p))
    }

    fn tool() -> ProcessContext {
        unsigned_process("/opt/Tool.app", 3)
    }

    fn canonical(description: &str) -> Acl {
        Acl::new(
            Subject::Any,
            vec![Entry::unrestricted(
                Subject::threshold(
                    1,
                    vec![
                        Subject::code(CodeSubject::legacy(LegacyHash([1; 20]), "/a/Mail.app")),
                        Subject::prompted(description),
                    ],
                )
                .unwrap(),
            )],
        )
        .unwrap()
    }

    #[test]
    fn threshold_two_of_three_all_combinations() {
        let acl = Acl::new(
            Subject::Any,
            vec![Entry::unrestricted(
                Subject::threshold(2, vec![secret("a"), secret("b"), secret("c")]).unwrap(),
            )],
        )
        .unwrap();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);

        for mask in 0u8..8 {
            let offered: Vec<&str> = ["a", "b", "c"]
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, p)| *p)
                .collect();
            let result = acl.validate(
                AuthorizationTag::Decrypt,
                &creds(&offered),
                &process,
                AclEnvironment::default(),
            );
            if mask.count_ones() >= 2 {
                assert_eq!(result.unwrap(), Outcome::Granted, "mask {mask:03b}");
            } else {
                assert!(
                    matches!(result, Err(KeywardError::AuthenticationDenied)),
                    "mask {mask:03b}"
                );
            }
        }
    }

    #[test]
    fn entries_are_selected_by_tag() {
        let acl = Acl::new(
            Subject::Any,
            vec![Entry::for_tags([AuthorizationTag::Sign], Subject::Any)],
        )
        .unwrap();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let none = Credentials::none();
        let env = AclEnvironment::default();

        assert!(acl.validate(AuthorizationTag::Sign, &none, &process, env).is_ok());
        assert!(matches!(
            acl.validate(AuthorizationTag::Decrypt, &none, &process, env),
            Err(KeywardError::AuthenticationDenied)
        ));
    }

    #[test]
    fn try_upgrade_only_touches_canonical_shape() {
        let acl = canonical("use");
        let new = Subject::code(CodeSubject::legacy(LegacyHash([2; 20]), "/b/Tool.app"));

        let upgraded = try_upgrade(&acl.entries()[0], new.clone()).unwrap();
        let Subject::Threshold { subjects, required } = &upgraded.subject else {
            panic!("shape changed");
        };
        assert_eq!(*required, 1);
        assert_eq!(subjects.len(), 3);
        assert_eq!(subjects[0], new);
        assert!(try_upgrade(&upgraded, new.clone()).is_none());

        assert!(try_upgrade(&Entry::unrestricted(Subject::Any), new.clone()).is_none());
        let prompt_first = Entry::unrestricted(
            Subject::threshold(1, vec![Subject::prompted("x"), Subject::Any]).unwrap(),
        );
        assert!(try_upgrade(&prompt_first, new).is_none());
    }

    #[traced_test]
    #[test]
    fn remembered_prompt_rewrites_first_entry() {
        let mut acl = canonical("use");
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let agent = ScriptedAgent::new().allow(true);
        let verifier = CodeIdentityVerifier::new(
            Arc::new(RingCryptoProvider::new(None)),
            EquivalenceSource::None,
            Requirement::VendorAnchor,
        );
        let env = AclEnvironment::default()
            .with_agent(&agent)
            .with_verifier(&verifier);

        let outcome = acl
            .validate(AuthorizationTag::Decrypt, &Credentials::none(), &process, env)
            .unwrap();
        let Outcome::GrantedAclRewritten { upgrades } = &outcome else {
            panic!("expected a rewrite, got {outcome:?}");
        };
        assert_eq!(
            upgrades[0],
            Subject::code(CodeSubject::legacy(LegacyHash([3; 20]), "/opt/Tool.app"))
        );
        assert!(acl.apply_upgrades(outcome.upgrades()));
        assert!(logs_contain("ACL rewritten"));
        // Applying again is a no-op.
        assert!(!acl.apply_upgrades(outcome.upgrades()));

        // Second request matches the inserted subject without prompting.
        let again = acl
            .validate(AuthorizationTag::Decrypt, &Credentials::none(), &process, env)
            .unwrap();
        assert_eq!(again, Outcome::Granted);
        assert_eq!(agent.access_prompts(), 1);
    }

    #[test]
    fn failed_entry_proposes_no_upgrade() {
        let mut acl = Acl::new(
            Subject::Any,
            vec![
                Entry::unrestricted(
                    Subject::threshold(2, vec![secret("s"), Subject::prompted("use")]).unwrap(),
                ),
                Entry::for_tags([AuthorizationTag::Decrypt], Subject::Any),
            ],
        )
        .unwrap();
        let before = acl.clone();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let agent = ScriptedAgent::new().allow(true).allow(false);
        let env = AclEnvironment::default().with_agent(&agent);
        let none = Credentials::none();

        let outcome = acl
            .validate(AuthorizationTag::Decrypt, &none, &process, env)
            .unwrap();
        assert_eq!(outcome, Outcome::Granted);
        assert!(!acl.apply_upgrades(outcome.upgrades()));
        assert_eq!(acl, before);

        assert!(matches!(
            acl.validate(AuthorizationTag::Sign, &none, &process, env),
            Err(KeywardError::AuthenticationDenied)
        ));
        assert_eq!(agent.access_prompts(), 2);
    }

    #[test]
    fn failed_inner_threshold_drops_its_upgrades() {
        let inner = Subject::threshold(2, vec![Subject::prompted("inner"), secret("s")]).unwrap();
        let acl = Acl::new(
            Subject::Any,
            vec![Entry::unrestricted(
                Subject::threshold(1, vec![inner, Subject::Any]).unwrap(),
            )],
        )
        .unwrap();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let agent = ScriptedAgent::new().allow(true);
        let env = AclEnvironment::default().with_agent(&agent);

        let outcome = acl
            .validate(AuthorizationTag::Decrypt, &Credentials::none(), &process, env)
            .unwrap();
        assert_eq!(outcome, Outcome::Granted);
        assert_eq!(agent.access_prompts(), 1);
    }

    #[test]
    fn one_time_allow_and_deny_and_cancel() {
        let acl = canonical("use");
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let none = Credentials::none();

        let agent = ScriptedAgent::new().allow(false).deny().cancel_access();
        let env = AclEnvironment::default().with_agent(&agent);
        assert_eq!(
            acl.validate(AuthorizationTag::Decrypt, &none, &process, env).unwrap(),
            Outcome::Granted
        );
        assert!(matches!(
            acl.validate(AuthorizationTag::Decrypt, &none, &process, env),
            Err(KeywardError::AuthenticationDenied)
        ));
        assert!(matches!(
            acl.validate(AuthorizationTag::Decrypt, &none, &process, env),
            Err(KeywardError::UserCanceled)
        ));
    }

    #[test]
    fn preauthorized_defers_to_store_acl_once() {
        let store_acl = Acl::new(Subject::Any, vec![Entry::unrestricted(secret("store"))]).unwrap();
        let key_acl = Acl::new(Subject::Any, vec![Entry::unrestricted(Subject::PreAuthorized)]).unwrap();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let env = AclEnvironment::default().with_preauthorized(&store_acl);

        assert!(key_acl
            .validate(AuthorizationTag::Sign, &creds(&["store"]), &process, env)
            .is_ok());
        assert!(key_acl
            .validate(AuthorizationTag::Sign, &creds(&["wrong"]), &process, env)
            .is_err());
        assert!(key_acl
            .validate(AuthorizationTag::Sign, &creds(&["store"]), &process, AclEnvironment::default())
            .is_err());

        // A pre-authorizing ACL that itself defers does not recurse.
        let self_ref = Acl::new(Subject::Any, vec![Entry::unrestricted(Subject::PreAuthorized)]).unwrap();
        let env = AclEnvironment::default().with_preauthorized(&self_ref);
        assert!(self_ref
            .validate(AuthorizationTag::Sign, &Credentials::none(), &process, env)
            .is_err());
    }

    #[test]
    fn owner_guards_administration() {
        let acl = Acl::new(secret("admin"), vec![Entry::unrestricted(Subject::Any)]).unwrap();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let env = AclEnvironment::default();
        assert!(acl.authorize_owner(&creds(&["admin"]), &process, env).is_ok());
        assert!(matches!(
            acl.authorize_owner(&creds(&["guest"]), &process, env),
            Err(KeywardError::AuthenticationDenied)
        ));
    }

    #[test]
    fn edits_validate_indices_and_subjects() {
        let mut acl = Acl::open();
        acl.apply_edit(AclEdit::Add(Entry::unrestricted(secret("x")))).unwrap();
        assert_eq!(acl.entries().len(), 2);

        acl.apply_edit(AclEdit::Replace {
            index: 1,
            entry: Entry::for_tags([AuthorizationTag::Sign], Subject::Any),
        })
        .unwrap();
        assert!(matches!(
            acl.apply_edit(AclEdit::Remove { index: 5 }),
            Err(KeywardError::InvalidAclSubjectValue(_))
        ));
        let bad = Entry::unrestricted(Subject::Threshold {
            required: 4,
            subjects: vec![Subject::Any],
        });
        assert!(matches!(
            acl.apply_edit(AclEdit::Add(bad)),
            Err(KeywardError::InvalidAclSubjectValue(_))
        ));
        acl.apply_edit(AclEdit::Remove { index: 0 }).unwrap();
        assert_eq!(acl.entries().len(), 1);
        assert!(acl.set_owner(Subject::Threshold { required: 0, subjects: vec![] }).is_err());
    }

    #[test]
    fn acl_section_roundtrip_and_malformed_input() {
        let acl = Acl::standard(
            Some(CodeSubject::requirement(Requirement::parse("identifier \"com.example.tool\"").unwrap())),
            "Tool key",
        );
        let bytes = acl.to_bytes().unwrap();
        assert_eq!(Acl::from_bytes(&bytes).unwrap(), acl);
        assert!(acl.entries()[0].subject.is_canonical());

        assert!(matches!(Acl::from_bytes(b"{not json"), Err(KeywardError::MalformedBlob(_))));
        let invalid = br#"{"owner":{"type":"threshold","required":2,"subjects":[]},"entries":[]}"#;
        assert!(matches!(Acl::from_bytes(invalid), Err(KeywardError::MalformedBlob(_))));
    }

    #[test]
    fn deeply_nested_requirement_is_a_malformed_section() {
        let acl = Acl::new(
            Subject::code(CodeSubject::requirement(Requirement::Always)),
            vec![Entry::unrestricted(Subject::Any)],
        )
        .unwrap();
        let text = String::from_utf8(acl.to_bytes().unwrap()).unwrap();
        assert_eq!(text.matches("\"always\"").count(), 1);

        let deep = format!("\"{}always\"", "!".repeat(200_000));
        let crafted = text.replacen("\"always\"", &deep, 1);
        assert!(matches!(
            Acl::from_bytes(crafted.as_bytes()),
            Err(KeywardError::MalformedBlob(_))
        ));
    }

    #[test]
    fn well_known_group_member_is_upgraded() {
        let vendor = Signer::generate();
        let provider = Arc::new(RingCryptoProvider::new(Some(vendor.public_key())));
        let verifier =
            CodeIdentityVerifier::new(provider, EquivalenceSource::None, Requirement::VendorAnchor);
        let heuristic = LegacyGroupHeuristic::from_config(&LegacyGroupConfig::default())
            .unwrap()
            .unwrap();

        let mut subjects: Vec<Subject> = LegacyGroupConfig::default()
            .paths
            .iter()
            .enumerate()
            .map(|(i, p)| Subject::code(CodeSubject::legacy(LegacyHash([i as u8; 20]), p.clone())))
            .collect();
        subjects.push(Subject::prompted("suite data"));
        let mut acl = Acl::new(
            Subject::Any,
            vec![Entry::unrestricted(Subject::threshold(1, subjects).unwrap())],
        )
        .unwrap();

        let member = signed_process(&vendor, "com.example.maps", Some("keyward.apps"), "/opt/Maps.app", 0x44);
        let process = ProcessIdentity::new(&member);
        let env = AclEnvironment::default()
            .with_verifier(&verifier)
            .with_heuristic(&heuristic);
        let outcome = acl
            .validate(AuthorizationTag::Decrypt, &Credentials::none(), &process, env)
            .unwrap();
        assert_eq!(outcome.upgrades(), &[heuristic.group_subject()]);
        assert!(acl.apply_upgrades(outcome.upgrades()));

        let outsider = signed_process(&vendor, "com.example.maps", None, "/opt/Maps.app", 0x44);
        let process = ProcessIdentity::new(&outsider);
        assert!(acl
            .validate(AuthorizationTag::Decrypt, &Credentials::none(), &process, AclEnvironment::default().with_verifier(&verifier).with_heuristic(&heuristic))
            .is_err());
    }

    #[test]
    fn ambiguous_equivalence_is_reported_when_nothing_grants() {
        use keyward_codesign::{EquivalenceDatabase, LinkScope};

        let db = Arc::new(EquivalenceDatabase::open_in_memory().unwrap());
        db.set_link(&LegacyHash([1; 20]), "Mail", LinkScope::System).unwrap();
        db.set_link(&LegacyHash([3; 20]), "Tool", LinkScope::System).unwrap();
        let verifier = CodeIdentityVerifier::new(
            Arc::new(RingCryptoProvider::new(None)),
            EquivalenceSource::Fixed(db),
            Requirement::VendorAnchor,
        );
        let acl = Acl::new(
            Subject::Any,
            vec![Entry::unrestricted(Subject::code(CodeSubject::legacy(
                LegacyHash([1; 20]),
                "/a/Mail.app",
            )))],
        )
        .unwrap();
        let ctx = tool();
        let process = ProcessIdentity::new(&ctx);
        let err = acl
            .validate(
                AuthorizationTag::Decrypt,
                &Credentials::none(),
                &process,
                AclEnvironment::default().with_verifier(&verifier),
            )
            .unwrap_err();
        assert!(matches!(err, KeywardError::AmbiguousEquivalenceMatch { .. }));
    }

    fn leaf() -> impl Strategy<Value = Subject> {
        prop_oneof![
            Just(Subject::Any),
            Just(secret("a")),
            Just(secret("b")),
            Just(Subject::prompted("ask")),
            Just(Subject::PreAuthorized),
            Just(Subject::code(CodeSubject::legacy(LegacyHash([8; 20]), "/x/App.app"))),
        ]
    }

    fn subject() -> impl Strategy<Value = Subject> {
        leaf().prop_recursive(3, 16, 4, |inner| {
            prop::collection::vec(inner, 1..4).prop_flat_map(|subjects| {
                let n = subjects.len();
                (1..=n).prop_map(move |required| Subject::Threshold {
                    required,
                    subjects: subjects.clone(),
                })
            })
        })
    }

    fn entry() -> impl Strategy<Value = Entry> {
        let tags = prop::option::of(prop::collection::btree_set(
            prop::sample::select(vec![
                AuthorizationTag::Decrypt,
                AuthorizationTag::Sign,
                AuthorizationTag::Delete,
            ]),
            1..3,
        ));
        (tags, subject()).prop_map(|(tags, subject)| Entry { tags, subject })
    }

    proptest! {
        /// Adding an entry never takes away access.
        #[test]
        fn added_entry_is_monotonic(
            entries in prop::collection::vec(entry(), 0..4),
            extra in entry(),
            offer_a in any::<bool>(),
            offer_b in any::<bool>(),
        ) {
            let mut offered = Vec::new();
            if offer_a { offered.push("a"); }
            if offer_b { offered.push("b"); }
            let credentials = creds(&offered);
            let ctx = tool();
            let process = ProcessIdentity::new(&ctx);
            let env = AclEnvironment::default();

            let base = Acl::new(Subject::Any, entries).unwrap();
            let mut widened = base.clone();
            widened.apply_edit(AclEdit::Add(extra)).unwrap();
            let mut open = base.clone();
            open.apply_edit(AclEdit::Add(Entry::unrestricted(Subject::Any))).unwrap();

            for tag in [AuthorizationTag::Decrypt, AuthorizationTag::Sign, AuthorizationTag::Delete] {
                let before = base.validate(tag, &credentials, &process, env).is_ok();
                if before {
                    prop_assert!(widened.validate(tag, &credentials, &process, env).is_ok());
                }
                prop_assert!(open.validate(tag, &credentials, &process, env).is_ok());
            }
        }
    }
}
