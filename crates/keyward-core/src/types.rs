// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common value types used across stores, keys, ACLs and code identity checks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};
use zeroize::Zeroizing;

use crate::code::CodeSignature;
use crate::error::KeywardError;

/// Length of a store's random signature in bytes.
pub const STORE_SIGNATURE_LEN: usize = 16;

/// Length of a legacy (SHA-1) code hash in bytes.
pub const LEGACY_HASH_LEN: usize = 20;

/// Length of the salt fed to every key derivation.
pub const SALT_LEN: usize = 16;

/// An operation an ACL entry may authorize.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationTag {
    Decrypt,
    Encrypt,
    Sign,
    Verify,
    Derive,
    ExportClear,
    ExportWrapped,
    Delete,
    ChangeAcl,
    ChangeOwner,
    Unlock,
    ChangePassphrase,
}

/// Random identity assigned to a store at creation and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreSignature(pub [u8; STORE_SIGNATURE_LEN]);

impl fmt::Display for StoreSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for StoreSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreSignature({self})")
    }
}

/// Legacy code identity: SHA-1 over the executable image.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyHash(pub [u8; LEGACY_HASH_LEN]);

impl LegacyHash {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, KeywardError> {
        let bytes = hex::decode(s)
            .map_err(|e| KeywardError::InvalidAclSubjectValue(format!("legacy hash: {e}")))?;
        let arr: [u8; LEGACY_HASH_LEN] = bytes.try_into().map_err(|_| {
            KeywardError::InvalidAclSubjectValue("legacy hash must be 20 bytes".to_string())
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for LegacyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for LegacyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LegacyHash({self})")
    }
}

impl Serialize for LegacyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LegacyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        LegacyHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Whether a store belongs to a user session or to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StoreScope {
    User,
    System,
}

/// Name and scope of a store as chosen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreName {
    pub name: String,
    pub scope: StoreScope,
}

impl StoreName {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: StoreScope::User,
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: StoreScope::System,
        }
    }

    pub fn is_system(&self) -> bool {
        self.scope == StoreScope::System
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Per-store parameters persisted in the blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreParams {
    /// Seconds of inactivity before the store locks itself. Zero disables idle locking.
    pub idle_timeout_secs: u32,
    /// Lock when the system goes to sleep.
    pub lock_on_sleep: bool,
}

impl StoreParams {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(u64::from(self.idle_timeout_secs)))
    }
}

impl Default for StoreParams {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            lock_on_sleep: true,
        }
    }
}

/// Argon2id cost parameters, recorded alongside the salt in every store blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// How far a stored blob's KDF costs may exceed the configured ones.
pub const KDF_CEILING_FACTOR: u32 = 4;

impl KdfParams {
    /// Whether `stored` stays within [`KDF_CEILING_FACTOR`] times these costs.
    pub fn admits(&self, stored: &KdfParams) -> bool {
        let ceiling = |configured: u32| configured.max(1).saturating_mul(KDF_CEILING_FACTOR);
        stored.memory_cost <= ceiling(self.memory_cost)
            && stored.iterations <= ceiling(self.iterations)
            && stored.parallelism <= ceiling(self.parallelism)
    }
}

/// Kind of explicit key material offered as a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum KeyMaterialKind {
    Symmetric,
    Asymmetric,
}

/// One way of proving knowledge of a store's secret.
pub enum CredentialSample {
    /// Ask the interactive agent.
    Interactive,
    /// An explicit passphrase.
    Passphrase(SecretString),
    /// Explicit raw key material.
    KeyMaterial {
        kind: KeyMaterialKind,
        material: Zeroizing<Vec<u8>>,
    },
    /// Suppress the default interactive action without granting anything.
    Cancel,
}

impl fmt::Debug for CredentialSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => f.write_str("Interactive"),
            Self::Passphrase(_) => f.write_str("Passphrase([REDACTED])"),
            Self::KeyMaterial { kind, .. } => write!(f, "KeyMaterial({kind}, [REDACTED])"),
            Self::Cancel => f.write_str("Cancel"),
        }
    }
}

/// Ordered credential samples supplied with a request.
///
/// An empty set means "take the default action", which for user stores is an
/// interactive prompt.
#[derive(Debug, Default)]
pub struct Credentials {
    samples: Vec<CredentialSample>,
}

impl Credentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn passphrase(passphrase: impl Into<String>) -> Self {
        Self::none().with_passphrase(passphrase)
    }

    pub fn interactive() -> Self {
        Self::none().with(CredentialSample::Interactive)
    }

    pub fn cancel() -> Self {
        Self::none().with(CredentialSample::Cancel)
    }

    pub fn key_material(kind: KeyMaterialKind, material: &[u8]) -> Self {
        Self::none().with(CredentialSample::KeyMaterial {
            kind,
            material: Zeroizing::new(material.to_vec()),
        })
    }

    pub fn with(mut self, sample: CredentialSample) -> Self {
        self.samples.push(sample);
        self
    }

    pub fn with_passphrase(self, passphrase: impl Into<String>) -> Self {
        self.with(CredentialSample::Passphrase(SecretString::from(
            passphrase.into(),
        )))
    }

    pub fn samples(&self) -> &[CredentialSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate over the explicit passphrases in this set.
    pub fn passphrases(&self) -> impl Iterator<Item = &SecretString> {
        self.samples.iter().filter_map(|s| match s {
            CredentialSample::Passphrase(p) => Some(p),
            _ => None,
        })
    }
}

/// What the daemon knows about the process issuing a request.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub pid: u32,
    pub uid: u32,
    pub path: PathBuf,
    pub bundle_name: Option<String>,
    pub signature: Option<CodeSignature>,
    /// Precomputed legacy hash; computed from `path` on demand when absent.
    pub legacy_hash: Option<LegacyHash>,
}

impl ProcessContext {
    pub fn new(pid: u32, uid: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            uid,
            path: path.into(),
            bundle_name: None,
            signature: None,
            legacy_hash: None,
        }
    }

    pub fn with_signature(mut self, signature: CodeSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_legacy_hash(mut self, hash: LegacyHash) -> Self {
        self.legacy_hash = Some(hash);
        self
    }

    pub fn with_bundle_name(mut self, name: impl Into<String>) -> Self {
        self.bundle_name = Some(name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_privileged(&self) -> bool {
        self.uid == 0
    }
}
