// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every Keyward crate.

use thiserror::Error;

/// The primary error type returned by store, key, ACL and code identity operations.
///
/// The first five variants are the outcomes callers are expected to branch on.
/// `AuthenticationDenied` and `UserCanceled` are deliberately separate so the
/// calling application can choose between re-prompting and abandoning.
#[derive(Debug, Error)]
pub enum KeywardError {
    /// The blob was written by an unsupported format version. Never retryable.
    #[error("incompatible blob format version {version}")]
    IncompatibleBlobFormat { version: u32 },

    /// Every secret-acquisition or ACL-validation strategy was exhausted.
    #[error("authentication denied")]
    AuthenticationDenied,

    /// Malformed ACL construction input (bad threshold, unparsable requirement, bad index).
    #[error("invalid ACL subject value: {0}")]
    InvalidAclSubjectValue(String),

    /// The user explicitly canceled an interactive flow.
    #[error("operation canceled by user")]
    UserCanceled,

    /// Two legacy equivalence links resolved to different canonical names.
    #[error("ambiguous code equivalence: ACL names `{acl_name}`, process names `{process_name}`")]
    AmbiguousEquivalenceMatch {
        acl_name: String,
        process_name: String,
    },

    /// Structurally invalid store or key blob.
    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    /// Failure inside the crypto provider outside of a trial decode.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Persistence failure (SQLite, filesystem).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller lacks the privilege the operation requires.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A handle or record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeywardError {
    /// Wrap any error as a storage failure.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Whether retrying with different credentials can change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthenticationDenied)
    }

    /// Whether the failure is an explicit user cancellation.
    pub fn is_user_canceled(&self) -> bool {
        matches!(self, Self::UserCanceled)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = KeywardError> = std::result::Result<T, E>;
