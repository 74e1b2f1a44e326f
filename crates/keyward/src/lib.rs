// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyward: encrypted secret stores gated by self-modifying ACLs and code
//! identity.
//!
//! [`Keyward`] is the operation surface: create and open stores, lock and
//! unlock them, edit their ACLs, encode and decode keys, validate access and
//! administer legacy equivalence links. The building blocks are re-exported
//! from the member crates.

pub mod handles;
pub mod service;

pub use handles::{AccessTarget, KeyHandle, StoreHandle};
pub use service::Keyward;

pub use keyward_acl::{Acl, AclEdit, Entry, Outcome, Subject};
pub use keyward_codesign::{CodeSubject, EquivalenceDatabase, EquivalenceSource, LinkScope};
pub use keyward_config::KeywardConfig;
pub use keyward_core::{
    AccessDecision, AuthorizationTag, CredentialSample, Credentials, InteractiveAgent,
    KeywardError, LegacyHash, ProcessContext, Requirement, StoreName, StoreParams,
};
pub use keyward_crypto::RingCryptoProvider;
pub use keyward_vault::{IdleScheduler, KeyAlgorithm, KeyObject, SecretStore, TtyAgent};
