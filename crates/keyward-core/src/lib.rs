// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Keyward secret-store daemon.
//!
//! This crate provides the error type, the value types shared by stores, keys
//! and ACLs, the code requirement language, and the interfaces of the external
//! collaborators (crypto provider and interactive agent).

pub mod code;
pub mod error;
pub mod traits;
pub mod types;

pub use code::{CodeCheck, CodeSignature, Requirement};
pub use error::{KeywardError, Result};
pub use traits::{
    AccessDecision, AccessPrompt, CryptoProvider, EquivalencePrompt, InteractiveAgent,
    PassphrasePrompt,
};
pub use types::{
    AuthorizationTag, CredentialSample, Credentials, KdfParams, KeyMaterialKind, LegacyHash,
    ProcessContext, StoreName, StoreParams, StoreScope, StoreSignature,
};
