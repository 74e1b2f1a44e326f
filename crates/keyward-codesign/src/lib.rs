// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code identity for Keyward.
//!
//! Answers "is this process the application that ACL entry names?", either
//! cryptographically through a code requirement or, for entries written before
//! code signing, through legacy hash equality and persistent equivalence links.

pub mod equivalence;
pub mod identity;
pub mod verifier;

pub use equivalence::{
    EquivalenceDatabase, EquivalenceSource, LinkCheck, LinkScope, close_global, global,
    open_global, reopen_global,
};
pub use identity::{ProcessIdentity, hash_file, trimmed_name};
pub use verifier::{CodeIdentityVerifier, CodeSubject, CodeVerdict};
