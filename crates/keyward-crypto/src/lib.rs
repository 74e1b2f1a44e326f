// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference cryptographic provider for Keyward.
//!
//! AES-256-GCM sealing and HMAC-SHA256 via ring, Argon2id and HKDF-SHA256
//! key derivation, and Ed25519 verification of code signatures.

pub mod aead;
pub mod kdf;
pub mod provider;

pub use provider::RingCryptoProvider;
