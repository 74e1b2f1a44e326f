// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitive engine.

use zeroize::Zeroizing;

use crate::code::{CodeCheck, CodeSignature, Requirement};
use crate::error::KeywardError;
use crate::types::{KdfParams, KeyMaterialKind, SALT_LEN};

/// Raw cryptographic operations on caller-supplied key material.
///
/// Keyward decides *when* and *with which keys* these run; the provider only
/// performs them. A failed [`CryptoProvider::open`] is how a wrong secret
/// shows up, so implementations must not panic or log key material there.
pub trait CryptoProvider: Send + Sync {
    /// Fill `out` from a cryptographically secure generator.
    fn random_bytes(&self, out: &mut [u8]) -> Result<(), KeywardError>;

    /// Derive a 256-bit key from a passphrase.
    fn derive_from_passphrase(
        &self,
        passphrase: &[u8],
        salt: &[u8; SALT_LEN],
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; 32]>, KeywardError>;

    /// Derive a 256-bit key from explicit key material.
    fn derive_from_key(
        &self,
        material: &[u8],
        salt: &[u8; SALT_LEN],
        kind: KeyMaterialKind,
    ) -> Result<Zeroizing<[u8; 32]>, KeywardError>;

    /// Authenticated encryption. The output is self-contained (nonce included).
    fn seal(&self, key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, KeywardError>;

    /// Inverse of [`CryptoProvider::seal`]; fails on a wrong key or tampered input.
    fn open(
        &self,
        key: &[u8; 32],
        aad: &[u8],
        sealed: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KeywardError>;

    /// Message authentication tag over `data`.
    fn mac(&self, key: &[u8; 32], data: &[u8]) -> [u8; 32];

    /// Constant-time verification of a tag produced by [`CryptoProvider::mac`].
    fn verify_mac(&self, key: &[u8; 32], data: &[u8], tag: &[u8]) -> bool;

    /// Verify a process's code signature and check it against `requirement`.
    fn check_code(&self, signature: Option<&CodeSignature>, requirement: &Requirement) -> CodeCheck;
}
