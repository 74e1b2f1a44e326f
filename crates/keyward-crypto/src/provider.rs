// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CryptoProvider`] backed by ring, argon2 and ed25519-dalek.

use ed25519_dalek::{Signature, VerifyingKey};
use keyward_core::{
    CodeCheck, CodeSignature, CryptoProvider, KdfParams, KeyMaterialKind, KeywardError,
    Requirement,
};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{aead, kdf};

/// The reference provider shipped with Keyward.
///
/// `vendor_anchor` is the public key that `anchor vendor` requirement
/// clauses refer to; without one those clauses never match.
pub struct RingCryptoProvider {
    rng: SystemRandom,
    vendor_anchor: Option<[u8; 32]>,
}

impl RingCryptoProvider {
    pub fn new(vendor_anchor: Option<[u8; 32]>) -> Self {
        Self {
            rng: SystemRandom::new(),
            vendor_anchor,
        }
    }

    fn signature_is_valid(signature: &CodeSignature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&signature.signer) else {
            return false;
        };
        let sig = Signature::from_bytes(&signature.signature);
        key.verify_strict(&signature.payload(), &sig).is_ok()
    }
}

impl std::fmt::Debug for RingCryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingCryptoProvider")
            .field("vendor_anchor", &self.vendor_anchor.map(hex_prefix))
            .finish()
    }
}

fn hex_prefix(key: [u8; 32]) -> String {
    key[..4].iter().map(|b| format!("{b:02x}")).collect::<String>() + "..."
}

impl CryptoProvider for RingCryptoProvider {
    fn random_bytes(&self, out: &mut [u8]) -> Result<(), KeywardError> {
        self.rng
            .fill(out)
            .map_err(|_| KeywardError::Crypto("system random generator failed".to_string()))
    }

    fn derive_from_passphrase(
        &self,
        passphrase: &[u8],
        salt: &[u8; 16],
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; 32]>, KeywardError> {
        kdf::derive_from_passphrase(passphrase, salt, params)
    }

    fn derive_from_key(
        &self,
        material: &[u8],
        salt: &[u8; 16],
        kind: KeyMaterialKind,
    ) -> Result<Zeroizing<[u8; 32]>, KeywardError> {
        kdf::derive_from_key(material, salt, kind)
    }

    fn seal(&self, key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, KeywardError> {
        aead::seal(&self.rng, key, aad, plaintext)
    }

    fn open(
        &self,
        key: &[u8; 32],
        aad: &[u8],
        sealed: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KeywardError> {
        aead::open(key, aad, sealed)
    }

    fn mac(&self, key: &[u8; 32], data: &[u8]) -> [u8; 32] {
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        let tag = hmac::sign(&key, data);
        let mut out = [0u8; 32];
        out.copy_from_slice(tag.as_ref());
        out
    }

    fn verify_mac(&self, key: &[u8; 32], data: &[u8], tag: &[u8]) -> bool {
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        hmac::verify(&key, data, tag).is_ok()
    }

    fn check_code(&self, signature: Option<&CodeSignature>, requirement: &Requirement) -> CodeCheck {
        let Some(signature) = signature else {
            return CodeCheck::RejectUnsigned;
        };
        if !Self::signature_is_valid(signature) {
            debug!(identifier = %signature.identifier, "code signature does not verify");
            return CodeCheck::RejectOther;
        }
        if requirement.evaluate(signature, self.vendor_anchor.as_ref()) {
            CodeCheck::Accept
        } else {
            CodeCheck::RejectOther
        }
    }
}
