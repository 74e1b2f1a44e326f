// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM seal/open with caller-supplied associated data.
//!
//! Every [`seal`] draws a fresh 96-bit nonce from the system CSPRNG and
//! prefixes it to the output; nonce reuse under one key would break GCM.

use keyward_core::KeywardError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Bytes added by [`seal`]: nonce prefix plus GCM tag.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + 16;

fn key(key: &[u8; 32]) -> Result<LessSafeKey, KeywardError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| KeywardError::Crypto("failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext`, authenticating `aad`. Output is `nonce || ciphertext || tag`.
pub fn seal(rng: &SystemRandom, k: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, KeywardError> {
    let sealing = key(k)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| KeywardError::Crypto("failed to generate random nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| KeywardError::Crypto("AES-256-GCM encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypt output of [`seal`]. Fails if the key is wrong or anything was tampered.
pub fn open(k: &[u8; 32], aad: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeywardError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(KeywardError::Crypto("sealed data too short".to_string()));
    }
    let opening = key(k)?;
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| KeywardError::Crypto("bad nonce length".to_string()))?;

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let len = opening
        .open_in_place(nonce, Aad::from(aad), in_out.as_mut_slice())
        .map_err(|_| {
            KeywardError::Crypto("AES-256-GCM decryption failed -- wrong key or corrupted data".to_string())
        })?
        .len();
    in_out.truncate(len);
    Ok(in_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> [u8; 32] {
        let mut k = [0u8; 32];
        SystemRandom::new().fill(&mut k).unwrap();
        k
    }

    #[test]
    fn seal_open_roundtrip_with_aad() {
        let rng = SystemRandom::new();
        let k = random_key();
        let sealed = seal(&rng, &k, b"header", b"secret api key value").unwrap();
        let opened = open(&k, b"header", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"secret api key value");
        assert_eq!(sealed.len(), b"secret api key value".len() + SEAL_OVERHEAD);
    }

    #[test]
    fn nonces_differ_between_seals() {
        let rng = SystemRandom::new();
        let k = random_key();
        let a = seal(&rng, &k, b"", b"same input twice").unwrap();
        let b = seal(&rng, &k, b"", b"same input twice").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_or_aad_fails() {
        let rng = SystemRandom::new();
        let k = random_key();
        let sealed = seal(&rng, &k, b"aad", b"secret data").unwrap();
        assert!(open(&random_key(), b"aad", &sealed).is_err());
        assert!(open(&k, b"other aad", &sealed).is_err());
    }

    #[test]
    fn tampered_or_truncated_input_fails() {
        let rng = SystemRandom::new();
        let k = random_key();
        let mut sealed = seal(&rng, &k, b"", b"do not tamper").unwrap();
        sealed[NONCE_LEN] ^= 0x01;
        assert!(open(&k, b"", &sealed).is_err());
        assert!(open(&k, b"", &sealed[..10]).is_err());
    }
}
