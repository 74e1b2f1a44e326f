// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key derivation: Argon2id for passphrases, HKDF-SHA256 for key material.

use keyward_core::{KdfParams, KeyMaterialKind, KeywardError};
use ring::hkdf;
use zeroize::Zeroizing;

/// Derive a 32-byte key from a passphrase using Argon2id (v0x13).
pub fn derive_from_passphrase(
    passphrase: &[u8],
    salt: &[u8; 16],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, KeywardError> {
    let argon_params = argon2::Params::new(
        params.memory_cost,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| KeywardError::Crypto(format!("invalid Argon2id parameters: {e}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, output.as_mut())
        .map_err(|e| KeywardError::Crypto(format!("Argon2id key derivation failed: {e}")))?;
    Ok(output)
}

fn info_label(kind: KeyMaterialKind) -> &'static [u8] {
    match kind {
        KeyMaterialKind::Symmetric => b"keyward master secret / symmetric",
        KeyMaterialKind::Asymmetric => b"keyward master secret / asymmetric",
    }
}

/// Derive a 32-byte key from explicit key material with HKDF-SHA256.
pub fn derive_from_key(
    material: &[u8],
    salt: &[u8; 16],
    kind: KeyMaterialKind,
) -> Result<Zeroizing<[u8; 32]>, KeywardError> {
    if material.is_empty() {
        return Err(KeywardError::Crypto("empty key material".to_string()));
    }
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(material);
    let info = [info_label(kind)];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| KeywardError::Crypto("HKDF expand failed".to_string()))?;
    let mut output = Zeroizing::new([0u8; 32]);
    okm.fill(output.as_mut())
        .map_err(|_| KeywardError::Crypto("HKDF fill failed".to_string()))?;
    Ok(output)
}
