// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration and process fixtures.

use ed25519_dalek::SigningKey;
use keyward_config::KeywardConfig;
use keyward_core::{CodeSignature, LegacyHash, ProcessContext};
use rand::rngs::OsRng;

/// Default configuration with the cheapest Argon2id parameters validation accepts.
pub fn fast_config() -> KeywardConfig {
    let mut config = KeywardConfig::default();
    config.vault.kdf_memory_cost = 32768;
    config.vault.kdf_iterations = 2;
    config.vault.kdf_parallelism = 1;
    config
}

/// A code signing identity.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    pub fn public_hex(&self) -> String {
        self.public_key().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn sign(&self, identifier: &str, group: Option<&str>) -> CodeSignature {
        CodeSignature::sign(&self.key, identifier, group.map(str::to_string), [0x5a; 32])
    }
}

/// A signed process at `path` with a fixed legacy hash.
pub fn signed_process(
    signer: &Signer,
    identifier: &str,
    group: Option<&str>,
    path: &str,
    legacy: u8,
) -> ProcessContext {
    unsigned_process(path, legacy).with_signature(signer.sign(identifier, group))
}

/// An unsigned process at `path` whose legacy hash is twenty copies of `legacy`.
pub fn unsigned_process(path: &str, legacy: u8) -> ProcessContext {
    ProcessContext::new(4242, 501, path).with_legacy_hash(LegacyHash([legacy; 20]))
}
