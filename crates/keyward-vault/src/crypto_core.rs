// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master secret and working keys of one store.
//!
//! The working keys (encryption and integrity) are random and never change
//! over a store's lifetime. The master key, derived from the store's secret,
//! only wraps them. Changing the secret therefore re-wraps two keys and never
//! touches key blobs.
//!
//! Private section layout:
//!
//! ```text
//! salt [16] | memory_cost u32 | iterations u32 | parallelism u32 | sealed working keys
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use keyward_core::types::SALT_LEN;
use keyward_core::{
    CryptoProvider, KdfParams, KeyMaterialKind, KeywardError, StoreParams, StoreSignature,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use zeroize::Zeroizing;

use crate::blob::{StoreBlob, take_array, take_u32};

const WORKING_KEYS_LEN: usize = 64;

/// Where a candidate master secret comes from.
pub enum SecretMaterial<'a> {
    Passphrase(&'a SecretString),
    Key {
        kind: KeyMaterialKind,
        material: &'a [u8],
    },
    /// An already derived master key, e.g. from the system key file.
    MasterKey(Zeroizing<[u8; 32]>),
}

impl fmt::Debug for SecretMaterial<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passphrase(_) => f.write_str("Passphrase([REDACTED])"),
            Self::Key { kind, .. } => write!(f, "Key({kind}, [REDACTED])"),
            Self::MasterKey(_) => f.write_str("MasterKey([REDACTED])"),
        }
    }
}

struct MasterSecret {
    key: Zeroizing<[u8; 32]>,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
}

struct WorkingKeys {
    encryption: Zeroizing<[u8; 32]>,
    integrity: Zeroizing<[u8; 32]>,
}

/// Plaintext prefix of the private section.
struct PrivateHeader<'a> {
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
    sealed: &'a [u8],
}

impl<'a> PrivateHeader<'a> {
    fn parse(private: &'a [u8]) -> Result<Self, KeywardError> {
        let mut buf = private;
        let salt = take_array::<SALT_LEN>(&mut buf, "salt")?;
        let kdf = KdfParams {
            memory_cost: take_u32(&mut buf, "kdf memory cost")?,
            iterations: take_u32(&mut buf, "kdf iterations")?,
            parallelism: take_u32(&mut buf, "kdf parallelism")?,
        };
        if buf.is_empty() {
            return Err(KeywardError::MalformedBlob("empty sealed key section".into()));
        }
        Ok(Self {
            salt,
            kdf,
            sealed: buf,
        })
    }
}

pub struct CryptoCore {
    provider: Arc<dyn CryptoProvider>,
    kdf: KdfParams,
    master: Option<MasterSecret>,
    keys: Option<WorkingKeys>,
}

impl fmt::Debug for CryptoCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoCore")
            .field("kdf", &self.kdf)
            .field("has_master", &self.master.is_some())
            .field("has_keys", &self.keys.is_some())
            .finish()
    }
}

impl CryptoCore {
    /// `kdf` applies to secrets established for new stores or new passphrases.
    pub fn new(provider: Arc<dyn CryptoProvider>, kdf: KdfParams) -> Self {
        Self {
            provider,
            kdf,
            master: None,
            keys: None,
        }
    }

    /// A new, empty core sharing this one's provider and KDF settings.
    pub fn scratch(&self) -> Self {
        Self::new(Arc::clone(&self.provider), self.kdf)
    }

    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    pub fn has_master(&self) -> bool {
        self.master.is_some()
    }

    /// Master secret and working keys are both present.
    pub fn is_valid(&self) -> bool {
        self.master.is_some() && self.keys.is_some()
    }

    /// Establish a master secret without touching working keys.
    ///
    /// With `existing`, the salt and KDF parameters recorded in its private
    /// section are reused so the secret can decode it; otherwise a fresh salt
    /// and the configured parameters are used. Recorded parameters above
    /// the configured ceiling make the blob malformed.
    pub fn setup(
        &mut self,
        existing: Option<&StoreBlob>,
        secret: SecretMaterial<'_>,
    ) -> Result<(), KeywardError> {
        let (salt, kdf) = match existing {
            Some(blob) => {
                let header = PrivateHeader::parse(&blob.private)?;
                if !self.kdf.admits(&header.kdf) {
                    return Err(KeywardError::MalformedBlob(format!(
                        "kdf parameters {:?} exceed the configured ceiling",
                        header.kdf
                    )));
                }
                (header.salt, header.kdf)
            }
            None => {
                let mut salt = [0u8; SALT_LEN];
                self.provider.random_bytes(&mut salt)?;
                (salt, self.kdf)
            }
        };
        let key = match secret {
            SecretMaterial::Passphrase(passphrase) => self.provider.derive_from_passphrase(
                passphrase.expose_secret().as_bytes(),
                &salt,
                &kdf,
            )?,
            SecretMaterial::Key { kind, material } => {
                self.provider.derive_from_key(material, &salt, kind)?
            }
            SecretMaterial::MasterKey(key) => key,
        };
        self.master = Some(MasterSecret { key, salt, kdf });
        Ok(())
    }

    /// Unwrap the working keys of `blob` with the current master secret.
    ///
    /// `Ok(false)` means the secret is wrong (or the blob was tampered with);
    /// the core is left without working keys. Structural damage is an error.
    pub fn decode_core(&mut self, blob: &StoreBlob) -> Result<bool, KeywardError> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| KeywardError::Internal("decode without a master secret".into()))?;
        let header = PrivateHeader::parse(&blob.private)?;
        let aad = blob.header();
        let opened = match self.provider.open(&master.key, &aad, header.sealed) {
            Ok(opened) => opened,
            Err(e) => {
                debug!(store = %blob.signature, error = %e, "trial decode failed");
                self.keys = None;
                return Ok(false);
            }
        };
        if opened.len() != WORKING_KEYS_LEN {
            return Err(KeywardError::MalformedBlob(format!(
                "working keys are {} bytes",
                opened.len()
            )));
        }
        let mut encryption = Zeroizing::new([0u8; 32]);
        let mut integrity = Zeroizing::new([0u8; 32]);
        encryption.copy_from_slice(&opened[..32]);
        integrity.copy_from_slice(&opened[32..]);
        self.keys = Some(WorkingKeys {
            encryption,
            integrity,
        });
        Ok(true)
    }

    /// Set up `secret` against `blob` and try it. On failure the core keeps
    /// whatever it held before.
    pub fn try_secret(
        &mut self,
        blob: &StoreBlob,
        secret: SecretMaterial<'_>,
    ) -> Result<bool, KeywardError> {
        let mut candidate = self.scratch();
        candidate.setup(Some(blob), secret)?;
        if !candidate.decode_core(blob)? {
            return Ok(false);
        }
        self.master = candidate.master.take();
        self.keys = candidate.keys.take();
        Ok(true)
    }

    /// Fresh random working keys.
    pub fn generate_keys(&mut self) -> Result<(), KeywardError> {
        let mut encryption = Zeroizing::new([0u8; 32]);
        let mut integrity = Zeroizing::new([0u8; 32]);
        self.provider.random_bytes(&mut encryption[..])?;
        self.provider.random_bytes(&mut integrity[..])?;
        self.keys = Some(WorkingKeys {
            encryption,
            integrity,
        });
        Ok(())
    }

    /// A core holding this core's working keys under a new master secret.
    pub fn rekeyed(&self, secret: SecretMaterial<'_>) -> Result<Self, KeywardError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| KeywardError::Internal("re-key without working keys".into()))?;
        let mut next = self.scratch();
        next.setup(None, secret)?;
        next.keys = Some(WorkingKeys {
            encryption: keys.encryption.clone(),
            integrity: keys.integrity.clone(),
        });
        Ok(next)
    }

    /// Serialize the working keys under the master secret into a new blob.
    pub fn encode_core(
        &self,
        signature: StoreSignature,
        sequence: u32,
        params: StoreParams,
        public: Bytes,
    ) -> Result<StoreBlob, KeywardError> {
        let (Some(master), Some(keys)) = (&self.master, &self.keys) else {
            return Err(KeywardError::Internal("encode of an incomplete core".into()));
        };
        let aad = StoreBlob::associated_data(&signature, sequence, &params, &public);
        let mut plain = Zeroizing::new([0u8; WORKING_KEYS_LEN]);
        plain[..32].copy_from_slice(&keys.encryption[..]);
        plain[32..].copy_from_slice(&keys.integrity[..]);
        let sealed = self.provider.seal(&master.key, &aad, &plain[..])?;

        let mut private = BytesMut::with_capacity(SALT_LEN + 12 + sealed.len());
        private.put_slice(&master.salt);
        private.put_u32(master.kdf.memory_cost);
        private.put_u32(master.kdf.iterations);
        private.put_u32(master.kdf.parallelism);
        private.put_slice(&sealed);
        Ok(StoreBlob {
            signature,
            sequence,
            params,
            public,
            private: private.freeze(),
        })
    }

    /// Discard the master secret and working keys.
    pub fn invalidate(&mut self) {
        self.master = None;
        self.keys = None;
    }

    pub fn master_key(&self) -> Option<&[u8; 32]> {
        self.master.as_ref().map(|m| &*m.key)
    }

    pub fn encryption_key(&self) -> Result<&[u8; 32], KeywardError> {
        self.keys
            .as_ref()
            .map(|k| &*k.encryption)
            .ok_or_else(|| KeywardError::Internal("store keys are not available".into()))
    }

    pub fn integrity_key(&self) -> Result<&[u8; 32], KeywardError> {
        self.keys
            .as_ref()
            .map(|k| &*k.integrity)
            .ok_or_else(|| KeywardError::Internal("store keys are not available".into()))
    }
}
