// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keys stored inside a secret store.
//!
//! A key is either decoded (its material is in memory), encoded (a current
//! blob is cached), or both. Decoding and encoding go through the owning
//! store's working keys and therefore need it unlocked.
//!
//! Key blob layout:
//!
//! ```text
//! magic "KWKY" | version u32 | store signature [16]
//! | header_len u32 | header (JSON) | acl_len u32 | acl (JSON)
//! | sealed_len u32 | sealed material | hmac [32]
//! ```
//!
//! The material is sealed under the store's encryption key with everything
//! before it as associated data; the HMAC under the store's integrity key
//! covers everything before it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ed25519_dalek::{Signer as _, SigningKey};
use keyward_acl::{Acl, AclEdit, Outcome, Subject};
use keyward_codesign::{CodeSubject, ProcessIdentity};
use keyward_core::types::STORE_SIGNATURE_LEN;
use keyward_core::{
    AuthorizationTag, Credentials, KeywardError, ProcessContext, StoreSignature,
};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::blob::{put_section, take_array, take_section, take_u32};
use crate::crypto_core::CryptoCore;
use crate::store::SecretStore;

pub const KEY_BLOB_MAGIC: [u8; 4] = *b"KWKY";
pub const KEY_BLOB_VERSION: u32 = 1;

const KEY_MATERIAL_LEN: usize = 32;
const MAC_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    /// 256-bit symmetric key.
    Aes256,
    /// Ed25519 signing key; the material is the seed.
    Ed25519,
}

impl KeyAlgorithm {
    pub fn default_usage(self) -> BTreeSet<AuthorizationTag> {
        use AuthorizationTag::*;
        match self {
            Self::Aes256 => [Encrypt, Decrypt, Derive, ExportWrapped, ExportClear].into(),
            Self::Ed25519 => [Sign, Verify, ExportWrapped, ExportClear].into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHeader {
    pub algorithm: KeyAlgorithm,
    pub label: String,
    pub usage: BTreeSet<AuthorizationTag>,
    /// Hex public key of an Ed25519 key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Clone)]
struct KeyState {
    header: KeyHeader,
    acl: Acl,
    material: Option<Zeroizing<Vec<u8>>>,
    blob: Option<Bytes>,
    /// Bumped whenever the cached blob goes stale.
    revision: u64,
}

impl KeyState {
    fn invalidate_blob(&mut self) {
        self.blob = None;
        self.revision += 1;
    }
}

/// Parsed key blob, before the material is unsealed.
struct KeyLayout {
    header: KeyHeader,
    acl: Acl,
    aad_len: usize,
    sealed: Bytes,
}

fn malformed(what: &str) -> KeywardError {
    KeywardError::MalformedBlob(format!("key blob: {what}"))
}

fn parse(data: &[u8], store: StoreSignature) -> Result<KeyLayout, KeywardError> {
    let mut buf = data;
    if take_array::<4>(&mut buf, "magic")? != KEY_BLOB_MAGIC {
        return Err(malformed("bad magic"));
    }
    let version = take_u32(&mut buf, "version")?;
    if version != KEY_BLOB_VERSION {
        return Err(KeywardError::IncompatibleBlobFormat { version });
    }
    let signature = StoreSignature(take_array::<STORE_SIGNATURE_LEN>(&mut buf, "signature")?);
    if signature != store {
        return Err(malformed(&format!("belongs to store {signature}")));
    }
    let header = take_section(&mut buf, "header")?;
    let header: KeyHeader =
        serde_json::from_slice(&header).map_err(|e| malformed(&format!("header: {e}")))?;
    let acl = Acl::from_bytes(&take_section(&mut buf, "acl")?)?;
    let aad_len = data.len() - buf.len();
    let sealed = take_section(&mut buf, "sealed material")?;
    if buf.remaining() != MAC_LEN {
        return Err(malformed("bad trailer length"));
    }
    Ok(KeyLayout {
        header,
        acl,
        aad_len,
        sealed,
    })
}

pub struct KeyObject {
    store: Arc<SecretStore>,
    state: Mutex<KeyState>,
}

impl fmt::Debug for KeyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("KeyObject")
            .field("store", self.store.name())
            .field("header", &state.header)
            .field("decoded", &state.material.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyObject {
    /// Generate fresh material in `store`. The store must be unlockable with
    /// `credentials`.
    pub fn generate(
        store: Arc<SecretStore>,
        algorithm: KeyAlgorithm,
        label: &str,
        acl: Option<Acl>,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Arc<Self>, KeywardError> {
        let material = store.with_unlocked(credentials, |core| {
            let mut material = Zeroizing::new(vec![0u8; KEY_MATERIAL_LEN]);
            core.provider().random_bytes(&mut material[..])?;
            Ok(material)
        })?;
        Self::import(store, algorithm, label, &material, acl, process)
    }

    /// Wrap existing material. Without `acl` the key gets the standard
    /// creator-or-prompt ACL for `process`.
    pub fn import(
        store: Arc<SecretStore>,
        algorithm: KeyAlgorithm,
        label: &str,
        material: &[u8],
        acl: Option<Acl>,
        process: &ProcessContext,
    ) -> Result<Arc<Self>, KeywardError> {
        let seed: [u8; KEY_MATERIAL_LEN] = material.try_into().map_err(|_| {
            KeywardError::Crypto(format!("key material must be {KEY_MATERIAL_LEN} bytes"))
        })?;
        let public_key = match algorithm {
            KeyAlgorithm::Aes256 => None,
            KeyAlgorithm::Ed25519 => Some(hex::encode(
                SigningKey::from_bytes(&seed).verifying_key().to_bytes(),
            )),
        };
        let acl = acl.unwrap_or_else(|| {
            Acl::standard(CodeSubject::for_process(&ProcessIdentity::new(process)), label)
        });
        info!(store = %store.name(), %algorithm, label, "key created");
        Ok(Arc::new(Self {
            store,
            state: Mutex::new(KeyState {
                header: KeyHeader {
                    algorithm,
                    label: label.to_string(),
                    usage: algorithm.default_usage(),
                    public_key,
                },
                acl,
                material: Some(Zeroizing::new(seed.to_vec())),
                blob: None,
                revision: 0,
            }),
        }))
    }

    /// Parse a key blob of `store`. The material stays sealed until first use.
    pub fn decode(store: Arc<SecretStore>, data: &[u8]) -> Result<Arc<Self>, KeywardError> {
        let layout = parse(data, store.signature())?;
        debug!(store = %store.name(), label = %layout.header.label, "key blob decoded");
        Ok(Arc::new(Self {
            store,
            state: Mutex::new(KeyState {
                header: layout.header,
                acl: layout.acl,
                material: None,
                blob: Some(Bytes::copy_from_slice(data)),
                revision: 0,
            }),
        }))
    }

    /// The current key blob, re-encoding if the cached one is stale.
    ///
    /// Sealing may prompt to unlock the store; the key state is not locked
    /// meanwhile.
    pub fn encode(&self) -> Result<Bytes, KeywardError> {
        let snapshot = {
            let state = self.state.lock();
            if let Some(blob) = &state.blob {
                return Ok(blob.clone());
            }
            state.clone()
        };
        let blob = self
            .store
            .with_unlocked(&Credentials::none(), |core| self.seal(&snapshot, core))?;

        let mut state = self.state.lock();
        if state.revision == snapshot.revision {
            state.blob = Some(blob.clone());
            debug!(label = %state.header.label, "key blob encoded");
        }
        Ok(blob)
    }

    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    pub fn header(&self) -> KeyHeader {
        self.state.lock().header.clone()
    }

    pub fn acl(&self) -> Acl {
        self.state.lock().acl.clone()
    }

    pub fn is_decoded(&self) -> bool {
        self.state.lock().material.is_some()
    }

    pub fn public_key(&self) -> Option<[u8; 32]> {
        let state = self.state.lock();
        let bytes = hex::decode(state.header.public_key.as_deref()?).ok()?;
        bytes.try_into().ok()
    }

    /// Run the key ACL for `tag`, with the store ACL standing in for
    /// pre-authorized subjects. The key is decoded first.
    pub fn validate_access(
        &self,
        tag: AuthorizationTag,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Outcome, KeywardError> {
        let acl = self.prepare(credentials)?.acl.clone();
        let store_acl = self.store.acl();
        let identity = ProcessIdentity::new(process);
        let outcome = self.store.with_environment(|env| {
            acl.validate(tag, credentials, &identity, env.with_preauthorized(&store_acl))
        })?;

        let mut state = self.state.lock();
        if state.acl.apply_upgrades(outcome.upgrades()) {
            state.invalidate_blob();
            info!(label = %state.header.label, %tag, "key ACL upgraded");
        }
        Ok(outcome)
    }

    pub fn change_acl(
        &self,
        edit: AclEdit,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<(), KeywardError> {
        self.administer(credentials, process, |acl| acl.apply_edit(edit))
    }

    pub fn set_owner(
        &self,
        owner: Subject,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<(), KeywardError> {
        self.administer(credentials, process, |acl| acl.set_owner(owner))
    }

    /// Encrypt with an AES key.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Vec<u8>, KeywardError> {
        let (label, material) =
            self.authorize(KeyAlgorithm::Aes256, AuthorizationTag::Encrypt, credentials, process)?;
        self.store
            .provider()
            .seal(&*key_array(&material)?, label.as_bytes(), plaintext)
    }

    pub fn decrypt(
        &self,
        sealed: &[u8],
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Zeroizing<Vec<u8>>, KeywardError> {
        let (label, material) =
            self.authorize(KeyAlgorithm::Aes256, AuthorizationTag::Decrypt, credentials, process)?;
        self.store
            .provider()
            .open(&*key_array(&material)?, label.as_bytes(), sealed)
    }

    /// Sign with an Ed25519 key.
    pub fn sign(
        &self,
        message: &[u8],
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<[u8; 64], KeywardError> {
        let (_, material) =
            self.authorize(KeyAlgorithm::Ed25519, AuthorizationTag::Sign, credentials, process)?;
        let signing = SigningKey::from_bytes(&*key_array(&material)?);
        Ok(signing.sign(message).to_bytes())
    }

    /// The raw material, if the ACL allows clear export.
    pub fn export_clear(
        &self,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Zeroizing<Vec<u8>>, KeywardError> {
        let algorithm = self.state.lock().header.algorithm;
        let (_, material) =
            self.authorize(algorithm, AuthorizationTag::ExportClear, credentials, process)?;
        Ok(material)
    }

    fn authorize(
        &self,
        algorithm: KeyAlgorithm,
        tag: AuthorizationTag,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<(String, Zeroizing<Vec<u8>>), KeywardError> {
        {
            let state = self.state.lock();
            if state.header.algorithm != algorithm || !state.header.usage.contains(&tag) {
                return Err(KeywardError::PermissionDenied(format!(
                    "key `{}` ({}) cannot be used for {tag}",
                    state.header.label, state.header.algorithm
                )));
            }
        }
        self.validate_access(tag, credentials, process)?;
        let state = self.state.lock();
        let material = state
            .material
            .clone()
            .ok_or_else(|| KeywardError::Internal("validated key without material".into()))?;
        Ok((state.header.label.clone(), material))
    }

    fn administer(
        &self,
        credentials: &Credentials,
        process: &ProcessContext,
        change: impl FnOnce(&mut Acl) -> Result<(), KeywardError>,
    ) -> Result<(), KeywardError> {
        let acl = self.prepare(credentials)?.acl.clone();
        let store_acl = self.store.acl();
        let identity = ProcessIdentity::new(process);
        let outcome = self.store.with_environment(|env| {
            acl.authorize_owner(credentials, &identity, env.with_preauthorized(&store_acl))
        })?;

        let mut state = self.state.lock();
        let mut acl = state.acl.clone();
        acl.apply_upgrades(outcome.upgrades());
        change(&mut acl)?;
        state.acl = acl;
        state.invalidate_blob();
        info!(label = %state.header.label, "key ACL changed");
        Ok(())
    }

    /// Make sure the store is unlocked and the material is unsealed.
    ///
    /// The key state is only locked once the store work is done.
    fn prepare(&self, credentials: &Credentials) -> Result<MutexGuard<'_, KeyState>, KeywardError> {
        self.store.unlock(credentials)?;
        let blob = {
            let state = self.state.lock();
            if state.material.is_some() {
                return Ok(state);
            }
            state
                .blob
                .clone()
                .ok_or_else(|| KeywardError::Internal("key has neither material nor blob".into()))?
        };
        let layout = parse(&blob, self.store.signature())?;
        let material = self.store.with_unlocked(credentials, |core| {
            let provider = core.provider();
            let (signed, tag) = blob.split_at(blob.len() - MAC_LEN);
            if !provider.verify_mac(core.integrity_key()?, signed, tag) {
                return Err(malformed("integrity check failed"));
            }
            provider.open(core.encryption_key()?, &blob[..layout.aad_len], &layout.sealed)
        })?;
        if material.len() != KEY_MATERIAL_LEN {
            return Err(malformed("material has the wrong length"));
        }
        let mut state = self.state.lock();
        if state.material.is_none() {
            debug!(label = %state.header.label, "key material unsealed");
            state.material = Some(material);
        }
        Ok(state)
    }

    fn seal(&self, state: &KeyState, core: &CryptoCore) -> Result<Bytes, KeywardError> {
        let material = state
            .material
            .as_ref()
            .ok_or_else(|| KeywardError::Internal("encode of a key without material".into()))?;
        let header = serde_json::to_vec(&state.header)
            .map_err(|e| KeywardError::Internal(format!("key header: {e}")))?;
        let acl = state.acl.to_bytes()?;

        let mut out = BytesMut::new();
        out.put_slice(&KEY_BLOB_MAGIC);
        out.put_u32(KEY_BLOB_VERSION);
        out.put_slice(&self.store.signature().0);
        put_section(&mut out, &header);
        put_section(&mut out, &acl);
        let provider = core.provider();
        let sealed = provider.seal(core.encryption_key()?, &out, material)?;
        put_section(&mut out, &sealed);
        let mac = provider.mac(core.integrity_key()?, &out);
        out.put_slice(&mac);
        Ok(out.freeze())
    }
}

fn key_array(material: &[u8]) -> Result<Zeroizing<[u8; 32]>, KeywardError> {
    let mut key = Zeroizing::new([0u8; 32]);
    if material.len() != key.len() {
        return Err(malformed("material has the wrong length"));
    }
    key.copy_from_slice(material);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{OnceLock, Weak};

    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    use keyward_codesign::EquivalenceSource;
    use keyward_core::{
        AccessDecision, AccessPrompt, EquivalencePrompt, InteractiveAgent, PassphrasePrompt,
        StoreName,
    };
    use secrecy::SecretString;
    use keyward_crypto::RingCryptoProvider;
    use keyward_test_utils::{ScriptedAgent, fast_config, unsigned_process};

    use crate::services::StoreServices;
    use crate::timer::IdleScheduler;

    fn store_with(agent: Option<Arc<ScriptedAgent>>) -> Arc<SecretStore> {
        store_with_agent(agent.map(|a| a as Arc<dyn InteractiveAgent>))
    }

    fn store_with_agent(agent: Option<Arc<dyn InteractiveAgent>>) -> Arc<SecretStore> {
        let services = StoreServices::from_config(
            &fast_config(),
            Arc::new(RingCryptoProvider::new(None)),
            agent,
            EquivalenceSource::None,
            IdleScheduler::disabled(),
        )
        .unwrap();
        SecretStore::create(
            Arc::new(services),
            StoreName::user("login"),
            None,
            &Credentials::passphrase("pw"),
            None,
        )
        .unwrap()
    }

    fn process() -> ProcessContext {
        unsigned_process("/usr/bin/tool", 3)
    }

    fn open_key(store: &Arc<SecretStore>, algorithm: KeyAlgorithm) -> Arc<KeyObject> {
        KeyObject::generate(
            Arc::clone(store),
            algorithm,
            "test key",
            Some(Acl::open()),
            &Credentials::none(),
            &process(),
        )
        .unwrap()
    }

    #[test]
    fn decode_is_lazy_and_validation_unseals() {
        let store = store_with(None);
        let key = open_key(&store, KeyAlgorithm::Aes256);
        let material = key.export_clear(&Credentials::none(), &process()).unwrap();
        let blob = key.encode().unwrap();

        let decoded = KeyObject::decode(Arc::clone(&store), &blob).unwrap();
        assert!(!decoded.is_decoded());
        assert_eq!(decoded.header().label, "test key");
        assert_eq!(
            *decoded.export_clear(&Credentials::none(), &process()).unwrap(),
            *material
        );
        assert!(decoded.is_decoded());
    }

    #[test]
    fn locked_store_keys_need_credentials() {
        let store = store_with(None);
        let blob = open_key(&store, KeyAlgorithm::Aes256).encode().unwrap();
        store.lock();

        let key = KeyObject::decode(Arc::clone(&store), &blob).unwrap();
        let err = key
            .validate_access(AuthorizationTag::Decrypt, &Credentials::cancel(), &process())
            .unwrap_err();
        assert!(matches!(err, KeywardError::AuthenticationDenied));
        assert!(!key.is_decoded());

        key.validate_access(AuthorizationTag::Decrypt, &Credentials::passphrase("pw"), &process())
            .unwrap();
        assert!(key.is_decoded());
    }

    #[test]
    fn key_from_another_store_is_rejected() {
        let blob = open_key(&store_with(None), KeyAlgorithm::Aes256).encode().unwrap();
        let err = KeyObject::decode(store_with(None), &blob).unwrap_err();
        assert!(matches!(err, KeywardError::MalformedBlob(_)));
    }

    #[test]
    fn future_key_blob_version_is_incompatible() {
        let store = store_with(None);
        let mut blob = open_key(&store, KeyAlgorithm::Aes256).encode().unwrap().to_vec();
        blob[4..8].copy_from_slice(&99u32.to_be_bytes());
        let err = KeyObject::decode(store, &blob).unwrap_err();
        assert!(matches!(err, KeywardError::IncompatibleBlobFormat { version: 99 }));
    }

    #[test]
    fn tampered_key_blob_fails_integrity() {
        let store = store_with(None);
        let mut blob = open_key(&store, KeyAlgorithm::Aes256).encode().unwrap().to_vec();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        let key = KeyObject::decode(Arc::clone(&store), &blob).unwrap();
        let err = key
            .validate_access(AuthorizationTag::Encrypt, &Credentials::none(), &process())
            .unwrap_err();
        assert!(matches!(err, KeywardError::MalformedBlob(_)));
    }

    #[test]
    fn changing_the_acl_invalidates_the_blob() {
        let store = store_with(None);
        let key = open_key(&store, KeyAlgorithm::Aes256);
        let before = key.encode().unwrap();
        assert_eq!(key.encode().unwrap(), before);

        key.change_acl(
            AclEdit::Add(keyward_acl::Entry::for_tags(
                [AuthorizationTag::Sign],
                Subject::prompted("sign"),
            )),
            &Credentials::none(),
            &process(),
        )
        .unwrap();
        let after = key.encode().unwrap();
        assert_ne!(after, before);

        let decoded = KeyObject::decode(store, &after).unwrap();
        assert_eq!(decoded.acl().entries().len(), 2);
    }

    #[test]
    fn ed25519_signatures_verify() {
        let store = store_with(None);
        let key = open_key(&store, KeyAlgorithm::Ed25519);
        let signature = key.sign(b"message", &Credentials::none(), &process()).unwrap();
        let public = VerifyingKey::from_bytes(&key.public_key().unwrap()).unwrap();
        public
            .verify(b"message", &Signature::from_bytes(&signature))
            .unwrap();
    }

    #[test]
    fn aes_roundtrip_and_usage_checks() {
        let store = store_with(None);
        let key = open_key(&store, KeyAlgorithm::Aes256);
        let sealed = key.encrypt(b"secret", &Credentials::none(), &process()).unwrap();
        let opened = key.decrypt(&sealed, &Credentials::none(), &process()).unwrap();
        assert_eq!(&opened[..], b"secret");

        let err = key.sign(b"x", &Credentials::none(), &process()).unwrap_err();
        assert!(matches!(err, KeywardError::PermissionDenied(_)));
    }

    #[test]
    fn default_acl_prompts_strangers_and_trusts_the_creator() {
        let agent = Arc::new(ScriptedAgent::new().deny());
        let store = store_with(Some(Arc::clone(&agent)));
        let creator = process();
        let key = KeyObject::generate(
            Arc::clone(&store),
            KeyAlgorithm::Aes256,
            "mail",
            None,
            &Credentials::none(),
            &creator,
        )
        .unwrap();

        key.validate_access(AuthorizationTag::Decrypt, &Credentials::none(), &creator)
            .unwrap();
        assert_eq!(agent.access_prompts(), 0);

        let stranger = unsigned_process("/usr/bin/other", 9);
        let err = key
            .validate_access(AuthorizationTag::Decrypt, &Credentials::none(), &stranger)
            .unwrap_err();
        assert!(matches!(err, KeywardError::AuthenticationDenied));
        assert_eq!(agent.access_prompts(), 1);
    }

    struct KeyPeekingAgent {
        key: OnceLock<Weak<KeyObject>>,
        peeked: AtomicBool,
    }

    impl InteractiveAgent for KeyPeekingAgent {
        fn query_passphrase(&self, _prompt: &PassphrasePrompt<'_>) -> Result<SecretString, KeywardError> {
            if let Some(key) = self.key.get().and_then(Weak::upgrade) {
                // Would deadlock if the key state were locked across the prompt.
                key.is_decoded();
                self.peeked.store(true, Ordering::SeqCst);
            }
            Ok(SecretString::from("pw"))
        }

        fn query_new_passphrase(&self, _store: &str) -> Result<SecretString, KeywardError> {
            Err(KeywardError::UserCanceled)
        }

        fn confirm_access(&self, _prompt: &AccessPrompt<'_>) -> Result<AccessDecision, KeywardError> {
            Ok(AccessDecision::Deny)
        }

        fn confirm_equivalence(&self, _prompt: &EquivalencePrompt<'_>) -> Result<bool, KeywardError> {
            Ok(false)
        }
    }

    #[test]
    fn key_state_is_released_while_encode_prompts() {
        let agent = Arc::new(KeyPeekingAgent {
            key: OnceLock::new(),
            peeked: AtomicBool::new(false),
        });
        let store = store_with_agent(Some(Arc::clone(&agent) as Arc<dyn InteractiveAgent>));
        let key = open_key(&store, KeyAlgorithm::Aes256);
        agent.key.set(Arc::downgrade(&key)).unwrap();
        store.lock();

        let blob = key.encode().unwrap();
        assert!(agent.peeked.load(Ordering::SeqCst));
        assert!(!store.is_locked());
        assert_eq!(key.encode().unwrap(), blob);

        let decoded = KeyObject::decode(Arc::clone(&store), &blob).unwrap();
        decoded
            .validate_access(AuthorizationTag::Decrypt, &Credentials::none(), &process())
            .unwrap();
        assert!(decoded.is_decoded());
    }
}
