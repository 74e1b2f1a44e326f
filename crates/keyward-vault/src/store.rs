// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The lock/unlock state machine of one secret store.
//!
//! Each store has a state mutex (core, cached blob, parameters, ACL) and a
//! separate interaction mutex held around every call into the interactive
//! agent. The state mutex is released for the duration of a prompt and the
//! lock state is re-checked once it is re-acquired; the two are never both
//! held across a blocking call.
//!
//! While unlocked a store keeps one extra strong reference to itself (the
//! session reference). Locking drops it, so an idle-locked store with no
//! remaining handles is reclaimed.

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use keyward_acl::{Acl, AclEdit, AclEnvironment, Outcome, Subject};
use keyward_codesign::ProcessIdentity;
use keyward_core::{
    AccessDecision, AccessPrompt, AuthorizationTag, CredentialSample, Credentials, CryptoProvider,
    EquivalencePrompt, InteractiveAgent, KeywardError, PassphrasePrompt, ProcessContext,
    StoreName, StoreParams, StoreSignature,
};
use parking_lot::{Mutex, MutexGuard};
use secrecy::SecretString;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::blob::StoreBlob;
use crate::crypto_core::{CryptoCore, SecretMaterial};
use crate::services::StoreServices;
use crate::system_key;

struct StoreState {
    core: CryptoCore,
    /// Last encoded blob. Always decodable with the current secret.
    blob: StoreBlob,
    /// `version` at the time `blob` was encoded.
    blob_version: u64,
    version: u64,
    params: StoreParams,
    acl: Acl,
    /// Bumped on every committed secret change.
    secret_epoch: u64,
    session: Option<Arc<SecretStore>>,
    timer: Option<AbortHandle>,
    timer_generation: u64,
    lock_count: u64,
}

/// Result of the secret-acquisition protocol.
enum Acquired {
    Core(CryptoCore),
    /// Another request unlocked the store while we were prompting.
    AlreadyUnlocked,
}

/// A secret chosen by the new-secret protocol.
enum NewSecret<'c> {
    Passphrase(&'c SecretString),
    Key {
        kind: keyward_core::KeyMaterialKind,
        material: &'c [u8],
    },
    Prompted(SecretString),
}

impl NewSecret<'_> {
    fn material(&self) -> SecretMaterial<'_> {
        match self {
            Self::Passphrase(p) => SecretMaterial::Passphrase(p),
            Self::Key { kind, material } => SecretMaterial::Key {
                kind: *kind,
                material,
            },
            Self::Prompted(p) => SecretMaterial::Passphrase(p),
        }
    }
}

/// Pick the first acceptable new secret from `credentials`.
///
/// Empty credentials mean "ask", which system-scoped stores never do.
fn select_new_secret<'c>(
    credentials: &'c Credentials,
    system: bool,
    mut prompt: impl FnMut() -> Result<Option<SecretString>, KeywardError>,
) -> Result<NewSecret<'c>, KeywardError> {
    for sample in credentials.samples() {
        match sample {
            CredentialSample::Interactive if !system => {
                if let Some(passphrase) = prompt()? {
                    return Ok(NewSecret::Prompted(passphrase));
                }
            }
            CredentialSample::Interactive | CredentialSample::Cancel => {}
            CredentialSample::Passphrase(passphrase) => {
                return Ok(NewSecret::Passphrase(passphrase));
            }
            CredentialSample::KeyMaterial { kind, material } => {
                return Ok(NewSecret::Key {
                    kind: *kind,
                    material,
                });
            }
        }
    }
    if credentials.is_empty() && !system {
        if let Some(passphrase) = prompt()? {
            return Ok(NewSecret::Prompted(passphrase));
        }
    }
    Err(KeywardError::AuthenticationDenied)
}

/// Agent wrapper that holds a store's interaction lock around each call.
struct SerializedAgent<'a> {
    inner: &'a dyn InteractiveAgent,
    interaction: &'a Mutex<()>,
}

impl InteractiveAgent for SerializedAgent<'_> {
    fn query_passphrase(&self, prompt: &PassphrasePrompt<'_>) -> Result<SecretString, KeywardError> {
        let _interaction = self.interaction.lock();
        self.inner.query_passphrase(prompt)
    }

    fn query_new_passphrase(&self, store: &str) -> Result<SecretString, KeywardError> {
        let _interaction = self.interaction.lock();
        self.inner.query_new_passphrase(store)
    }

    fn confirm_access(&self, prompt: &AccessPrompt<'_>) -> Result<AccessDecision, KeywardError> {
        let _interaction = self.interaction.lock();
        self.inner.confirm_access(prompt)
    }

    fn confirm_equivalence(&self, prompt: &EquivalencePrompt<'_>) -> Result<bool, KeywardError> {
        let _interaction = self.interaction.lock();
        self.inner.confirm_equivalence(prompt)
    }
}

pub struct SecretStore {
    name: StoreName,
    signature: StoreSignature,
    services: Arc<StoreServices>,
    this: Weak<SecretStore>,
    state: Mutex<StoreState>,
    interaction: Mutex<()>,
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl SecretStore {
    /// Create a store with a fresh signature and master secret. The new store
    /// is unlocked.
    pub fn create(
        services: Arc<StoreServices>,
        name: StoreName,
        params: Option<StoreParams>,
        credentials: &Credentials,
        acl: Option<Acl>,
    ) -> Result<Arc<Self>, KeywardError> {
        let secret = select_new_secret(credentials, name.is_system(), || {
            match services.agent.as_deref() {
                Some(agent) => agent.query_new_passphrase(&name.name).map(Some),
                None => Ok(None),
            }
        })?;

        let mut core = CryptoCore::new(Arc::clone(&services.provider), services.settings.kdf);
        core.setup(None, secret.material())?;
        core.generate_keys()?;

        let mut signature = [0u8; keyward_core::types::STORE_SIGNATURE_LEN];
        services.provider.random_bytes(&mut signature)?;
        let signature = StoreSignature(signature);
        let acl = acl.unwrap_or_else(Acl::open);
        let params = params.unwrap_or(services.settings.default_params);
        let blob = core.encode_core(signature, 1, params, Bytes::from(acl.to_bytes()?))?;

        let store = Self::assemble(services, name, signature, core, blob, params, acl);
        {
            let mut state = store.state.lock();
            store.on_unlocked(&mut state);
        }
        info!(store = %store.name, signature = %signature, "store created");
        Ok(store)
    }

    /// Construct a store from an existing blob.
    ///
    /// With empty credentials the store stays locked; otherwise they must
    /// unlock it.
    pub fn open(
        services: Arc<StoreServices>,
        name: StoreName,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<Arc<Self>, KeywardError> {
        let blob = StoreBlob::decode(data)?;
        let acl = Acl::from_bytes(&blob.public)?;
        let core = CryptoCore::new(Arc::clone(&services.provider), services.settings.kdf);
        let (signature, params) = (blob.signature, blob.params);
        let store = Self::assemble(services, name, signature, core, blob, params, acl);
        debug!(store = %store.name, signature = %signature, "store opened");
        if !credentials.is_empty() {
            store.unlock(credentials)?;
        }
        Ok(store)
    }

    fn assemble(
        services: Arc<StoreServices>,
        name: StoreName,
        signature: StoreSignature,
        core: CryptoCore,
        blob: StoreBlob,
        params: StoreParams,
        acl: Acl,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name,
            signature,
            services,
            this: this.clone(),
            state: Mutex::new(StoreState {
                core,
                blob,
                blob_version: 0,
                version: 0,
                params,
                acl,
                secret_epoch: 0,
                session: None,
                timer: None,
                timer_generation: 0,
                lock_count: 0,
            }),
            interaction: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &StoreName {
        &self.name
    }

    pub fn signature(&self) -> StoreSignature {
        self.signature
    }

    pub(crate) fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.services.provider
    }

    pub fn is_locked(&self) -> bool {
        !self.state.lock().core.is_valid()
    }

    /// Counter bumped whenever the encoded blob goes stale.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Number of unlocked-to-locked transitions so far.
    pub fn lock_count(&self) -> u64 {
        self.state.lock().lock_count
    }

    pub fn unlock(&self, credentials: &Credentials) -> Result<(), KeywardError> {
        let mut state = self.state.lock();
        self.ensure_unlocked(&mut state, credentials)?;
        self.touch(&mut state);
        Ok(())
    }

    /// Discard the master secret and working keys. Idempotent.
    pub fn lock(&self) {
        let session = {
            let mut state = self.state.lock();
            self.lock_state(&mut state)
        };
        // Possibly the last strong reference; released outside the state lock.
        drop(session);
    }

    /// Lock if this store locks when the system sleeps.
    pub fn system_will_sleep(&self) {
        let session = {
            let mut state = self.state.lock();
            if !state.params.lock_on_sleep {
                return;
            }
            self.lock_state(&mut state)
        };
        drop(session);
    }

    /// Push the idle deadline out to now + idle timeout.
    pub fn activity(&self) {
        let mut state = self.state.lock();
        self.touch(&mut state);
    }

    /// Verify `old`, establish a secret from `new`, and re-encode.
    ///
    /// Nothing changes unless every step succeeds. A locked store verified
    /// this way ends up unlocked under the new secret.
    pub fn change_passphrase(&self, old: &Credentials, new: &Credentials) -> Result<(), KeywardError> {
        let mut state = self.state.lock();
        let epoch = state.secret_epoch;
        let verified = match self.acquire(&mut state, old, false)? {
            Acquired::Core(core) => core,
            Acquired::AlreadyUnlocked => {
                return Err(KeywardError::Internal("secret verification short-circuited".into()));
            }
        };

        let system = self.name.is_system();
        let secret = select_new_secret(new, system, || self.prompt_new_passphrase(&mut state))?;
        let next = verified.rekeyed(secret.material())?;

        if state.secret_epoch != epoch {
            debug!(store = %self.name, "secret changed concurrently");
            return Err(KeywardError::AuthenticationDenied);
        }
        let public = Bytes::from(state.acl.to_bytes()?);
        let sequence = state.blob.sequence.wrapping_add(1);
        let blob = next.encode_core(self.signature, sequence, state.params, public)?;

        let was_locked = !state.core.is_valid();
        state.core = next;
        state.blob = blob;
        state.blob_version = state.version;
        state.secret_epoch += 1;
        if was_locked {
            self.on_unlocked(&mut state);
        } else {
            self.touch(&mut state);
        }
        info!(store = %self.name, "store passphrase changed");
        Ok(())
    }

    /// The current encoded blob, unlocking and re-encoding first if stale.
    pub fn blob(&self) -> Result<Bytes, KeywardError> {
        let mut state = self.state.lock();
        if state.blob_version != state.version {
            self.ensure_unlocked(&mut state, &Credentials::none())?;
            let public = Bytes::from(state.acl.to_bytes()?);
            let sequence = state.blob.sequence.wrapping_add(1);
            let blob = state
                .core
                .encode_core(self.signature, sequence, state.params, public)?;
            state.blob = blob;
            state.blob_version = state.version;
            debug!(store = %self.name, sequence, "store blob re-encoded");
            self.touch(&mut state);
        }
        Ok(state.blob.encode())
    }

    pub fn params(&self) -> StoreParams {
        self.state.lock().params
    }

    pub fn set_params(&self, params: StoreParams) {
        let mut state = self.state.lock();
        state.params = params;
        state.version += 1;
        self.touch(&mut state);
    }

    pub fn acl(&self) -> Acl {
        self.state.lock().acl.clone()
    }

    /// Edit the entry list, authorized by the current owner.
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

    fn administer(
        &self,
        credentials: &Credentials,
        process: &ProcessContext,
        change: impl FnOnce(&mut Acl) -> Result<(), KeywardError>,
    ) -> Result<(), KeywardError> {
        let snapshot = self.acl();
        let identity = ProcessIdentity::new(process);
        let outcome =
            self.with_environment(|env| snapshot.authorize_owner(credentials, &identity, env))?;

        let mut state = self.state.lock();
        let mut acl = state.acl.clone();
        acl.apply_upgrades(outcome.upgrades());
        change(&mut acl)?;
        state.acl = acl;
        state.version += 1;
        info!(store = %self.name, version = state.version, "store ACL changed");
        self.touch(&mut state);
        Ok(())
    }

    /// Run the store ACL for `tag`, applying any rewrite it produces.
    pub fn validate_access(
        &self,
        tag: AuthorizationTag,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Outcome, KeywardError> {
        let snapshot = self.acl();
        let identity = ProcessIdentity::new(process);
        let outcome =
            self.with_environment(|env| snapshot.validate(tag, credentials, &identity, env))?;

        let mut state = self.state.lock();
        if state.acl.apply_upgrades(outcome.upgrades()) {
            state.version += 1;
            info!(store = %self.name, %tag, version = state.version, "store ACL upgraded");
        }
        self.touch(&mut state);
        Ok(outcome)
    }

    /// Write the system key file for this store.
    pub fn write_system_keyfile(&self, credentials: &Credentials) -> Result<(), KeywardError> {
        if !self.name.is_system() {
            return Err(KeywardError::PermissionDenied(format!(
                "store `{}` is not system-scoped",
                self.name
            )));
        }
        let mut state = self.state.lock();
        self.ensure_unlocked(&mut state, credentials)?;
        let key = state
            .core
            .master_key()
            .ok_or_else(|| KeywardError::Internal("unlocked store without master key".into()))?;
        system_key::write_system_keyfile(&self.services.settings.system_keyfile, &self.signature, key)
    }

    /// Run `f` with the store unlocked (acquiring the secret from
    /// `credentials` if needed) and its state lock held.
    pub(crate) fn with_unlocked<R>(
        &self,
        credentials: &Credentials,
        f: impl FnOnce(&CryptoCore) -> Result<R, KeywardError>,
    ) -> Result<R, KeywardError> {
        let mut state = self.state.lock();
        self.ensure_unlocked(&mut state, credentials)?;
        let result = f(&state.core);
        self.touch(&mut state);
        result
    }

    /// Run `f` with an ACL environment whose agent is serialized on this
    /// store's interaction lock.
    pub(crate) fn with_environment<R>(&self, f: impl FnOnce(AclEnvironment<'_>) -> R) -> R {
        let serialized = self.services.agent.as_deref().map(|inner| SerializedAgent {
            inner,
            interaction: &self.interaction,
        });
        let agent = serialized.as_ref().map(|a| a as &dyn InteractiveAgent);
        f(self.services.acl_environment(agent))
    }

    fn ensure_unlocked(
        &self,
        state: &mut MutexGuard<'_, StoreState>,
        credentials: &Credentials,
    ) -> Result<(), KeywardError> {
        if state.core.is_valid() {
            return Ok(());
        }
        match self.acquire(state, credentials, true)? {
            Acquired::Core(core) => {
                state.core = core;
                self.on_unlocked(state);
            }
            Acquired::AlreadyUnlocked => {}
        }
        Ok(())
    }

    /// The secret-acquisition protocol, stopping at the first success.
    ///
    /// Trial decodes run on scratch cores against the cached blob, so a wrong
    /// secret never disturbs the store. With `stop_if_unlocked`, finding the
    /// store unlocked after a prompt ends the protocol.
    fn acquire(
        &self,
        state: &mut MutexGuard<'_, StoreState>,
        credentials: &Credentials,
        stop_if_unlocked: bool,
    ) -> Result<Acquired, KeywardError> {
        let system = self.name.is_system();
        if system {
            let path = &self.services.settings.system_keyfile;
            if let Some(key) = system_key::read_system_key(path, &self.signature)? {
                if let Some(core) = self.try_secret(state, SecretMaterial::MasterKey(key))? {
                    debug!(store = %self.name, "unlocked with system key file");
                    return Ok(Acquired::Core(core));
                }
            }
        }

        for sample in credentials.samples() {
            let attempt = match sample {
                CredentialSample::Interactive if !system => {
                    match self.prompt_for_secret(state, stop_if_unlocked)? {
                        Some(acquired) => return Ok(acquired),
                        None => continue,
                    }
                }
                CredentialSample::Interactive | CredentialSample::Cancel => continue,
                CredentialSample::Passphrase(passphrase) => {
                    self.try_secret(state, SecretMaterial::Passphrase(passphrase))?
                }
                CredentialSample::KeyMaterial { kind, material } => self.try_secret(
                    state,
                    SecretMaterial::Key {
                        kind: *kind,
                        material,
                    },
                )?,
            };
            if let Some(core) = attempt {
                return Ok(Acquired::Core(core));
            }
        }

        if credentials.is_empty() && !system {
            if let Some(acquired) = self.prompt_for_secret(state, stop_if_unlocked)? {
                return Ok(acquired);
            }
        }
        debug!(store = %self.name, "secret acquisition exhausted");
        Err(KeywardError::AuthenticationDenied)
    }

    fn try_secret(
        &self,
        state: &MutexGuard<'_, StoreState>,
        secret: SecretMaterial<'_>,
    ) -> Result<Option<CryptoCore>, KeywardError> {
        let mut core = state.core.scratch();
        Ok(core.try_secret(&state.blob, secret)?.then_some(core))
    }

    /// Ask the agent for the passphrase, up to the configured number of times.
    fn prompt_for_secret(
        &self,
        state: &mut MutexGuard<'_, StoreState>,
        stop_if_unlocked: bool,
    ) -> Result<Option<Acquired>, KeywardError> {
        let Some(agent) = self.services.agent.as_deref() else {
            return Ok(None);
        };
        for attempt in 1..=self.services.settings.max_unlock_prompts {
            let passphrase = MutexGuard::unlocked(state, || {
                let _interaction = self.interaction.lock();
                agent.query_passphrase(&PassphrasePrompt {
                    store: &self.name.name,
                    attempt,
                })
            })?;
            if stop_if_unlocked && state.core.is_valid() {
                return Ok(Some(Acquired::AlreadyUnlocked));
            }
            if let Some(core) = self.try_secret(state, SecretMaterial::Passphrase(&passphrase))? {
                return Ok(Some(Acquired::Core(core)));
            }
            debug!(store = %self.name, attempt, "wrong passphrase");
        }
        Ok(None)
    }

    fn prompt_new_passphrase(
        &self,
        state: &mut MutexGuard<'_, StoreState>,
    ) -> Result<Option<SecretString>, KeywardError> {
        let Some(agent) = self.services.agent.as_deref() else {
            return Ok(None);
        };
        MutexGuard::unlocked(state, || {
            let _interaction = self.interaction.lock();
            agent.query_new_passphrase(&self.name.name)
        })
        .map(Some)
    }

    fn on_unlocked(&self, state: &mut StoreState) {
        state.session = self.this.upgrade();
        self.rearm(state);
        info!(store = %self.name, "store unlocked");
    }

    fn touch(&self, state: &mut StoreState) {
        if state.core.is_valid() {
            self.rearm(state);
        } else {
            cancel_timer(state);
        }
    }

    fn rearm(&self, state: &mut StoreState) {
        cancel_timer(state);
        let Some(delay) = state.params.idle_timeout() else {
            return;
        };
        let generation = state.timer_generation;
        let store = self.this.clone();
        state.timer = self.services.scheduler.schedule(delay, move || {
            if let Some(store) = store.upgrade() {
                store.idle_expired(generation);
            }
        });
        debug!(store = %self.name, ?delay, "idle lock rescheduled");
    }

    fn idle_expired(&self, generation: u64) {
        let session = {
            let mut state = self.state.lock();
            if state.timer_generation != generation || !state.core.is_valid() {
                return;
            }
            info!(store = %self.name, "idle timeout reached");
            self.lock_state(&mut state)
        };
        drop(session);
    }

    /// Lock under the state mutex; the caller drops the returned session
    /// reference after releasing it.
    fn lock_state(&self, state: &mut StoreState) -> Option<Arc<SecretStore>> {
        cancel_timer(state);
        if state.core.is_valid() {
            state.lock_count += 1;
            info!(store = %self.name, "store locked");
        }
        state.core.invalidate();
        state.session.take()
    }
}

fn cancel_timer(state: &mut StoreState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.timer_generation = state.timer_generation.wrapping_add(1);
}

impl Drop for SecretStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        cancel_timer(state);
        debug!(store = %self.name, "store released");
    }
}
