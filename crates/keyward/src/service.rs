// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The operation surface clients talk to.
//!
//! Every operation resolves a handle, then delegates to the store, key or
//! equivalence database behind it. Operations may block on user input; call
//! them from a blocking-capable thread.

use std::sync::Arc;

use bytes::Bytes;
use keyward_acl::{Acl, AclEdit, Outcome, Subject};
use keyward_codesign::{EquivalenceDatabase, EquivalenceSource, LinkScope, open_global};
use keyward_config::KeywardConfig;
use keyward_core::{
    AuthorizationTag, Credentials, CryptoProvider, InteractiveAgent, KeywardError, LegacyHash,
    ProcessContext, StoreName, StoreParams,
};
use keyward_crypto::RingCryptoProvider;
use keyward_vault::{
    IdleScheduler, KeyAlgorithm, KeyObject, SecretStore, StoreRegistry, StoreServices,
};
use tracing::{debug, info};

use crate::handles::{AccessTarget, HandleTable, KeyHandle, StoreHandle};

pub struct Keyward {
    services: Arc<StoreServices>,
    equivalence: EquivalenceSource,
    registry: StoreRegistry,
    stores: HandleTable<SecretStore>,
    keys: HandleTable<KeyObject>,
}

impl Keyward {
    pub fn new(
        config: &KeywardConfig,
        provider: Arc<dyn CryptoProvider>,
        agent: Option<Arc<dyn InteractiveAgent>>,
        equivalence: EquivalenceSource,
        scheduler: IdleScheduler,
    ) -> Result<Self, KeywardError> {
        let services =
            StoreServices::from_config(config, provider, agent, equivalence.clone(), scheduler)?;
        Ok(Self {
            services: Arc::new(services),
            equivalence,
            registry: StoreRegistry::new(),
            stores: HandleTable::new("store"),
            keys: HandleTable::new("key"),
        })
    }

    /// Production wiring: ring provider with the configured vendor anchor,
    /// the process-wide equivalence database, and idle timers on the current
    /// tokio runtime.
    pub fn from_config(
        config: &KeywardConfig,
        agent: Option<Arc<dyn InteractiveAgent>>,
    ) -> Result<Self, KeywardError> {
        open_global(&config.codesign.equivalence_db)?;
        let provider = Arc::new(RingCryptoProvider::new(config.codesign.vendor_anchor_key()));
        Self::new(
            config,
            provider,
            agent,
            EquivalenceSource::Global,
            IdleScheduler::current(),
        )
    }

    pub fn services(&self) -> &Arc<StoreServices> {
        &self.services
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    // --- stores ---

    pub fn create_store(
        &self,
        name: StoreName,
        params: Option<StoreParams>,
        credentials: &Credentials,
        acl: Option<Acl>,
    ) -> Result<StoreHandle, KeywardError> {
        let store =
            self.registry
                .create(Arc::clone(&self.services), name, params, credentials, acl)?;
        Ok(StoreHandle(self.stores.insert(store)))
    }

    pub fn open_store(
        &self,
        name: StoreName,
        blob: &[u8],
        credentials: &Credentials,
    ) -> Result<StoreHandle, KeywardError> {
        let store = self
            .registry
            .open(Arc::clone(&self.services), name, blob, credentials)?;
        let handle = StoreHandle(self.stores.insert(store));
        debug!(%handle, "store handle issued");
        Ok(handle)
    }

    /// Drop a client's handle. The store lives on while unlocked or shared.
    pub fn release_store(&self, handle: StoreHandle) -> Result<(), KeywardError> {
        self.stores.remove(handle.0).map(drop)
    }

    pub fn store(&self, handle: StoreHandle) -> Result<Arc<SecretStore>, KeywardError> {
        self.stores.get(handle.0)
    }

    pub fn unlock_store(
        &self,
        handle: StoreHandle,
        credentials: &Credentials,
    ) -> Result<(), KeywardError> {
        self.store(handle)?.unlock(credentials)
    }

    pub fn lock_store(&self, handle: StoreHandle) -> Result<(), KeywardError> {
        self.store(handle)?.lock();
        Ok(())
    }

    pub fn is_locked(&self, handle: StoreHandle) -> Result<bool, KeywardError> {
        Ok(self.store(handle)?.is_locked())
    }

    pub fn activity(&self, handle: StoreHandle) -> Result<(), KeywardError> {
        self.store(handle)?.activity();
        Ok(())
    }

    pub fn change_passphrase(
        &self,
        handle: StoreHandle,
        old: &Credentials,
        new: &Credentials,
    ) -> Result<(), KeywardError> {
        self.store(handle)?.change_passphrase(old, new)
    }

    pub fn store_blob(&self, handle: StoreHandle) -> Result<Bytes, KeywardError> {
        self.store(handle)?.blob()
    }

    pub fn store_version(&self, handle: StoreHandle) -> Result<u64, KeywardError> {
        Ok(self.store(handle)?.version())
    }

    pub fn get_params(&self, handle: StoreHandle) -> Result<StoreParams, KeywardError> {
        Ok(self.store(handle)?.params())
    }

    pub fn set_params(&self, handle: StoreHandle, params: StoreParams) -> Result<(), KeywardError> {
        self.store(handle)?.set_params(params);
        Ok(())
    }

    pub fn get_acl(&self, handle: StoreHandle) -> Result<Acl, KeywardError> {
        Ok(self.store(handle)?.acl())
    }

    pub fn set_owner(
        &self,
        handle: StoreHandle,
        owner: Subject,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<(), KeywardError> {
        self.store(handle)?.set_owner(owner, credentials, process)
    }

    pub fn change_acl(
        &self,
        handle: StoreHandle,
        edit: AclEdit,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<(), KeywardError> {
        self.store(handle)?.change_acl(edit, credentials, process)
    }

    // --- keys ---

    pub fn generate_key(
        &self,
        handle: StoreHandle,
        algorithm: KeyAlgorithm,
        label: &str,
        acl: Option<Acl>,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<KeyHandle, KeywardError> {
        let store = self.store(handle)?;
        let key = KeyObject::generate(store, algorithm, label, acl, credentials, process)?;
        Ok(KeyHandle(self.keys.insert(key)))
    }

    pub fn decode_key(&self, handle: StoreHandle, blob: &[u8]) -> Result<KeyHandle, KeywardError> {
        let key = KeyObject::decode(self.store(handle)?, blob)?;
        Ok(KeyHandle(self.keys.insert(key)))
    }

    pub fn encode_key(&self, key: KeyHandle) -> Result<Bytes, KeywardError> {
        self.key(key)?.encode()
    }

    pub fn release_key(&self, key: KeyHandle) -> Result<(), KeywardError> {
        self.keys.remove(key.0).map(drop)
    }

    pub fn key(&self, key: KeyHandle) -> Result<Arc<KeyObject>, KeywardError> {
        self.keys.get(key.0)
    }

    pub fn change_key_acl(
        &self,
        key: KeyHandle,
        edit: AclEdit,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<(), KeywardError> {
        self.key(key)?.change_acl(edit, credentials, process)
    }

    // --- access ---

    pub fn validate_access(
        &self,
        target: impl Into<AccessTarget>,
        tag: AuthorizationTag,
        credentials: &Credentials,
        process: &ProcessContext,
    ) -> Result<Outcome, KeywardError> {
        match target.into() {
            AccessTarget::Store(handle) => {
                self.store(handle)?
                    .validate_access(tag, credentials, process)
            }
            AccessTarget::Key(key) => self.key(key)?.validate_access(tag, credentials, process),
        }
    }

    // --- equivalence administration ---

    /// Link two legacy hashes to `name`. System-wide links need a privileged
    /// caller.
    pub fn add_link(
        &self,
        old_hash: &LegacyHash,
        new_hash: &LegacyHash,
        name: &str,
        for_system: bool,
        caller: &ProcessContext,
    ) -> Result<(), KeywardError> {
        let scope = link_scope(for_system, caller)?;
        self.equivalence_db()?
            .add_link(old_hash, new_hash, name, scope)
    }

    pub fn remove_link(
        &self,
        hash: &LegacyHash,
        name: &str,
        for_system: bool,
        caller: &ProcessContext,
    ) -> Result<bool, KeywardError> {
        let scope = link_scope(for_system, caller)?;
        self.equivalence_db()?.remove_link(hash, name, scope)
    }

    pub fn equivalence_db(&self) -> Result<Arc<EquivalenceDatabase>, KeywardError> {
        self.equivalence
            .resolve()
            .ok_or_else(|| KeywardError::Config("equivalence database is not open".into()))
    }

    // --- system ---

    pub fn lock_all(&self) {
        self.registry.lock_all();
    }

    pub fn system_will_sleep(&self) {
        self.registry.system_will_sleep();
    }

    /// Write the system unlock key file for a system-scoped store.
    pub fn write_system_keyfile(
        &self,
        handle: StoreHandle,
        credentials: &Credentials,
        caller: &ProcessContext,
    ) -> Result<(), KeywardError> {
        if !caller.is_privileged() {
            return Err(KeywardError::PermissionDenied(
                "writing the system key file requires root".into(),
            ));
        }
        self.store(handle)?.write_system_keyfile(credentials)?;
        info!(%handle, "system key file written for store");
        Ok(())
    }

    pub fn open_handles(&self) -> (usize, usize) {
        (self.stores.len(), self.keys.len())
    }
}

fn link_scope(for_system: bool, caller: &ProcessContext) -> Result<LinkScope, KeywardError> {
    if !for_system {
        return Ok(LinkScope::User(caller.uid));
    }
    if !caller.is_privileged() {
        return Err(KeywardError::PermissionDenied(
            "system equivalence links require root".into(),
        ));
    }
    Ok(LinkScope::System)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_scope_follows_the_caller() {
        let user = ProcessContext::new(10, 501, "/usr/bin/admin");
        let root = ProcessContext::new(11, 0, "/usr/sbin/admin");
        assert_eq!(link_scope(false, &user).unwrap(), LinkScope::User(501));
        assert_eq!(link_scope(true, &root).unwrap(), LinkScope::System);
        assert!(matches!(
            link_scope(true, &user),
            Err(KeywardError::PermissionDenied(_))
        ));
    }
}
