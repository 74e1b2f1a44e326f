// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live stores keyed by (name, signature).
//!
//! The registry holds only weak references; a store lives as long as some
//! handle or its own session reference does. Sweeps collect strong
//! references first and act on each store with the registry lock released.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use keyward_acl::Acl;
use keyward_core::{Credentials, KeywardError, StoreName, StoreParams, StoreSignature};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::blob::StoreBlob;
use crate::services::StoreServices;
use crate::store::SecretStore;

type StoreKey = (StoreName, StoreSignature);

#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<StoreKey, Weak<SecretStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store and register it.
    pub fn create(
        &self,
        services: Arc<StoreServices>,
        name: StoreName,
        params: Option<StoreParams>,
        credentials: &Credentials,
        acl: Option<Acl>,
    ) -> Result<Arc<SecretStore>, KeywardError> {
        let store = SecretStore::create(services, name, params, credentials, acl)?;
        Ok(self.register(store))
    }

    /// Open a blob, sharing the live instance if its identity is already open.
    pub fn open(
        &self,
        services: Arc<StoreServices>,
        name: StoreName,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<Arc<SecretStore>, KeywardError> {
        let signature = StoreBlob::peek_identity(data)?;
        let store = match self.get(&name, signature) {
            Some(live) => {
                debug!(store = %name, %signature, "sharing live store");
                live
            }
            None => self.register(SecretStore::open(services, name, data, &Credentials::none())?),
        };
        if !credentials.is_empty() {
            store.unlock(credentials)?;
        }
        Ok(store)
    }

    /// Insert `store`, or return the instance that won a concurrent open.
    fn register(&self, store: Arc<SecretStore>) -> Arc<SecretStore> {
        let key = (store.name().clone(), store.signature());
        let mut stores = self.stores.lock();
        stores.retain(|_, weak| weak.strong_count() > 0);
        if let Some(live) = stores.get(&key).and_then(Weak::upgrade) {
            return live;
        }
        stores.insert(key, Arc::downgrade(&store));
        store
    }

    pub fn get(&self, name: &StoreName, signature: StoreSignature) -> Option<Arc<SecretStore>> {
        self.stores
            .lock()
            .get(&(name.clone(), signature))
            .and_then(Weak::upgrade)
    }

    /// Strong references to every live store.
    pub fn live(&self) -> Vec<Arc<SecretStore>> {
        self.stores.lock().values().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lock_all(&self) {
        let stores = self.live();
        info!(count = stores.len(), "locking all stores");
        for store in stores {
            store.lock();
        }
    }

    /// Lock every store whose parameters ask for it on sleep.
    pub fn system_will_sleep(&self) {
        let stores = self.live();
        debug!(count = stores.len(), "system will sleep");
        for store in stores {
            store.system_will_sleep();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_codesign::EquivalenceSource;
    use keyward_crypto::RingCryptoProvider;
    use keyward_test_utils::fast_config;

    use crate::timer::IdleScheduler;

    fn services() -> Arc<StoreServices> {
        Arc::new(
            StoreServices::from_config(
                &fast_config(),
                Arc::new(RingCryptoProvider::new(None)),
                None,
                EquivalenceSource::None,
                IdleScheduler::disabled(),
            )
            .unwrap(),
        )
    }

    fn create(registry: &StoreRegistry, services: &Arc<StoreServices>, name: &str) -> Arc<SecretStore> {
        registry
            .create(
                Arc::clone(services),
                StoreName::user(name),
                None,
                &Credentials::passphrase("pw"),
                None,
            )
            .unwrap()
    }

    #[test]
    fn opening_a_live_identity_shares_the_instance() {
        let registry = StoreRegistry::new();
        let services = services();
        let store = create(&registry, &services, "login");
        let blob = store.blob().unwrap();

        let opened = registry
            .open(Arc::clone(&services), StoreName::user("login"), &blob, &Credentials::none())
            .unwrap();
        assert!(Arc::ptr_eq(&store, &opened));
        assert!(!opened.is_locked());

        let other_name = registry
            .open(services, StoreName::user("copy"), &blob, &Credentials::none())
            .unwrap();
        assert!(!Arc::ptr_eq(&store, &other_name));
        assert!(other_name.is_locked());
    }

    #[test]
    fn dead_stores_drop_out() {
        let registry = StoreRegistry::new();
        let services = services();
        let store = create(&registry, &services, "login");
        assert_eq!(registry.len(), 1);
        store.lock();
        drop(store);
        assert!(registry.is_empty());
    }

    #[test]
    fn lock_all_and_sleep_sweep_every_store() {
        let registry = StoreRegistry::new();
        let services = services();
        let a = create(&registry, &services, "a");
        let b = create(&registry, &services, "b");
        b.set_params(StoreParams {
            idle_timeout_secs: 0,
            lock_on_sleep: false,
        });

        registry.system_will_sleep();
        assert!(a.is_locked());
        assert!(!b.is_locked());

        registry.lock_all();
        assert!(b.is_locked());
    }

    #[test]
    fn malformed_blob_is_rejected_before_lookup() {
        let registry = StoreRegistry::new();
        let err = registry
            .open(services(), StoreName::user("x"), b"nope", &Credentials::none())
            .unwrap_err();
        assert!(matches!(err, KeywardError::MalformedBlob(_)));
    }
}
