// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared harness for the scenario tests.
//!
//! Each harness gets its own in-memory equivalence database, a temp
//! directory for the system key file, and a scripted agent.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keyward::{
    Credentials, EquivalenceDatabase, EquivalenceSource, IdleScheduler, InteractiveAgent, Keyward,
    RingCryptoProvider, StoreHandle, StoreName,
};
use keyward_test_utils::{ScriptedAgent, Signer, fast_config};
use tempfile::TempDir;

pub struct Harness {
    pub keyward: Keyward,
    pub agent: Arc<ScriptedAgent>,
    pub db: Arc<EquivalenceDatabase>,
    pub keyfile: PathBuf,
    _dir: TempDir,
}

pub struct HarnessBuilder {
    agent: Option<ScriptedAgent>,
    vendor_anchor: Option<[u8; 32]>,
    idle_timers: bool,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            agent: Some(ScriptedAgent::new()),
            vendor_anchor: None,
            idle_timers: false,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// A user store protected by `passphrase`.
    pub fn create_store(&self, name: &str, passphrase: &str) -> StoreHandle {
        self.keyward
            .create_store(
                StoreName::user(name),
                None,
                &Credentials::passphrase(passphrase),
                None,
            )
            .unwrap()
    }

    /// Open `handle`'s blob as an independent, locked store.
    pub fn open_copy(&self, handle: StoreHandle) -> StoreHandle {
        static COPIES: AtomicUsize = AtomicUsize::new(0);
        let blob = self.keyward.store_blob(handle).unwrap();
        let name = format!("copy-{}", COPIES.fetch_add(1, Ordering::Relaxed));
        self.keyward
            .open_store(StoreName::user(name), &blob, &Credentials::none())
            .unwrap()
    }
}

impl HarnessBuilder {
    pub fn with_agent(mut self, agent: ScriptedAgent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn without_agent(mut self) -> Self {
        self.agent = None;
        self
    }

    pub fn with_vendor(mut self, signer: &Signer) -> Self {
        self.vendor_anchor = Some(signer.public_key());
        self
    }

    /// Run idle timers on the current tokio runtime.
    pub fn with_idle_timers(mut self) -> Self {
        self.idle_timers = true;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let keyfile = dir.path().join("system.key");
        let mut config = fast_config();
        config.vault.system_keyfile = keyfile.clone();
        config.codesign.vendor_anchor = self.vendor_anchor.map(hex_key);

        let interactive = self.agent.is_some();
        let agent = Arc::new(self.agent.unwrap_or_default());
        let db = Arc::new(EquivalenceDatabase::open_in_memory().unwrap());
        let scheduler = if self.idle_timers {
            IdleScheduler::current()
        } else {
            IdleScheduler::disabled()
        };
        let keyward = Keyward::new(
            &config,
            Arc::new(RingCryptoProvider::new(self.vendor_anchor)),
            interactive.then(|| Arc::clone(&agent) as Arc<dyn InteractiveAgent>),
            EquivalenceSource::Fixed(Arc::clone(&db)),
            scheduler,
        )
        .unwrap();
        Harness {
            keyward,
            agent,
            db,
            keyfile,
            _dir: dir,
        }
    }
}

fn hex_key(key: [u8; 32]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}
