// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators and settings shared by every store of a daemon.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use keyward_acl::{AclEnvironment, LegacyGroupHeuristic};
use keyward_codesign::{CodeIdentityVerifier, EquivalenceSource};
use keyward_config::KeywardConfig;
use keyward_core::{CryptoProvider, InteractiveAgent, KdfParams, KeywardError, StoreParams};

use crate::timer::IdleScheduler;

/// Store settings taken from `[vault]`.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub kdf: KdfParams,
    pub default_params: StoreParams,
    pub system_keyfile: PathBuf,
    pub max_unlock_prompts: u32,
}

impl VaultSettings {
    pub fn from_config(config: &KeywardConfig) -> Self {
        Self {
            kdf: config.vault.kdf_params(),
            default_params: config.vault.default_store_params(),
            system_keyfile: config.vault.system_keyfile.clone(),
            max_unlock_prompts: config.vault.max_unlock_prompts.max(1),
        }
    }
}

pub struct StoreServices {
    pub provider: Arc<dyn CryptoProvider>,
    pub agent: Option<Arc<dyn InteractiveAgent>>,
    pub verifier: Option<Arc<CodeIdentityVerifier>>,
    pub heuristic: Option<LegacyGroupHeuristic>,
    pub scheduler: IdleScheduler,
    pub settings: VaultSettings,
}

impl fmt::Debug for StoreServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreServices")
            .field("has_agent", &self.agent.is_some())
            .field("verifier", &self.verifier)
            .field("heuristic", &self.heuristic)
            .field("scheduler", &self.scheduler)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl StoreServices {
    /// Wire up everything `config` describes around `provider`.
    pub fn from_config(
        config: &KeywardConfig,
        provider: Arc<dyn CryptoProvider>,
        agent: Option<Arc<dyn InteractiveAgent>>,
        equivalence: EquivalenceSource,
        scheduler: IdleScheduler,
    ) -> Result<Self, KeywardError> {
        let verifier =
            CodeIdentityVerifier::from_config(Arc::clone(&provider), equivalence, &config.codesign)?;
        let heuristic = LegacyGroupHeuristic::from_config(&config.codesign.legacy_group)?;
        Ok(Self {
            provider,
            agent,
            verifier: Some(Arc::new(verifier)),
            heuristic,
            scheduler,
            settings: VaultSettings::from_config(config),
        })
    }

    /// ACL environment with these services and `agent` standing in for the user.
    pub fn acl_environment<'a>(&'a self, agent: Option<&'a dyn InteractiveAgent>) -> AclEnvironment<'a> {
        AclEnvironment {
            verifier: self.verifier.as_deref(),
            agent,
            heuristic: self.heuristic.as_ref(),
            preauthorized: None,
        }
    }
}
