// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Keyward daemon.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a typo in a config file
//! is reported at startup instead of silently falling back to a default.

use std::path::PathBuf;

use keyward_core::{KdfParams, StoreParams};
use serde::{Deserialize, Serialize};

/// Top-level Keyward configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeywardConfig {
    /// Secret store lifecycle and key derivation settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Code identity and legacy equivalence settings.
    #[serde(default)]
    pub codesign: CodesignConfig,
}

/// Secret store settings.
///
/// A store blob recording KDF costs above four times the configured ones is
/// rejected as malformed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,

    /// Idle timeout given to newly created stores, in seconds. Zero disables idle locking.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u32,

    /// Whether newly created stores lock when the system sleeps.
    #[serde(default = "default_true")]
    pub lock_on_sleep: bool,

    /// Key file that unlocks system-scoped stores without a prompt.
    #[serde(default = "default_system_keyfile")]
    pub system_keyfile: PathBuf,

    /// How many times the default unlock action re-prompts after a wrong passphrase.
    #[serde(default = "default_max_unlock_prompts")]
    pub max_unlock_prompts: u32,
}

impl VaultConfig {
    /// Argon2id costs for newly established secrets.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            memory_cost: self.kdf_memory_cost,
            iterations: self.kdf_iterations,
            parallelism: self.kdf_parallelism,
        }
    }

    /// Lifecycle parameters given to newly created stores.
    pub fn default_store_params(&self) -> StoreParams {
        StoreParams {
            idle_timeout_secs: self.idle_timeout_secs,
            lock_on_sleep: self.lock_on_sleep,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
            idle_timeout_secs: default_idle_timeout_secs(),
            lock_on_sleep: true,
            system_keyfile: default_system_keyfile(),
            max_unlock_prompts: default_max_unlock_prompts(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536 // 64 MiB per OWASP recommendation
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

fn default_idle_timeout_secs() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

fn default_system_keyfile() -> PathBuf {
    PathBuf::from("/var/db/keyward/system.key")
}

fn default_max_unlock_prompts() -> u32 {
    3
}

/// Code identity settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CodesignConfig {
    /// SQLite file holding legacy hash equivalence links.
    #[serde(default = "default_equivalence_db")]
    pub equivalence_db: PathBuf,

    /// Hex-encoded Ed25519 public key that `anchor vendor` refers to.
    #[serde(default)]
    pub vendor_anchor: Option<String>,

    /// Requirement a signed client must meet to silently adopt a legacy ACL entry.
    #[serde(default = "default_vendor_requirement")]
    pub vendor_requirement: String,

    /// Well-known application group heuristic.
    #[serde(default)]
    pub legacy_group: LegacyGroupConfig,
}

impl CodesignConfig {
    /// Decoded vendor anchor key, if one is configured and well formed.
    pub fn vendor_anchor_key(&self) -> Option<[u8; 32]> {
        let text = self.vendor_anchor.as_deref()?;
        hex::decode(text).ok()?.try_into().ok()
    }
}

impl Default for CodesignConfig {
    fn default() -> Self {
        Self {
            equivalence_db: default_equivalence_db(),
            vendor_anchor: None,
            vendor_requirement: default_vendor_requirement(),
            legacy_group: LegacyGroupConfig::default(),
        }
    }
}

fn default_equivalence_db() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("keyward/equivalence.db"))
        .unwrap_or_else(|| PathBuf::from("keyward-equivalence.db"))
}

fn default_vendor_requirement() -> String {
    "anchor vendor".to_string()
}

/// Recognizes ACL entries that list most of a well-known application group.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyGroupConfig {
    /// Whether the heuristic runs at all (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum number of `paths` an entry must name to be recognized.
    #[serde(default = "default_group_threshold")]
    pub threshold: usize,

    /// Installation paths of the group's applications.
    #[serde(default = "default_group_paths")]
    pub paths: Vec<String>,

    /// Requirement a client must meet to be admitted as a group member.
    #[serde(default = "default_group_requirement")]
    pub group_requirement: String,
}

impl Default for LegacyGroupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_group_threshold(),
            paths: default_group_paths(),
            group_requirement: default_group_requirement(),
        }
    }
}

fn default_group_threshold() -> usize {
    6
}

fn default_group_paths() -> Vec<String> {
    [
        "Mail", "Calendar", "Contacts", "Messages", "Browser", "Notes", "Reminders", "Photos",
        "Accounts",
    ]
    .iter()
    .map(|app| format!("/usr/lib/keyward/apps/{app}.app"))
    .collect()
}

fn default_group_requirement() -> String {
    r#"anchor vendor and group "keyward.apps""#.to_string()
}
