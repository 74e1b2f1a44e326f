// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading through Figment.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/keyward/keyward.toml`, `$XDG_CONFIG_HOME/keyward/keyward.toml`,
//! `./keyward.toml`, then `KEYWARD_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeywardConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/keyward/keyward.toml";

/// Per-directory configuration file.
pub const LOCAL_CONFIG_PATH: &str = "keyward.toml";

/// The user's XDG configuration file, if a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keyward/keyward.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<KeywardConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<KeywardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeywardConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file, with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeywardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeywardConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], exposed so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeywardConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Map `KEYWARD_SECTION_KEY` to `section.key`.
///
/// Only the section prefix is rewritten, so `KEYWARD_VAULT_KDF_MEMORY_COST`
/// becomes `vault.kdf_memory_cost` rather than `vault.kdf.memory.cost`.
fn env_provider() -> Env {
    Env::prefixed("KEYWARD_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("vault_", "vault.", 1)
            .replacen("codesign_legacy_group_", "codesign.legacy_group.", 1)
            .replacen("codesign_", "codesign.", 1);
        mapped.into()
    })
}
