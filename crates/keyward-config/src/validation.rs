// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use keyward_core::Requirement;

use crate::diagnostic::ConfigError;
use crate::model::KeywardConfig;

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &KeywardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let vault = &config.vault;
    if vault.kdf_memory_cost < 32768 {
        fail(format!(
            "vault.kdf_memory_cost must be at least 32768 (32 MiB), got {}",
            vault.kdf_memory_cost
        ));
    }
    if vault.kdf_iterations < 2 {
        fail(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            vault.kdf_iterations
        ));
    }
    if vault.kdf_parallelism < 1 {
        fail(format!(
            "vault.kdf_parallelism must be at least 1, got {}",
            vault.kdf_parallelism
        ));
    }
    if vault.max_unlock_prompts < 1 {
        fail("vault.max_unlock_prompts must be at least 1".to_string());
    }
    if vault.system_keyfile.as_os_str().is_empty() {
        fail("vault.system_keyfile must not be empty".to_string());
    }

    let codesign = &config.codesign;
    if codesign.equivalence_db.as_os_str().is_empty() {
        fail("codesign.equivalence_db must not be empty".to_string());
    }
    if let Some(anchor) = &codesign.vendor_anchor
        && codesign.vendor_anchor_key().is_none()
    {
        fail(format!(
            "codesign.vendor_anchor must be 64 hex characters (an Ed25519 public key), got `{anchor}`"
        ));
    }
    if let Err(e) = Requirement::parse(&codesign.vendor_requirement) {
        fail(format!("codesign.vendor_requirement: {e}"));
    }

    let group = &codesign.legacy_group;
    if group.enabled {
        if group.threshold == 0 || group.threshold > group.paths.len() {
            fail(format!(
                "codesign.legacy_group.threshold must be between 1 and the number of paths ({}), got {}",
                group.paths.len(),
                group.threshold
            ));
        }
        if let Err(e) = Requirement::parse(&group.group_requirement) {
            fail(format!("codesign.legacy_group.group_requirement: {e}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&KeywardConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = KeywardConfig::default();
        config.vault.kdf_memory_cost = 1024;
        config.vault.kdf_iterations = 1;
        config.codesign.vendor_anchor = Some("not-hex".to_string());
        config.codesign.legacy_group.threshold = 10;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn unparsable_requirement_is_reported() {
        let mut config = KeywardConfig::default();
        config.codesign.vendor_requirement = "identifier".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("vendor_requirement"));
    }

    #[test]
    fn disabled_group_skips_threshold_check() {
        let mut config = KeywardConfig::default();
        config.codesign.legacy_group.enabled = false;
        config.codesign.legacy_group.threshold = 0;
        assert!(validate_config(&config).is_ok());
    }
}
