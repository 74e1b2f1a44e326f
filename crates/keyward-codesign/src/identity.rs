// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The code identity of a requesting process, computed once per validation.

use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use keyward_core::{CodeSignature, KeywardError, LegacyHash, ProcessContext};
use sha1::{Digest, Sha1};
use tracing::debug;

/// Extensions stripped when reducing a path or bundle name to its bare name.
const BUNDLE_EXTENSIONS: &[&str] = &["app", "appex", "bundle", "framework", "plugin", "exe"];

/// A requesting process plus its lazily computed legacy hash.
///
/// Lives for one validation attempt; hashing the executable happens at most once.
#[derive(Debug)]
pub struct ProcessIdentity<'a> {
    context: &'a ProcessContext,
    legacy: OnceLock<Option<LegacyHash>>,
}

impl<'a> ProcessIdentity<'a> {
    pub fn new(context: &'a ProcessContext) -> Self {
        Self {
            context,
            legacy: OnceLock::new(),
        }
    }

    pub fn context(&self) -> &'a ProcessContext {
        self.context
    }

    pub fn signature(&self) -> Option<&'a CodeSignature> {
        self.context.signature.as_ref()
    }

    pub fn uid(&self) -> u32 {
        self.context.uid
    }

    /// Legacy hash of the executable; `None` if it cannot be read.
    pub fn legacy_hash(&self) -> Option<LegacyHash> {
        *self.legacy.get_or_init(|| {
            self.context.legacy_hash.or_else(|| match hash_file(&self.context.path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    debug!(path = %self.context.path.display(), error = %e, "cannot hash executable");
                    None
                }
            })
        })
    }

    /// Bare name of the executable path.
    pub fn trimmed_path_name(&self) -> Option<String> {
        self.context.path.to_str().and_then(trimmed_name)
    }

    /// Whether `acl_path` names the same application as this process.
    pub fn matches_name(&self, acl_path: &str) -> bool {
        let Some(acl_name) = trimmed_name(acl_path) else {
            return false;
        };
        self.trimmed_path_name().as_deref() == Some(acl_name.as_str())
            || self.context.bundle_name.as_deref().and_then(trimmed_name).as_deref()
                == Some(acl_name.as_str())
    }

    /// Name under which equivalence links for this process are recorded.
    pub fn canonical_name(&self) -> String {
        self.context
            .bundle_name
            .as_deref()
            .and_then(trimmed_name)
            .or_else(|| self.signature().and_then(|s| trimmed_name(&s.identifier)))
            .or_else(|| self.trimmed_path_name())
            .unwrap_or_else(|| format!("pid-{}", self.context.pid))
    }
}

/// SHA-1 over a file's contents.
pub fn hash_file(path: &Path) -> Result<LegacyHash, KeywardError> {
    let mut file = File::open(path).map_err(KeywardError::storage)?;
    let mut hasher = Sha1::new();
    std::io::copy(&mut file, &mut hasher).map_err(KeywardError::storage)?;
    Ok(LegacyHash(hasher.finalize().into()))
}

/// Reduce a path or bundle name to its last component minus a bundle extension.
///
/// `/usr/lib/keyward/apps/Mail.app` and `Mail.app` both become `Mail`;
/// `com.example.mail` is left alone.
pub fn trimmed_name(name: &str) -> Option<String> {
    let last = name.trim_end_matches('/').rsplit('/').next()?;
    let bare = match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && BUNDLE_EXTENSIONS.contains(&ext) => stem,
        _ => last,
    };
    (!bare.is_empty()).then(|| bare.to_string())
}
