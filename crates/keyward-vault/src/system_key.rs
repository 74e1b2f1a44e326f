// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The system unlock key file: `magic || store signature || master key`.
//!
//! System-scoped stores try it before anything else when unlocking. A file
//! for a different store is simply not applicable.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use keyward_core::types::STORE_SIGNATURE_LEN;
use keyward_core::{KeywardError, StoreSignature};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const SYSTEM_KEY_MAGIC: [u8; 4] = *b"KWSK";

const SYSTEM_KEY_LEN: usize = 4 + STORE_SIGNATURE_LEN + 32;

/// Write the key file for `signature`, readable by its owner only.
pub fn write_system_keyfile(
    path: &Path,
    signature: &StoreSignature,
    master_key: &[u8; 32],
) -> Result<(), KeywardError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(KeywardError::storage)?;
    }
    let mut contents = Zeroizing::new(Vec::with_capacity(SYSTEM_KEY_LEN));
    contents.extend_from_slice(&SYSTEM_KEY_MAGIC);
    contents.extend_from_slice(&signature.0);
    contents.extend_from_slice(master_key);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(KeywardError::storage)?;
    file.write_all(&contents).map_err(KeywardError::storage)?;
    file.sync_all().map_err(KeywardError::storage)?;
    info!(path = %path.display(), store = %signature, "system key file written");
    Ok(())
}

/// Master key for `signature`, if the key file exists and belongs to that store.
pub fn read_system_key(
    path: &Path,
    signature: &StoreSignature,
) -> Result<Option<Zeroizing<[u8; 32]>>, KeywardError> {
    let contents = match fs::read(path) {
        Ok(bytes) => Zeroizing::new(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no system key file");
            return Ok(None);
        }
        Err(e) => return Err(KeywardError::storage(e)),
    };
    if contents.len() != SYSTEM_KEY_LEN || contents[..4] != SYSTEM_KEY_MAGIC {
        warn!(path = %path.display(), "ignoring malformed system key file");
        return Ok(None);
    }
    let file_signature = &contents[4..4 + STORE_SIGNATURE_LEN];
    if !bool::from(file_signature.ct_eq(&signature.0)) {
        debug!(store = %signature, "system key file belongs to another store");
        return Ok(None);
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&contents[4 + STORE_SIGNATURE_LEN..]);
    Ok(Some(key))
}
