// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret stores for Keyward.
//!
//! A [`SecretStore`] owns an encrypted blob and a [`CryptoCore`] that holds
//! the master secret and working keys while the store is unlocked. Stores
//! lock themselves after an idle period via [`IdleScheduler`] and are shared
//! through a [`StoreRegistry`]. Keys live in stores as [`KeyObject`]s.

pub mod blob;
pub mod crypto_core;
pub mod key;
pub mod prompt;
pub mod registry;
pub mod services;
pub mod store;
pub mod system_key;
pub mod timer;

pub use blob::{STORE_BLOB_MAGIC, STORE_BLOB_VERSION, StoreBlob};
pub use crypto_core::{CryptoCore, SecretMaterial};
pub use key::{KEY_BLOB_MAGIC, KEY_BLOB_VERSION, KeyAlgorithm, KeyHeader, KeyObject};
pub use prompt::{PASSPHRASE_ENV_VAR, TtyAgent};
pub use registry::StoreRegistry;
pub use services::{StoreServices, VaultSettings};
pub use store::SecretStore;
pub use system_key::{read_system_key, write_system_keyfile};
pub use timer::IdleScheduler;
