// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent legacy-hash equivalence links.
//!
//! A link maps a legacy code hash, in a user or system scope, to the canonical
//! name of the application it belongs to. Two hashes linked to the same name
//! are treated as the same application. The database is a process-wide
//! singleton with explicit open, reopen and close.
//!
//! Lock order: [`EquivalenceDatabase::interaction_lock`] before the internal
//! connection lock. The connection lock is never held across a prompt.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyward_core::{KeywardError, LegacyHash};
use parking_lot::{Mutex, MutexGuard, RwLock, const_rwlock};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

/// Record kind byte for legacy SHA-1 code hashes.
const LEGACY_HASH_KIND: u8 = 0x01;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS links (
    key  BLOB PRIMARY KEY,
    name TEXT NOT NULL
)";

static GLOBAL: RwLock<Option<Arc<EquivalenceDatabase>>> = const_rwlock(None);

/// Scope a link is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScope {
    User(u32),
    System,
}

impl LinkScope {
    /// Record key: kind byte, scope tag, NUL, hash bytes.
    fn record_key(self, hash: &LegacyHash) -> Vec<u8> {
        let scope = match self {
            Self::User(uid) => uid.to_string(),
            Self::System => "S".to_string(),
        };
        let mut key = Vec::with_capacity(1 + scope.len() + 1 + hash.as_bytes().len());
        key.push(LEGACY_HASH_KIND);
        key.extend_from_slice(scope.as_bytes());
        key.push(0);
        key.extend_from_slice(hash.as_bytes());
        key
    }
}

impl fmt::Display for LinkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(uid) => write!(f, "user:{uid}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Result of [`EquivalenceDatabase::confirm_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCheck {
    /// Missing links were written.
    Linked,
    /// Both hashes already resolve to the same name.
    AlreadyEquivalent,
    /// Both hashes resolve, to different names.
    Conflict { acl_name: String, process_name: String },
}

pub struct EquivalenceDatabase {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    interaction: Mutex<()>,
}

impl fmt::Debug for EquivalenceDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EquivalenceDatabase")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn sql_err(e: rusqlite::Error) -> KeywardError {
    KeywardError::storage(e)
}

impl EquivalenceDatabase {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, KeywardError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(KeywardError::storage)?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self, KeywardError> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, KeywardError> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        debug!(path = ?path, "equivalence database opened");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            interaction: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Serializes interactive link establishment. Take before any other lookup
    /// that leads to a prompt.
    pub fn interaction_lock(&self) -> MutexGuard<'_, ()> {
        self.interaction.lock()
    }

    /// Canonical name for `hash`, trying the user's scope before the system scope.
    pub fn lookup(&self, hash: &LegacyHash, uid: u32) -> Result<Option<String>, KeywardError> {
        let conn = self.conn.lock();
        lookup_in(&conn, hash, uid)
    }

    pub fn lookup_scoped(
        &self,
        hash: &LegacyHash,
        scope: LinkScope,
    ) -> Result<Option<String>, KeywardError> {
        let conn = self.conn.lock();
        get(&conn, &scope.record_key(hash))
    }

    /// Record `hash -> name` in `scope`, replacing any previous name.
    pub fn set_link(
        &self,
        hash: &LegacyHash,
        name: &str,
        scope: LinkScope,
    ) -> Result<(), KeywardError> {
        let conn = self.conn.lock();
        put(&conn, &scope.record_key(hash), name)
    }

    /// Link both hashes to `name` in one transaction.
    pub fn add_link(
        &self,
        old_hash: &LegacyHash,
        new_hash: &LegacyHash,
        name: &str,
        scope: LinkScope,
    ) -> Result<(), KeywardError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        put(&tx, &scope.record_key(old_hash), name)?;
        put(&tx, &scope.record_key(new_hash), name)?;
        tx.commit().map_err(sql_err)?;
        info!(%scope, name, "equivalence link added");
        Ok(())
    }

    /// Remove the link for `hash` if it names `name`. Returns whether a row was removed.
    pub fn remove_link(
        &self,
        hash: &LegacyHash,
        name: &str,
        scope: LinkScope,
    ) -> Result<bool, KeywardError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM links WHERE key = ?1 AND name = ?2",
                params![scope.record_key(hash), name],
            )
            .map_err(sql_err)?;
        if removed > 0 {
            info!(%scope, name, "equivalence link removed");
        }
        Ok(removed > 0)
    }

    /// Re-check both hashes and write whichever links are missing, atomically.
    ///
    /// Used after a confirmation prompt, so another thread may have linked
    /// either hash in the meantime.
    pub fn confirm_link(
        &self,
        acl_hash: &LegacyHash,
        process_hash: &LegacyHash,
        name: &str,
        uid: u32,
    ) -> Result<LinkCheck, KeywardError> {
        let mut conn = self.conn.lock();
        let acl_name = lookup_in(&conn, acl_hash, uid)?;
        let process_name = lookup_in(&conn, process_hash, uid)?;
        match (acl_name, process_name) {
            (Some(a), Some(p)) if a == p => Ok(LinkCheck::AlreadyEquivalent),
            (Some(acl_name), Some(process_name)) => Ok(LinkCheck::Conflict {
                acl_name,
                process_name,
            }),
            (acl_name, process_name) => {
                let name = acl_name.or(process_name).unwrap_or_else(|| name.to_string());
                let scope = LinkScope::User(uid);
                let tx = conn.transaction().map_err(sql_err)?;
                put(&tx, &scope.record_key(acl_hash), &name)?;
                put(&tx, &scope.record_key(process_hash), &name)?;
                tx.commit().map_err(sql_err)?;
                info!(%scope, name = %name, "equivalence link confirmed");
                Ok(LinkCheck::Linked)
            }
        }
    }

    /// Number of stored links.
    pub fn len(&self) -> Result<usize, KeywardError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))
            .map_err(sql_err)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, KeywardError> {
        Ok(self.len()? == 0)
    }
}

fn lookup_in(
    conn: &Connection,
    hash: &LegacyHash,
    uid: u32,
) -> Result<Option<String>, KeywardError> {
    if let Some(name) = get(conn, &LinkScope::User(uid).record_key(hash))? {
        return Ok(Some(name));
    }
    get(conn, &LinkScope::System.record_key(hash))
}

fn get(conn: &Connection, key: &[u8]) -> Result<Option<String>, KeywardError> {
    conn.query_row("SELECT name FROM links WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(sql_err)
}

fn put(conn: &Connection, key: &[u8], name: &str) -> Result<(), KeywardError> {
    conn.execute(
        "INSERT INTO links (key, name) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET name = excluded.name",
        params![key, name],
    )
    .map_err(sql_err)?;
    Ok(())
}

/// The process-wide database, if one is open.
pub fn global() -> Option<Arc<EquivalenceDatabase>> {
    GLOBAL.read().clone()
}

/// Open the process-wide database unless it is already open.
pub fn open_global(path: &Path) -> Result<Arc<EquivalenceDatabase>, KeywardError> {
    let mut slot = GLOBAL.write();
    if let Some(db) = slot.as_ref() {
        return Ok(Arc::clone(db));
    }
    let db = Arc::new(EquivalenceDatabase::open(path)?);
    *slot = Some(Arc::clone(&db));
    Ok(db)
}

/// Replace the process-wide database with a fresh connection to `path`.
///
/// Holders of the previous instance keep it until they drop their `Arc`.
pub fn reopen_global(path: &Path) -> Result<Arc<EquivalenceDatabase>, KeywardError> {
    let db = Arc::new(EquivalenceDatabase::open(path)?);
    *GLOBAL.write() = Some(Arc::clone(&db));
    info!(path = %path.display(), "equivalence database reopened");
    Ok(db)
}

pub fn close_global() {
    GLOBAL.write().take();
}

/// Where a verifier finds its equivalence database.
#[derive(Debug, Clone, Default)]
pub enum EquivalenceSource {
    /// Whatever [`global`] returns at lookup time.
    #[default]
    Global,
    Fixed(Arc<EquivalenceDatabase>),
    /// Legacy equivalence disabled.
    None,
}

impl EquivalenceSource {
    pub fn resolve(&self) -> Option<Arc<EquivalenceDatabase>> {
        match self {
            Self::Global => global(),
            Self::Fixed(db) => Some(Arc::clone(db)),
            Self::None => None,
        }
    }
}
