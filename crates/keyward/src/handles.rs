// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque handles for stores and keys held by clients.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use keyward_core::KeywardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHandle(pub(crate) u64);

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

/// What an access check runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTarget {
    Store(StoreHandle),
    Key(KeyHandle),
}

impl From<StoreHandle> for AccessTarget {
    fn from(handle: StoreHandle) -> Self {
        Self::Store(handle)
    }
}

impl From<KeyHandle> for AccessTarget {
    fn from(handle: KeyHandle) -> Self {
        Self::Key(handle)
    }
}

/// Handle-to-object map. Handles are never reused.
pub(crate) struct HandleTable<T> {
    kind: &'static str,
    next: AtomicU64,
    entries: DashMap<u64, Arc<T>>,
}

impl<T> HandleTable<T> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            next: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, value: Arc<T>) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, value);
        id
    }

    pub(crate) fn get(&self, id: u64) -> Result<Arc<T>, KeywardError> {
        self.entries
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| self.not_found(id))
    }

    pub(crate) fn remove(&self, id: u64) -> Result<Arc<T>, KeywardError> {
        self.entries
            .remove(&id)
            .map(|(_, value)| value)
            .ok_or_else(|| self.not_found(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn not_found(&self, id: u64) -> KeywardError {
        KeywardError::NotFound {
            kind: self.kind,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_not_reused() {
        let table = HandleTable::new("thing");
        let a = table.insert(Arc::new(1));
        table.remove(a).unwrap();
        let b = table.insert(Arc::new(2));
        assert_ne!(a, b);
        assert!(matches!(
            table.get(a),
            Err(KeywardError::NotFound { kind: "thing", .. })
        ));
        assert_eq!(*table.get(b).unwrap(), 2);
        assert_eq!(table.len(), 1);
    }
}
