//! In-memory storage implementation

use bytes::Bytes;
use siphasher::sip::SipHasher13;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasherDefault;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Hash map keyed by raw bytes, hashed with SipHasher
type BytesMap<V> = HashMap<Bytes, V, BuildHasherDefault<SipHasher13>>;

fn bytes_map<V>(capacity: usize) -> BytesMap<V> {
    HashMap::with_capacity_and_hasher(capacity, BuildHasherDefault::<SipHasher13>::default())
}

/// In-memory key-value store
///
/// Holds two independent key spaces, one for plain strings and one for
/// hashes. Each space sits behind its own reader/writer lock, so readers of
/// a space run in parallel and a writer to one space never waits on the
/// other. Locks are only held for the duration of a single map operation.
pub struct Store {
    strings: RwLock<BytesMap<Bytes>>,
    hashes: RwLock<BytesMap<BytesMap<Bytes>>>,
}

impl Store {
    /// Create a new store with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new store with the given initial capacity per key space
    pub fn with_capacity(capacity: usize) -> Self {
        Store {
            strings: RwLock::new(bytes_map(capacity)),
            hashes: RwLock::new(bytes_map(capacity)),
        }
    }

    /// Set a string key, replacing any previous value
    pub fn string_set(&self, key: Bytes, value: Bytes) {
        write(&self.strings).insert(key, value);
    }

    /// Get a string value, None if the key was never set
    pub fn string_get(&self, key: &[u8]) -> Option<Bytes> {
        read(&self.strings).get(key).cloned()
    }

    /// Set a field in a hash, creating the hash if needed
    ///
    /// Returns true if the field did not exist before.
    pub fn hash_set(&self, key: Bytes, field: Bytes, value: Bytes) -> bool {
        write(&self.hashes)
            .entry(key)
            .or_insert_with(|| bytes_map(8))
            .insert(field, value)
            .is_none()
    }

    /// Get a single hash field
    pub fn hash_get(&self, key: &[u8], field: &[u8]) -> Option<Bytes> {
        read(&self.hashes)
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned()
    }

    /// Get every field/value pair of a hash, sorted by field
    pub fn hash_get_all(&self, key: &[u8]) -> Vec<(Bytes, Bytes)> {
        let hashes = read(&self.hashes);
        let mut pairs: Vec<(Bytes, Bytes)> = match hashes.get(key) {
            Some(hash) => hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
            None => Vec::new(),
        };
        drop(hashes);

        pairs.sort();
        pairs
    }

    /// Get statistics about the store
    pub fn stats(&self) -> StoreStats {
        let string_keys = read(&self.strings).len();
        let hashes = read(&self.hashes);

        StoreStats {
            string_keys,
            hash_keys: hashes.len(),
            hash_fields: hashes.values().map(|hash| hash.len()).sum(),
        }
    }

    /// Ordered copy of the whole store, for comparing states
    pub fn snapshot(&self) -> Snapshot {
        let strings: BTreeMap<Bytes, Bytes> = read(&self.strings)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let hashes: BTreeMap<Bytes, BTreeMap<Bytes, Bytes>> = read(&self.hashes)
            .iter()
            .map(|(k, hash)| {
                let fields: BTreeMap<Bytes, Bytes> =
                    hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect();
                (k.clone(), fields)
            })
            .collect();

        Snapshot { strings, hashes }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

// A panic while holding a guard cannot leave a map half-updated: every
// mutation is a single insert. Recover the guard instead of propagating.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Statistics about the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub string_keys: usize,
    pub hash_keys: usize,
    pub hash_fields: usize,
}

/// Point-in-time, ordered copy of both key spaces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub strings: BTreeMap<Bytes, Bytes>,
    pub hashes: BTreeMap<Bytes, BTreeMap<Bytes, Bytes>>,
}
