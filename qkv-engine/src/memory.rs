//! # In-Memory Engine
//!
//! A single `hashbrown` map behind one `parking_lot::Mutex`.
//!
//! Reads take the same lock as writes: a lookup or a length query racing a
//! concurrent insert would observe a map mid-rehash. A reader/writer lock is
//! not used because every critical section is a single hash lookup.

use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::engine::KvEngine;

type Map = HashMap<Bytes, Bytes, ahash::RandomState>;

/// Mutex-guarded key/value map shared by every session.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    map: Mutex<Map>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        MemoryEngine {
            map: Mutex::new(Map::default()),
        }
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        // Bytes is refcounted, the clone does not copy the value.
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: Bytes, value: Bytes) {
        self.map.lock().insert(key, value);
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.map.lock().remove(key).is_some()
    }

    fn count(&self) -> usize {
        self.map.lock().len()
    }
}
