//! # Storage Engine Interface
//!
//! ## Design Principles
//!
//! 1. **Strategy Pattern**: Abstract the engine behind a trait so sessions do
//!    not depend on a concrete map implementation.
//! 2. **Binary-Safe API**: Keys/values are byte buffers; the protocol layer
//!    decides what a valid token is.
//! 3. **Per-Operation Atomicity**: Every call is atomic on its own. There is
//!    no API that spans several calls.
//! 4. **Infallible Surface**: An in-memory map cannot fail these operations, so
//!    the trait does not pretend it can.

use bytes::Bytes;

/// Strategy pattern: defines the engine behavior surface for the server.
pub trait KvEngine: Send + Sync {
    /// Returns the value for a key, or `None` if missing.
    ///
    /// Must not create an entry for a missing key.
    fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Inserts or replaces a key with the provided value.
    fn set(&self, key: Bytes, value: Bytes);

    /// Removes a key. Returns true if the key existed and was removed.
    fn delete(&self, key: &[u8]) -> bool;

    /// Returns the number of live entries.
    fn count(&self) -> usize;
}
