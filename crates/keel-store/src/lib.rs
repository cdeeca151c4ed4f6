//! Concurrent typed key-value storage for Keel.
//!
//! A [`SnapshotStore<V>`] maps non-empty string keys to values of a single
//! type `V`. It is safe to share between threads without external locking
//! and can optionally be bound to a snapshot file that is rewritten in full
//! after every mutation (write-through persistence).
//!
//! # Design Rules
//!
//! 1. The in-memory mapping is the source of truth.
//! 2. The snapshot file reflects the mapping as of the last completed write.
//! 3. A missing snapshot file means an empty store; a damaged one is fatal.
//! 4. Deletions persist exactly like stores.
//! 5. Write-through failures are returned to the caller and logged.

pub mod error;
pub mod snapshot;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use snapshot::{SnapshotConfig, SnapshotFormat, SyncMode};
pub use store::SnapshotStore;
pub use traits::KeyValueStore;
