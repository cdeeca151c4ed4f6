//! Content hashing for Keel.
//!
//! Provides a domain-separated BLAKE3 hasher over the canonical JSON form of
//! any serializable value. Digests are stable across runs and independent of
//! map iteration order, which makes them usable as HTTP entity tags for
//! optimistic concurrency.

pub mod hasher;

pub use hasher::{canonical_json, etag, ContentHasher, HasherError};
