//! Foundation types for Keel.
//!
//! This crate provides the small value types shared by every other Keel
//! crate. It has no knowledge of storage or HTTP.
//!
//! # Key Types
//!
//! - [`Digest`] - 32-byte content digest rendered as lowercase hex, used as an ETag
//! - [`TraceParent`] - W3C trace-context identifier (`vv-trace-parent-ff`)
//! - [`TraceContext`] - per-request correlation context, passed explicitly

pub mod digest;
pub mod error;
pub mod trace;

pub use digest::Digest;
pub use error::TypeError;
pub use trace::{new_trace_id, TraceContext, TraceParent};
