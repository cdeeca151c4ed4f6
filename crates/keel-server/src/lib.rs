//! HTTP channel API for Keel.
//!
//! Channels are kept in a [`keel_store::SnapshotStore`], versioned by content
//! ETags and guarded by conditional request headers. Every response carries
//! a W3C `traceparent` header.

pub mod conditional;
pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod router;
pub mod server;
pub mod trace;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use model::{Channel, ChannelMeta, ChannelSummary, FieldError, PublishPoint, VideoEncoder};
pub use server::KeelServer;
