use std::sync::Arc;

use keel_store::{SnapshotFormat, SnapshotStore};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::model::ChannelMeta;
use crate::router::build_router;

/// Channel API server.
pub struct KeelServer {
    config: ServerConfig,
    channels: Arc<SnapshotStore<ChannelMeta>>,
}

impl KeelServer {
    /// Open the channel snapshot named by `config` and prepare the server.
    ///
    /// Fails if the snapshot exists but cannot be decoded. Channel records
    /// omit empty fields, so only the JSON snapshot encoding is accepted.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        if config.snapshot.format != SnapshotFormat::Json {
            return Err(ServerError::Config(format!(
                "channel snapshots must use the json format, not {:?}",
                config.snapshot.format
            )));
        }
        let channels =
            SnapshotStore::open_optional(config.snapshot_path.as_deref(), config.snapshot)?;
        info!(
            path = ?config.snapshot_path,
            channels = channels.len(),
            "channel store opened"
        );
        Ok(Self {
            config,
            channels: Arc::new(channels),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn channels(&self) -> &SnapshotStore<ChannelMeta> {
        &self.channels
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(self.channels.clone()))
    }

    /// Start serving requests until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "keel server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
