use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use keel_store::SnapshotConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8888;

/// Default snapshot file, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "channels.db";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Snapshot file for channel records. `None` keeps channels in memory only.
    pub snapshot_path: Option<PathBuf>,
    pub snapshot: SnapshotConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
