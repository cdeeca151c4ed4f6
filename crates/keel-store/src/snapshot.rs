//! Snapshot file codec.
//!
//! A snapshot is the complete mapping serialized as one framed blob:
//!
//! ```text
//! [4 bytes: magic b"KEEL"]
//! [1 byte:  format version]
//! [1 byte:  payload encoding (0 = JSON, 1 = bincode)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [8 bytes: payload length (little-endian u64)]
//! [N bytes: payload (serialized HashMap<String, V>)]
//! ```
//!
//! Files are replaced wholesale: the blob goes to a temporary file in the
//! same directory which is then renamed over the target.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// File signature.
pub const MAGIC: [u8; 4] = *b"KEEL";

/// Current container version.
pub const FORMAT_VERSION: u8 = 1;

/// Header size: magic + version + encoding + CRC + length.
pub const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 8;

/// Payload encoding of a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// Self-describing JSON. Works for any serde value type.
    #[default]
    Json,
    /// Compact bincode. Only for value types that serialize every field
    /// unconditionally (no `skip_serializing_if`, no untagged enums). [`save`]
    /// refuses to write a bincode payload that does not decode again.
    Bincode,
}

impl SnapshotFormat {
    fn tag(self) -> u8 {
        match self {
            Self::Json => 0,
            Self::Bincode => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Json),
            1 => Some(Self::Bincode),
            _ => None,
        }
    }
}

/// Flush/sync strategy for snapshot writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` the new snapshot before it replaces the old one.
    EveryWrite,
    /// Rely on OS page-cache buffering.
    #[default]
    OsDefault,
}

/// Configuration for a file-backed store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub format: SnapshotFormat,
    #[serde(default)]
    pub sync_mode: SyncMode,
}

/// Serialize `entries` into a framed snapshot blob.
pub fn encode<V: Serialize>(
    entries: &HashMap<String, V>,
    format: SnapshotFormat,
) -> StoreResult<Vec<u8>> {
    let payload = match format {
        SnapshotFormat::Json => {
            serde_json::to_vec(entries).map_err(|e| StoreError::Serialization(e.to_string()))?
        }
        SnapshotFormat::Bincode => {
            bincode::serialize(entries).map_err(|e| StoreError::Serialization(e.to_string()))?
        }
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.push(format.tag());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a framed snapshot blob.
///
/// Returns the mapping together with the encoding it was written in. The
/// error is a human-readable reason; callers attach the file path.
pub fn decode<V: DeserializeOwned>(
    bytes: &[u8],
) -> Result<(HashMap<String, V>, SnapshotFormat), String> {
    if bytes.len() < HEADER_SIZE {
        return Err(format!(
            "truncated header: {} bytes, need {HEADER_SIZE}",
            bytes.len()
        ));
    }
    if bytes[0..4] != MAGIC {
        return Err("bad magic".to_string());
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", bytes[4]));
    }
    let format = SnapshotFormat::from_tag(bytes[5])
        .ok_or_else(|| format!("unknown payload encoding {}", bytes[5]))?;
    let expected_crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let mut len_buf = [0u8; 8];
    len_buf.copy_from_slice(&bytes[10..HEADER_SIZE]);
    let length = u64::from_le_bytes(len_buf);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() as u64 != length {
        return Err(format!(
            "payload length mismatch: header says {length}, found {}",
            payload.len()
        ));
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(format!(
            "CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
        ));
    }

    let entries = match format {
        SnapshotFormat::Json => serde_json::from_slice(payload).map_err(|e| e.to_string())?,
        SnapshotFormat::Bincode => bincode::deserialize(payload).map_err(|e| e.to_string())?,
    };
    Ok((entries, format))
}

/// Read and decode the snapshot at `path`.
///
/// Returns `Ok(None)` if the file does not exist. Any other failure,
/// including a damaged file, is an error.
pub fn load<V: DeserializeOwned>(path: &Path) -> StoreResult<Option<HashMap<String, V>>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let (entries, format) = decode(&bytes).map_err(|reason| StoreError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    })?;
    debug!(path = %path.display(), entries = entries.len(), ?format, "snapshot loaded");
    Ok(Some(entries))
}

/// Encode `entries` and replace the file at `path` with the result.
///
/// Bincode payloads are decoded back before anything touches the disk, so a
/// value type bincode cannot represent fails here with
/// [`StoreError::Serialization`] instead of leaving an unreadable snapshot.
pub fn save<V: Serialize + DeserializeOwned>(
    path: &Path,
    entries: &HashMap<String, V>,
    config: &SnapshotConfig,
) -> StoreResult<()> {
    let blob = encode(entries, config.format)?;
    if config.format == SnapshotFormat::Bincode {
        bincode::deserialize::<HashMap<String, V>>(&blob[HEADER_SIZE..]).map_err(|e| {
            StoreError::Serialization(format!("bincode payload does not decode: {e}"))
        })?;
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&blob)?;
    tmp.flush()?;
    if matches!(config.sync_mode, SyncMode::EveryWrite) {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    debug!(path = %path.display(), entries = entries.len(), bytes = blob.len(), "snapshot written");
    Ok(())
}
