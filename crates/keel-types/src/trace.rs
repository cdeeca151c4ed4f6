//! W3C trace-context identifiers.
//!
//! A [`TraceParent`] renders as the four-segment `traceparent` header value:
//!
//! ```text
//! 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00
//! ^  ^                                ^                ^
//! |  trace-id (16 bytes)              parent-id (8)    flags
//! version
//! ```

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// The only trace-context version this crate emits.
pub const TRACE_VERSION: u8 = 0x00;

/// Version value reserved as invalid by the trace-context format.
const INVALID_VERSION: u8 = 0xff;

/// Length of the rendered form: 2 + 1 + 32 + 1 + 16 + 1 + 2.
pub const TRACEPARENT_LEN: usize = 55;

/// A W3C `traceparent` value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceParent {
    version: u8,
    trace_id: [u8; 16],
    parent_id: [u8; 8],
    flags: u8,
}

impl TraceParent {
    /// Generate a fresh identifier with random trace and parent IDs.
    ///
    /// Uses the thread-local CSPRNG. All-zero IDs are invalid on the wire and
    /// are redrawn.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut trace_id = [0u8; 16];
        let mut parent_id = [0u8; 8];
        while trace_id == [0u8; 16] {
            rng.fill(&mut trace_id);
        }
        while parent_id == [0u8; 8] {
            rng.fill(&mut parent_id);
        }
        Self {
            version: TRACE_VERSION,
            trace_id,
            parent_id,
            flags: 0,
        }
    }

    /// A new span within the same trace: keeps trace ID and flags, draws a
    /// new parent ID.
    pub fn child(&self) -> Self {
        let mut next = Self::generate();
        next.trace_id = self.trace_id;
        next.flags = self.flags;
        next
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn trace_id(&self) -> &[u8; 16] {
        &self.trace_id
    }

    pub fn parent_id(&self) -> &[u8; 8] {
        &self.parent_id
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// The 32-character trace ID segment.
    pub fn trace_id_hex(&self) -> String {
        hex::encode(self.trace_id)
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            self.version,
            hex::encode(self.trace_id),
            hex::encode(self.parent_id),
            self.flags
        )
    }
}

impl fmt::Debug for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceParent({self})")
    }
}

fn decode_segment<const N: usize>(segment: &str, what: &str) -> Result<[u8; N], TypeError> {
    if segment.len() != N * 2 || !segment.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(TypeError::InvalidTraceParent(format!(
            "{what} must be {} lowercase hex characters",
            N * 2
        )));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(segment, &mut out).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    Ok(out)
}

impl FromStr for TraceParent {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        let [version, trace_id, parent_id, flags] = parts.as_slice() else {
            return Err(TypeError::InvalidTraceParent(format!(
                "expected 4 segments, got {}",
                parts.len()
            )));
        };

        let [version] = decode_segment::<1>(version, "version")?;
        if version == INVALID_VERSION {
            return Err(TypeError::InvalidTraceParent("version ff is reserved".into()));
        }
        let trace_id = decode_segment::<16>(trace_id, "trace-id")?;
        if trace_id == [0u8; 16] {
            return Err(TypeError::InvalidTraceParent("all-zero trace-id".into()));
        }
        let parent_id = decode_segment::<8>(parent_id, "parent-id")?;
        if parent_id == [0u8; 8] {
            return Err(TypeError::InvalidTraceParent("all-zero parent-id".into()));
        }
        let [flags] = decode_segment::<1>(flags, "flags")?;

        Ok(Self {
            version,
            trace_id,
            parent_id,
            flags,
        })
    }
}

impl Serialize for TraceParent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceParent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Generate a new random trace identifier in `traceparent` format.
pub fn new_trace_id() -> String {
    TraceParent::generate().to_string()
}

/// Correlation context for a single request or operation.
///
/// Carried explicitly through the call chain (for HTTP, as a request
/// extension handed to each handler) rather than looked up from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub traceparent: TraceParent,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new() -> Self {
        Self {
            traceparent: TraceParent::generate(),
        }
    }

    /// Continue the caller's trace if it sent a valid `traceparent`,
    /// otherwise start a new one.
    pub fn from_incoming(header: Option<&str>) -> Self {
        match header.map(str::parse::<TraceParent>) {
            Some(Ok(parent)) => Self {
                traceparent: parent.child(),
            },
            _ => Self::new(),
        }
    }

    /// The 32-character trace ID, suitable as a log field.
    pub fn trace_id(&self) -> String {
        self.traceparent.trace_id_hex()
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
