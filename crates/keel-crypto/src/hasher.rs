use keel_types::Digest;
use serde::Serialize;
use serde_json::Value;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"keel-etag-v1"`) that is prepended
/// to every hash computation, so digests computed for different purposes
/// never collide even when the hashed bytes are identical.
///
/// Structured values are hashed in canonical form: object keys are sorted and
/// the JSON is emitted compactly. Two values with equal field contents
/// therefore hash identically whatever order their maps were built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for entity tags.
    pub const ETAG: Self = Self {
        domain: "keel-etag-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value over its canonical JSON form.
    pub fn hash_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Digest, HasherError> {
        Ok(self.hash(&canonical_json(value)?))
    }

    /// Verify that a value produces the expected digest.
    pub fn verify<T: Serialize + ?Sized>(
        &self,
        value: &T,
        expected: &Digest,
    ) -> Result<bool, HasherError> {
        Ok(self.hash_value(value)? == *expected)
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Entity tag of a value: [`ContentHasher::ETAG`] over its canonical form.
///
/// Callers compare `etag(old)` with `etag(new)` to detect "no effective
/// change" and to evaluate `If-Match` preconditions.
pub fn etag<T: Serialize + ?Sized>(value: &T) -> Result<Digest, HasherError> {
    ContentHasher::ETAG.hash_value(value)
}

/// Serialize `value` to compact JSON with every object's keys sorted.
///
/// Sorting is done here rather than relying on `serde_json::Map` ordering,
/// which changes if any crate in the build enables `preserve_order`.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HasherError> {
    let value = serde_json::to_value(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(128);
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), HasherError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)
                    .map_err(|e| HasherError::Serialization(e.to_string()))?;
                out.push(b':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)
            .map_err(|e| HasherError::Serialization(e.to_string()))?,
    }
    Ok(())
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
