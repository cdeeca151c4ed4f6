//! Channel resources and their validation rules.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use keel_types::Digest;
use serde::{Deserialize, Serialize};

/// Allowed regions for a channel.
pub const REGIONS: &[&str] = &["us-west", "us-east"];
/// Allowed publish formats.
pub const FORMATS: &[&str] = &["hls", "dash"];
/// Allowed DRM systems.
pub const DRMS: &[&str] = &["fairplay", "widevine", "playready"];
/// Allowed encoder frame rates.
pub const FRAMERATES: &[f64] = &[30.0, 25.0, 29.97, 50.0, 60.0];

const MAX_NAME_LEN: usize = 80;
const MAX_TAGS: usize = 10;
const MIN_BITRATE: u16 = 300;
const SEGMENT_DURATION: std::ops::RangeInclusive<u8> = 2..=60;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Where and how a channel is published.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishPoint {
    pub id: String,
    pub format: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drms: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Video encoder settings for one rendition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoder {
    pub id: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in kbps.
    pub bitrate: u16,
    pub framerate: f64,
}

/// A live video channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub on: bool,
    /// Segment duration in seconds.
    pub segment_duration: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub video_encoders: Vec<VideoEncoder>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publish_points: Vec<PublishPoint>,
}

/// Stored record: the channel plus its concurrency metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub id: String,
    pub etag: Digest,
    pub last_modified: DateTime<Utc>,
    pub channel: Channel,
}

/// Listing entry returned by `GET /channels`; the channel body is left out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: String,
    pub etag: Digest,
    pub last_modified: DateTime<Utc>,
}

impl From<&ChannelMeta> for ChannelSummary {
    fn from(meta: &ChannelMeta) -> Self {
        Self {
            id: meta.id.clone(),
            etag: meta.etag,
            last_modified: meta.last_modified,
        }
    }
}

/// A single validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `body.video_encoders[0].width`.
    pub location: String,
    pub message: String,
}

impl FieldError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Channel IDs are 2 to 60 characters of `[A-Za-z0-9_-]`.
pub fn validate_channel_id(id: &str) -> Option<FieldError> {
    let valid_len = (2..=60).contains(&id.len());
    let valid_chars = id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid_len && valid_chars {
        None
    } else {
        Some(FieldError::new(
            "path.id",
            "expected 2-60 characters of [a-zA-Z0-9_-]",
        ))
    }
}

fn one_of(location: String, value: &str, allowed: &[&str], errors: &mut Vec<FieldError>) {
    if !allowed.contains(&value) {
        errors.push(FieldError::new(
            location,
            format!("expected one of {}", allowed.join(", ")),
        ));
    }
}

fn is_absolute_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}

impl VideoEncoder {
    fn validate(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        if self.width % 2 != 0 {
            errors.push(FieldError::new(format!("{prefix}.width"), "expected a multiple of 2"));
        }
        if self.height % 2 != 0 {
            errors.push(FieldError::new(format!("{prefix}.height"), "expected a multiple of 2"));
        }
        if u64::from(self.width) * 9 != u64::from(self.height) * 16 {
            errors.push(FieldError::new(
                prefix.to_string(),
                "width and height must be in a 16:9 aspect ratio",
            ));
        }
        if self.bitrate < MIN_BITRATE {
            errors.push(FieldError::new(
                format!("{prefix}.bitrate"),
                format!("expected at least {MIN_BITRATE}"),
            ));
        }
        if !FRAMERATES.contains(&self.framerate) {
            errors.push(FieldError::new(
                format!("{prefix}.framerate"),
                "expected one of 30, 25, 29.97, 50, 60",
            ));
        }
    }
}

impl PublishPoint {
    fn validate(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        one_of(format!("{prefix}.format"), &self.format, FORMATS, errors);
        if !is_absolute_http_url(&self.url) {
            errors.push(FieldError::new(
                format!("{prefix}.url"),
                "expected an absolute http(s) URL",
            ));
        }
        for (i, drm) in self.drms.iter().enumerate() {
            one_of(format!("{prefix}.drms[{i}]"), drm, DRMS, errors);
        }
    }
}

impl Channel {
    /// Check every field constraint, returning all failures at once.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.name.chars().count() > MAX_NAME_LEN {
            errors.push(FieldError::new(
                "body.name",
                format!("expected at most {MAX_NAME_LEN} characters"),
            ));
        }
        one_of("body.region".into(), &self.region, REGIONS, &mut errors);
        if !SEGMENT_DURATION.contains(&self.segment_duration) {
            errors.push(FieldError::new(
                "body.segment_duration",
                "expected a value between 2 and 60",
            ));
        }
        if self.tags.len() > MAX_TAGS {
            errors.push(FieldError::new(
                "body.tags",
                format!("expected at most {MAX_TAGS} items"),
            ));
        }
        if self.video_encoders.is_empty() {
            errors.push(FieldError::new("body.video_encoders", "expected at least 1 item"));
        }
        for (i, encoder) in self.video_encoders.iter().enumerate() {
            encoder.validate(&format!("body.video_encoders[{i}]"), &mut errors);
        }
        for (i, point) in self.publish_points.iter().enumerate() {
            point.validate(&format!("body.publish_points[{i}]"), &mut errors);
        }

        errors
    }
}
