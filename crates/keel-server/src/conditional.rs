//! Conditional request preconditions (`If-Match` and friends) for writes.

use axum::http::header::{IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use keel_types::Digest;

use crate::error::{ServerError, ServerResult};

/// Render a timestamp as an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(t: &DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Strip the weak prefix and quotes from one entity tag.
fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}

/// Whether a comma-separated entity-tag list names `current`.
///
/// `*` matches any existing resource.
fn tag_list_matches(list: &str, current: Option<&Digest>) -> bool {
    let Some(current) = current else {
        return false;
    };
    let hex = current.to_hex();
    list.split(',').map(normalize_tag).any(|t| t == "*" || t == hex)
}

/// Conditional headers sent with a write request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Preconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl Preconditions {
    /// Extract conditional headers. Unparseable dates are ignored, as the
    /// HTTP semantics require.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            if_match: text(IF_MATCH),
            if_none_match: text(IF_NONE_MATCH),
            if_modified_since: text(IF_MODIFIED_SINCE).and_then(|v| parse_http_date(&v)),
            if_unmodified_since: text(IF_UNMODIFIED_SINCE).and_then(|v| parse_http_date(&v)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Evaluate against the current state of the resource.
    ///
    /// `etag`/`modified` are `None` when the resource does not exist yet.
    /// Any failed condition yields [`ServerError::PreconditionFailed`].
    pub fn check(&self, etag: Option<&Digest>, modified: Option<&DateTime<Utc>>) -> ServerResult<()> {
        if let Some(list) = &self.if_match {
            if !tag_list_matches(list, etag) {
                return Err(ServerError::PreconditionFailed(format!(
                    "If-Match: {list} does not match current ETag"
                )));
            }
        }
        if let Some(list) = &self.if_none_match {
            if tag_list_matches(list, etag) {
                return Err(ServerError::PreconditionFailed(format!(
                    "If-None-Match: {list} matches current ETag"
                )));
            }
        }
        if let Some(since) = &self.if_modified_since {
            if modified.map_or(true, |m| m <= since) {
                return Err(ServerError::PreconditionFailed(format!(
                    "resource not modified since {}",
                    http_date(since)
                )));
            }
        }
        if let Some(since) = &self.if_unmodified_since {
            if modified.is_some_and(|m| m > since) {
                return Err(ServerError::PreconditionFailed(format!(
                    "resource modified since {}",
                    http_date(since)
                )));
            }
        }
        Ok(())
    }
}
