use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{ETAG, LAST_MODIFIED};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{SubsecRound, Utc};
use keel_store::KeyValueStore;
use keel_types::TraceContext;
use serde_json::json;
use tracing::{debug, info};

use crate::conditional::{http_date, Preconditions};
use crate::error::{ServerError, ServerResult};
use crate::model::{validate_channel_id, Channel, ChannelMeta, ChannelSummary, FieldError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub channels: Arc<dyn KeyValueStore<ChannelMeta>>,
}

impl AppState {
    pub fn new(channels: Arc<dyn KeyValueStore<ChannelMeta>>) -> Self {
        Self { channels }
    }
}

fn check_id(id: &str) -> ServerResult<()> {
    match validate_channel_id(id) {
        Some(err) => Err(ServerError::Validation(vec![err])),
        None => Ok(()),
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// All channels, most recently modified first.
pub async fn list_channels(State(state): State<AppState>) -> Json<Vec<ChannelSummary>> {
    let mut summaries = Vec::new();
    state.channels.range(&mut |_, meta| {
        summaries.push(ChannelSummary::from(meta));
        true
    });
    summaries.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.id.cmp(&b.id))
    });
    Json(summaries)
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Response> {
    check_id(&id)?;
    let meta = state
        .channels
        .load(&id)
        .ok_or_else(|| ServerError::NotFound(format!("channel {id}")))?;
    Ok((
        [
            (ETAG, meta.etag.to_etag()),
            (LAST_MODIFIED, http_date(&meta.last_modified)),
        ],
        Json(meta.channel),
    )
        .into_response())
}

/// Create or replace a channel.
///
/// Conditional headers are evaluated against the stored record. A body
/// identical to the stored one is answered with `304 Not Modified` and
/// leaves `last_modified` untouched.
pub async fn put_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Channel>, JsonRejection>,
) -> ServerResult<Response> {
    let mut errors: Vec<FieldError> = validate_channel_id(&id).into_iter().collect();
    let channel = match body {
        Ok(Json(channel)) => {
            errors.extend(channel.validate());
            Some(channel)
        }
        Err(rejection) => {
            errors.push(FieldError::new("body", rejection.body_text()));
            None
        }
    };
    let channel = match channel {
        Some(channel) if errors.is_empty() => channel,
        _ => return Err(ServerError::Validation(errors)),
    };

    let existing = state.channels.load(&id);
    let preconditions = Preconditions::from_headers(&headers);
    if !preconditions.is_empty() {
        preconditions.check(
            existing.as_ref().map(|m| &m.etag),
            existing.as_ref().map(|m| &m.last_modified),
        )?;
    }

    let etag = keel_crypto::etag(&channel)?;
    if existing.as_ref().is_some_and(|m| m.etag == etag) {
        debug!(trace_id = %ctx.trace_id(), channel = %id, "channel unchanged");
        return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag.to_etag())]).into_response());
    }

    let meta = ChannelMeta {
        id: id.clone(),
        etag,
        // HTTP dates carry whole seconds; keep stored times comparable with them.
        last_modified: Utc::now().trunc_subsecs(0),
        channel,
    };
    let channels = Arc::clone(&state.channels);
    let key = id.clone();
    tokio::task::spawn_blocking(move || channels.store(key, meta))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    info!(trace_id = %ctx.trace_id(), channel = %id, etag = %etag.short_hex(), "channel stored");
    Ok((StatusCode::NO_CONTENT, [(ETAG, etag.to_etag())]).into_response())
}

/// Remove a channel. Deleting a missing channel also succeeds.
pub async fn delete_channel(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    Path(id): Path<String>,
) -> ServerResult<StatusCode> {
    check_id(&id)?;
    let channels = Arc::clone(&state.channels);
    let key = id.clone();
    let removed = tokio::task::spawn_blocking(move || channels.delete(&key))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
    if removed {
        info!(trace_id = %ctx.trace_id(), channel = %id, "channel deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}
