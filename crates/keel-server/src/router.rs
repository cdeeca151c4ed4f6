use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::{middleware, Router};
use keel_types::TraceContext;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{info_span, Level};

use crate::handler::{self, AppState};
use crate::trace::propagate_trace;

fn request_span(req: &Request<Body>) -> tracing::Span {
    let trace_id = req
        .extensions()
        .get::<TraceContext>()
        .map(TraceContext::trace_id)
        .unwrap_or_default();
    info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        trace_id = %trace_id,
    )
}

/// Build the axum router with all channel endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/channels", get(handler::list_channels))
        .route(
            "/channels/:id",
            get(handler::get_channel)
                .put(handler::put_channel)
                .delete(handler::delete_channel),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        // Outermost, so the trace context exists before the span is made.
        .layer(middleware::from_fn(propagate_trace))
}
