//! `traceparent` propagation.
//!
//! Every request gets a [`TraceContext`]: a child of the caller's
//! `traceparent` when one is sent and valid, otherwise a fresh root. The
//! context travels to handlers as a request extension and is echoed back
//! in the `traceparent` response header.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use keel_types::TraceContext;
use tracing::warn;

pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");

/// Attach a trace context to the request and the response.
pub async fn propagate_trace(mut req: Request, next: Next) -> Response {
    let incoming = req
        .headers()
        .get(TRACEPARENT)
        .and_then(|v| v.to_str().ok());
    let ctx = TraceContext::from_incoming(incoming);
    let header = ctx.traceparent.to_string();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    match HeaderValue::from_str(&header) {
        Ok(value) => {
            response.headers_mut().insert(TRACEPARENT, value);
        }
        Err(e) => warn!(error = %e, "unrepresentable traceparent"),
    }
    response
}
