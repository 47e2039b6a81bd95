//! Request logging middleware, grounded on the teacher's
//! `middleware/logging.rs`.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

pub async fn log_request_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let content_type = request
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string();

    tracing::info!(method = %method, uri = %uri, content_type = %content_type, "incoming request");

    next.run(request).await
}
