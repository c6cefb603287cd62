//! Reject oversized uploads before any of the body is read.
//!
//! Only the declared `content-length` is consulted; requests without the
//! header pass through, and the extractor's archive-bomb bound catches
//! anything that lied about its size.

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use lib_common::UPLOAD_LIMIT;

pub async fn upload_size_guard(request: Request, next: Next) -> Response {
    if request.method() == Method::POST && request.uri().path().starts_with("/compile/wasm") {
        let declared = request
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(len) = declared {
            if len > UPLOAD_LIMIT {
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!(
                        "File size exceeds {UPLOAD_LIMIT} byte limit, for large assets please put them in data/ directory to avoid uploading them to the server."
                    ),
                )
                    .into_response();
            }
        }
    }
    next.run(request).await
}
