use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, HeaderValue},
    response::Response,
};
use tracing::{field, info_span, Instrument};

use nightshift_core::RequestId;

use crate::app::services::AppServices;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `POST /api/generate-pdf`
///
/// The body is taken raw so malformed JSON reaches the pipeline and comes back
/// as a `ValidationError` instead of axum's own rejection.
pub async fn generate_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id_from(&headers);
    let span = info_span!("generate_pdf", request_id = %request_id, order_id = field::Empty);

    let mut response = services.pipeline.respond(request_id, &body).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Caller-supplied UUID if present and well-formed, otherwise a fresh one.
fn request_id_from(headers: &HeaderMap) -> RequestId {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_request_id_is_honoured() {
        let mut headers = HeaderMap::new();
        headers.insert(
            REQUEST_ID_HEADER,
            HeaderValue::from_static("0190f5c2-7b1a-7cc0-8000-000000000001"),
        );
        assert_eq!(
            request_id_from(&headers).to_string(),
            "0190f5c2-7b1a-7cc0-8000-000000000001"
        );
    }

    #[test]
    fn garbage_request_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert_ne!(request_id_from(&headers).to_string(), "not-a-uuid");
    }
}
