use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use nightshift_core::PipelineError;

pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation { .. } => StatusCode::BAD_REQUEST,
        PipelineError::Composition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::RenderEnvironment(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::RenderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::Packaging(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn pipeline_error_to_response(err: &PipelineError) -> axum::response::Response {
    json_error(status_for(err), err.kind(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    details: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "details": details.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_its_status() {
        let cases = [
            (PipelineError::validation("items", "must be an array"), StatusCode::BAD_REQUEST),
            (PipelineError::composition("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (PipelineError::render_environment("x"), StatusCode::SERVICE_UNAVAILABLE),
            (PipelineError::render_timeout("x"), StatusCode::GATEWAY_TIMEOUT),
            (PipelineError::packaging("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err.kind());
        }
    }

    #[tokio::test]
    async fn body_carries_kind_and_details() {
        let response = pipeline_error_to_response(&PipelineError::validation("orderId", "is required"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "ValidationError");
        assert_eq!(body["details"], "invalid field `orderId`: is required");
    }
}
