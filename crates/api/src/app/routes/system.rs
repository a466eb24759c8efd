use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Context pool occupancy and lifetime counters.
pub async fn render_health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.pool_status())
}
