use axum::{
    routing::{get, post},
    Router,
};

pub mod invoices;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/api/generate-pdf", post(invoices::generate_pdf))
        .route("/health/render", get(system::render_health))
}
