//! One request, start to finish: parse, normalize, compose, render, package.
//!
//! Every request moves through [`PipelineStage`] in order and ends in
//! `Released` whether it succeeded, failed, or was cut short by the deadline.
//! Failures are logged once, with the stage they happened in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::Response;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use nightshift_core::{PipelineError, PipelineResult, PipelineStage, RequestId};
use nightshift_invoicing::{normalize, Compositor, TemplateStore};
use nightshift_render::{DocumentRenderer, PageOptions};

use crate::app::{errors, packager};

/// A rendered invoice waiting to be packaged.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedInvoice {
    pub order_id: String,
    pub total_amount: Decimal,
    pub line_count: usize,
    pub document: Vec<u8>,
}

pub struct InvoicePipeline {
    templates: TemplateStore,
    compositor: Compositor,
    renderer: Arc<dyn DocumentRenderer>,
    page: PageOptions,
    deadline: Duration,
}

impl core::fmt::Debug for InvoicePipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InvoicePipeline")
            .field("template", &self.templates.name())
            .field("compositor", &self.compositor)
            .field("page", &self.page)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl InvoicePipeline {
    pub fn new(
        templates: TemplateStore,
        compositor: Compositor,
        renderer: Arc<dyn DocumentRenderer>,
        page: PageOptions,
        deadline: Duration,
    ) -> Self {
        Self {
            templates,
            compositor,
            renderer,
            page,
            deadline,
        }
    }

    /// Run the full pipeline for a raw request body.
    ///
    /// Always produces a response: the PDF attachment on success, otherwise a
    /// JSON error body whose status reflects the failure kind.
    pub async fn respond(&self, request_id: RequestId, body: &[u8]) -> Response {
        let mut tracker = StageTracker::new(request_id);

        let outcome = match tokio::time::timeout(self.deadline, self.run(&mut tracker, body)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::render_timeout(format!(
                "request did not complete within {}ms",
                self.deadline.as_millis()
            ))),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                tracker.fail(&err);
                errors::pipeline_error_to_response(&err)
            }
        };

        tracker.release();
        response
    }

    async fn run(&self, tracker: &mut StageTracker, body: &[u8]) -> PipelineResult<Response> {
        let rendered = self.render(tracker, body).await?;
        let response = packager::package(rendered)?;
        tracker.advance(PipelineStage::Packaged);
        Ok(response)
    }

    async fn render(&self, tracker: &mut StageTracker, body: &[u8]) -> PipelineResult<RenderedInvoice> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| PipelineError::validation("payload", format!("malformed JSON: {e}")))?;

        let invoice = normalize(&payload)?;
        tracker.set_order_id(invoice.order_id());
        tracker.advance(PipelineStage::Normalized);

        let template = self.templates.load()?;
        let markup = self.compositor.compose(&template, &invoice)?;
        tracker.advance(PipelineStage::Composed);

        tracker.advance(PipelineStage::Rendering);
        let document = self.renderer.render(&markup, &self.page).await?;
        tracker.advance(PipelineStage::Rendered);

        Ok(RenderedInvoice {
            order_id: invoice.order_id().to_string(),
            total_amount: invoice.total_amount,
            line_count: invoice.lines.len(),
            document,
        })
    }
}

/// Per-request stage bookkeeping.
///
/// Dropping a tracker that never reached `Released` means the request future
/// itself was dropped (client went away); that is logged as a cancellation.
struct StageTracker {
    request_id: RequestId,
    order_id: Option<String>,
    stage: PipelineStage,
    started: Instant,
}

impl StageTracker {
    fn new(request_id: RequestId) -> Self {
        debug!(request_id = %request_id, stage = %PipelineStage::Received, "pipeline stage");
        Self {
            request_id,
            order_id: None,
            stage: PipelineStage::Received,
            started: Instant::now(),
        }
    }

    fn set_order_id(&mut self, order_id: &str) {
        tracing::Span::current().record("order_id", order_id);
        self.order_id = Some(order_id.to_string());
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "illegal pipeline transition {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
        debug!(
            request_id = %self.request_id,
            order_id = self.order_id.as_deref().unwrap_or(""),
            stage = %next,
            "pipeline stage"
        );
    }

    fn fail(&mut self, err: &PipelineError) {
        error!(
            request_id = %self.request_id,
            order_id = self.order_id.as_deref().unwrap_or(""),
            stage = %self.stage,
            error_kind = err.kind(),
            error = %err,
            "invoice pipeline failed"
        );
        self.advance(PipelineStage::Failed);
    }

    fn release(mut self) {
        let outcome = self.stage;
        self.advance(PipelineStage::Released);
        info!(
            request_id = %self.request_id,
            order_id = self.order_id.as_deref().unwrap_or(""),
            outcome = %outcome,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "invoice request finished"
        );
    }
}

impl Drop for StageTracker {
    fn drop(&mut self) {
        if self.stage != PipelineStage::Released {
            warn!(
                request_id = %self.request_id,
                order_id = self.order_id.as_deref().unwrap_or(""),
                stage = %self.stage,
                "invoice request cancelled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{header, StatusCode};
    use nightshift_invoicing::{CompositionOptions, MissingValuePolicy};
    use serde_json::json;

    /// Renderer that hands back the markup it was given.
    struct EchoRenderer;

    #[async_trait]
    impl DocumentRenderer for EchoRenderer {
        async fn render(&self, markup: &str, _options: &PageOptions) -> PipelineResult<Vec<u8>> {
            Ok(format!("%PDF-echo\n{markup}").into_bytes())
        }
    }

    struct StallingRenderer;

    #[async_trait]
    impl DocumentRenderer for StallingRenderer {
        async fn render(&self, _markup: &str, _options: &PageOptions) -> PipelineResult<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(b"%PDF-late".to_vec())
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl DocumentRenderer for BrokenRenderer {
        async fn render(&self, _markup: &str, _options: &PageOptions) -> PipelineResult<Vec<u8>> {
            Err(PipelineError::render_environment("browser unavailable"))
        }
    }

    fn pipeline_with(renderer: Arc<dyn DocumentRenderer>, deadline: Duration) -> InvoicePipeline {
        InvoicePipeline::new(
            TemplateStore::embedded().unwrap(),
            Compositor::new(CompositionOptions::default()),
            renderer,
            PageOptions::invoice(),
            deadline,
        )
    }

    fn pipeline() -> InvoicePipeline {
        pipeline_with(Arc::new(EchoRenderer), Duration::from_secs(5))
    }

    fn widget_order() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "organizationName": "Acme",
            "customerId": "C-1",
            "customerName": "Jane",
            "employeeId": "E-1",
            "employeeName": "Ravi",
            "orderId": "ORD-1001",
            "orderDate": "2024-03-01",
            "deadline": "2024-03-15",
            "items": [{"itemId": "A1", "itemName": "Widget", "quantity": 3, "costPerUnit": 50}]
        }))
        .unwrap()
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn error_of(response: Response) -> Value {
        serde_json::from_slice(&body_of(response).await).unwrap()
    }

    #[tokio::test]
    async fn valid_order_becomes_pdf_attachment() {
        let response = pipeline().respond(RequestId::new(), &widget_order()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"invoice-ORD-1001.pdf\""
        );

        let body = String::from_utf8(body_of(response).await).unwrap();
        assert!(body.starts_with("%PDF-"));
        assert!(body.contains("₹150"));
        assert_eq!(body.matches("class=\"item-row\"").count(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let response = pipeline().respond(RequestId::new(), b"{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err = error_of(response).await;
        assert_eq!(err["error"], "ValidationError");
        assert!(err["details"].as_str().unwrap().contains("payload"));
    }

    #[tokio::test]
    async fn missing_field_is_named_in_details() {
        let mut payload: Value = serde_json::from_slice(&widget_order()).unwrap();
        payload.as_object_mut().unwrap().remove("orderId");
        let body = serde_json::to_vec(&payload).unwrap();
        let response = pipeline().respond(RequestId::new(), &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err = error_of(response).await;
        assert!(err["details"].as_str().unwrap().contains("orderId"));
    }

    #[tokio::test]
    async fn strict_placeholders_turn_blank_fields_into_composition_errors() {
        let pipeline = InvoicePipeline::new(
            TemplateStore::embedded().unwrap(),
            Compositor::new(CompositionOptions {
                missing_values: MissingValuePolicy::Fail,
                ..CompositionOptions::default()
            }),
            Arc::new(EchoRenderer),
            PageOptions::invoice(),
            Duration::from_secs(5),
        );
        let mut payload: Value = serde_json::from_slice(&widget_order()).unwrap();
        payload["customerName"] = json!("");
        let body = serde_json::to_vec(&payload).unwrap();

        let response = pipeline.respond(RequestId::new(), &body).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_of(response).await["error"], "CompositionError");
    }

    #[tokio::test]
    async fn renderer_failure_maps_to_service_unavailable() {
        let pipeline = pipeline_with(Arc::new(BrokenRenderer), Duration::from_secs(5));
        let response = pipeline.respond(RequestId::new(), &widget_order()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_of(response).await["error"], "RenderEnvironmentError");
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_render_timeout() {
        let pipeline = pipeline_with(Arc::new(StallingRenderer), Duration::from_millis(30));
        let response = pipeline.respond(RequestId::new(), &widget_order()).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error_of(response).await["error"], "RenderTimeoutError");
    }

    #[test]
    fn tracker_walks_the_success_path() {
        let mut tracker = StageTracker::new(RequestId::new());
        for stage in [
            PipelineStage::Normalized,
            PipelineStage::Composed,
            PipelineStage::Rendering,
            PipelineStage::Rendered,
            PipelineStage::Packaged,
        ] {
            tracker.advance(stage);
        }
        assert_eq!(tracker.stage, PipelineStage::Packaged);
        tracker.release();
    }

    #[test]
    fn tracker_fails_from_any_working_stage() {
        let mut tracker = StageTracker::new(RequestId::new());
        tracker.advance(PipelineStage::Normalized);
        tracker.fail(&PipelineError::composition("boom"));
        assert_eq!(tracker.stage, PipelineStage::Failed);
        tracker.release();
    }
}
