//! Turns rendered bytes into the HTTP attachment response.

use axum::body::Body;
use axum::http::{self, header, HeaderValue, StatusCode};
use axum::response::Response;

use nightshift_core::{PipelineError, PipelineResult};
use nightshift_invoicing::money::format_amount;

use crate::pipeline::RenderedInvoice;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Invoice total as rendered on the document, for clients that skip parsing the PDF.
pub const INVOICE_TOTAL_HEADER: &str = "x-invoice-total";

/// ASCII fallback name: `invoice-<order id>.pdf`, with anything outside
/// `[A-Za-z0-9._-]` replaced by `_`.
pub fn attachment_filename(order_id: &str) -> String {
    let safe: String = order_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("invoice-{safe}.pdf")
}

/// `Content-Disposition` value carrying both the ASCII fallback and the exact
/// order id as an RFC 5987 `filename*` parameter.
pub fn content_disposition(order_id: &str) -> String {
    let exact = format!("invoice-{order_id}.pdf");
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        attachment_filename(order_id),
        urlencoding::encode(&exact)
    )
}

pub fn package(invoice: RenderedInvoice) -> PipelineResult<Response> {
    if invoice.document.is_empty() {
        return Err(PipelineError::packaging("refusing to send an empty document"));
    }

    let disposition = HeaderValue::from_str(&content_disposition(&invoice.order_id))
        .map_err(|e| PipelineError::packaging(format!("content disposition: {e}")))?;

    http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PDF_CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, invoice.document.len())
        .header(INVOICE_TOTAL_HEADER, format_amount(invoice.total_amount))
        .body(Body::from(invoice.document))
        .map_err(|e| PipelineError::packaging(e.to_string()))
}
