//! Invoice data normalization and template composition.
//!
//! This crate holds the deterministic front half of the document pipeline:
//! validating caller payloads, computing totals and resolving the invoice
//! template into markup. No network, no rendering.

pub mod compose;
pub mod money;
pub mod normalize;
pub mod request;
pub mod template;

pub use compose::{CompositionOptions, Compositor, MissingValuePolicy};
pub use normalize::{normalize, NormalizedInvoice, NormalizedLine};
pub use request::{InvoiceRequest, LineItem};
pub use template::{EMBEDDED_INVOICE_TEMPLATE, PLACEHOLDER_SET_VERSION, Placeholder, Template, TemplateStore};
