//! `nightshift-core`: shared building blocks for the invoice document pipeline.
//!
//! This crate is **pure**: error taxonomy, request identity and the per-request
//! stage machine. No IO, no HTTP, no rendering.

pub mod error;
pub mod id;
pub mod stage;

pub use error::{PipelineError, PipelineResult};
pub use id::RequestId;
pub use stage::PipelineStage;
