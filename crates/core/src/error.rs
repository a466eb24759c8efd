//! Pipeline error model.

use thiserror::Error;

/// Result type used across every pipeline stage.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure raised by any stage of the invoice document pipeline.
///
/// Each variant maps to exactly one wire-level error kind (see [`PipelineError::kind`]).
/// The first error raised halts the pipeline; stages never swallow one another's errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The inbound payload is malformed or a required field is missing.
    #[error("invalid field `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// The template asset could not be read, parsed or resolved.
    #[error("template composition failed: {0}")]
    Composition(String),

    /// No rendering context could be acquired, or the context misbehaved.
    #[error("rendering environment unavailable: {0}")]
    RenderEnvironment(String),

    /// The document did not become quiescent within the allowed time.
    #[error("render timed out: {0}")]
    RenderTimeout(String),

    /// The rendered document could not be packaged for transfer.
    #[error("packaging failed: {0}")]
    Packaging(String),
}

impl PipelineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    pub fn render_environment(msg: impl Into<String>) -> Self {
        Self::RenderEnvironment(msg.into())
    }

    pub fn render_timeout(msg: impl Into<String>) -> Self {
        Self::RenderTimeout(msg.into())
    }

    pub fn packaging(msg: impl Into<String>) -> Self {
        Self::Packaging(msg.into())
    }

    /// Stable error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "ValidationError",
            PipelineError::Composition(_) => "CompositionError",
            PipelineError::RenderEnvironment(_) => "RenderEnvironmentError",
            PipelineError::RenderTimeout(_) => "RenderTimeoutError",
            PipelineError::Packaging(_) => "PackagingError",
        }
    }

    /// Name of the offending input field, for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            PipelineError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_wire_names() {
        assert_eq!(PipelineError::validation("orderId", "is required").kind(), "ValidationError");
        assert_eq!(PipelineError::composition("x").kind(), "CompositionError");
        assert_eq!(PipelineError::render_environment("x").kind(), "RenderEnvironmentError");
        assert_eq!(PipelineError::render_timeout("x").kind(), "RenderTimeoutError");
        assert_eq!(PipelineError::packaging("x").kind(), "PackagingError");
    }

    #[test]
    fn validation_error_names_the_field() {
        let err = PipelineError::validation("items[1].quantity", "must not be negative");
        assert_eq!(err.field(), Some("items[1].quantity"));
        assert_eq!(
            err.to_string(),
            "invalid field `items[1].quantity`: must not be negative"
        );
        assert_eq!(PipelineError::packaging("x").field(), None);
    }
}
