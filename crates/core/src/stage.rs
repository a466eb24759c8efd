//! Per-request pipeline state machine.
//!
//! ```text
//! Received -> Normalized -> Composed -> Rendering -> Rendered -> Packaged
//!     \____________\____________\___________\___________\-----> Failed
//! Packaged | Failed -> Released
//! ```

use serde::Serialize;

/// Stage a single pipeline instance is in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Normalized,
    Composed,
    Rendering,
    Rendered,
    Packaged,
    Failed,
    Released,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Normalized => "normalized",
            PipelineStage::Composed => "composed",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Rendered => "rendered",
            PipelineStage::Packaged => "packaged",
            PipelineStage::Failed => "failed",
            PipelineStage::Released => "released",
        }
    }

    /// `Packaged` and `Failed` end the request; only `Released` may follow them.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Packaged | PipelineStage::Failed)
    }

    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;

        match (self, next) {
            (Received, Normalized)
            | (Normalized, Composed)
            | (Composed, Rendering)
            | (Rendering, Rendered)
            | (Rendered, Packaged) => true,
            (Packaged | Failed, Released) => true,
            (Released, _) => false,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl core::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
