//! Rendering backend seam.
//!
//! A [`RenderBackend`] launches isolated [`RenderContext`]s. Contexts are
//! heavyweight (a browser profile, a process, ...) and are owned by the
//! [`ContextPool`](crate::pool::ContextPool), never by callers directly.

use async_trait::async_trait;

use nightshift_core::PipelineResult;

use crate::options::PageOptions;

/// Factory for rendering contexts.
#[async_trait]
pub trait RenderBackend: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Create a fresh context. Failure is a `RenderEnvironment` error.
    async fn launch(&self) -> PipelineResult<Box<dyn RenderContext>>;
}

/// One isolated environment that turns markup into a fixed-layout document.
///
/// The engine drives a context through `load`, `wait_for_quiescence` and
/// `print`, in that order, once per render. Dropping a context must release
/// everything it holds, including any child process.
#[async_trait]
pub trait RenderContext: Send {
    /// Load resolved markup laid out with `options`.
    async fn load(&mut self, markup: &str, options: &PageOptions) -> PipelineResult<()>;

    /// Resolve once no layout-affecting loads are pending.
    ///
    /// The engine bounds this with a timeout and drops the future when it
    /// expires, so implementations must be cancel-safe.
    async fn wait_for_quiescence(&mut self) -> PipelineResult<()>;

    /// Serialize the loaded document.
    async fn print(&mut self) -> PipelineResult<Vec<u8>>;

    /// Whether the context may be reused after a clean render.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Clear per-render state before the context goes back to the pool.
    fn reset(&mut self) {}
}
