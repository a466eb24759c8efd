//! Markup-to-document rendering with guaranteed context release.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use nightshift_core::{PipelineError, PipelineResult};

use crate::options::PageOptions;
use crate::pool::ContextPool;

/// The only rendering contract the rest of the pipeline depends on.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, markup: &str, options: &PageOptions) -> PipelineResult<Vec<u8>>;
}

/// Pool-backed renderer.
///
/// Per render: acquire a context, load, wait (bounded) for quiescence, print.
/// The pooled guard releases the context on every exit path, including when
/// the caller drops the render future mid-flight.
#[derive(Debug, Clone)]
pub struct RenderEngine {
    pool: Arc<ContextPool>,
    quiescence_timeout: Duration,
}

impl RenderEngine {
    pub fn new(pool: Arc<ContextPool>, quiescence_timeout: Duration) -> Self {
        Self {
            pool,
            quiescence_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.pool
    }
}

#[async_trait]
impl DocumentRenderer for RenderEngine {
    async fn render(&self, markup: &str, options: &PageOptions) -> PipelineResult<Vec<u8>> {
        let mut context = self.pool.acquire().await?;

        context.load(markup, options).await?;

        match tokio::time::timeout(self.quiescence_timeout, context.wait_for_quiescence()).await {
            Ok(settled) => settled?,
            Err(_) => {
                return Err(PipelineError::render_timeout(format!(
                    "document did not settle within {}ms",
                    self.quiescence_timeout.as_millis()
                )));
            }
        }

        let document = context.print().await?;
        if document.is_empty() {
            return Err(PipelineError::render_environment(
                "renderer produced an empty document",
            ));
        }

        context.complete();
        debug!(bytes = document.len(), "document rendered");
        Ok(document)
    }
}
