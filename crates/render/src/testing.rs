//! In-memory backend used by this crate's tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use nightshift_core::{PipelineError, PipelineResult};

use crate::context::{RenderBackend, RenderContext};
use crate::options::PageOptions;

/// Backend whose contexts "print" the markup they were given.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    pub live: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub fail_launch: bool,
    pub unhealthy: bool,
    pub settle_after: Duration,
    pub empty_output: bool,
}

#[async_trait]
impl RenderBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self) -> PipelineResult<Box<dyn RenderContext>> {
        if self.fail_launch {
            return Err(PipelineError::render_environment("fake backend refused to launch"));
        }
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            live: Arc::clone(&self.live),
            markup: None,
            healthy: !self.unhealthy,
            settle_after: self.settle_after,
            empty_output: self.empty_output,
        }))
    }
}

pub(crate) struct FakeContext {
    live: Arc<AtomicUsize>,
    markup: Option<String>,
    healthy: bool,
    settle_after: Duration,
    empty_output: bool,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn load(&mut self, markup: &str, _options: &PageOptions) -> PipelineResult<()> {
        self.markup = Some(markup.to_string());
        Ok(())
    }

    async fn wait_for_quiescence(&mut self) -> PipelineResult<()> {
        tokio::time::sleep(self.settle_after).await;
        Ok(())
    }

    async fn print(&mut self) -> PipelineResult<Vec<u8>> {
        if self.empty_output {
            return Ok(Vec::new());
        }
        let markup = self
            .markup
            .as_deref()
            .ok_or_else(|| PipelineError::render_environment("nothing loaded"))?;
        Ok(format!("%PDF-fake\n{markup}").into_bytes())
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn reset(&mut self) {
        self.markup = None;
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
