//! Long-lived service wiring: template store, compositor, context pool, renderer.

use std::sync::Arc;

use tracing::info;

use nightshift_core::PipelineResult;
use nightshift_invoicing::{Compositor, TemplateStore};
use nightshift_render::{ContextPool, PageOptions, PoolStatus, RenderBackend, RenderEngine};

use crate::config::ServiceConfig;
use crate::pipeline::InvoicePipeline;

#[derive(Debug)]
pub struct AppServices {
    pub pipeline: InvoicePipeline,
    pool: Arc<ContextPool>,
}

impl AppServices {
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Stop handing out rendering contexts and drop the idle ones.
    pub fn shutdown(&self) {
        self.pool.close();
        info!("rendering context pool closed");
    }
}

/// Wire everything from config; the backend is injected so tests can swap the browser out.
pub fn build_services(
    config: &ServiceConfig,
    backend: Arc<dyn RenderBackend>,
) -> PipelineResult<Arc<AppServices>> {
    let templates = match &config.template_path {
        Some(path) => TemplateStore::from_file(path, config.template_reload)?,
        None => TemplateStore::embedded()?,
    };

    let backend_name = backend.name();
    let pool = ContextPool::new(backend, config.pool.clone());
    let engine = RenderEngine::new(Arc::clone(&pool), config.quiescence_timeout);

    let pipeline = InvoicePipeline::new(
        templates,
        Compositor::new(config.composition_options()),
        Arc::new(engine),
        PageOptions::invoice(),
        config.request_deadline,
    );

    info!(
        backend = backend_name,
        max_contexts = config.pool.max_contexts,
        reuse_contexts = config.pool.reuse_contexts,
        "invoice pipeline ready"
    );

    Ok(Arc::new(AppServices { pipeline, pool }))
}
