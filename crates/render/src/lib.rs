//! Rendering of resolved markup into fixed-layout PDF documents.
//!
//! - `options`: page size, margins, background printing
//! - `context`: the backend/context seam a concrete browser plugs into
//! - `pool`: bounded, injectable pool of rendering contexts
//! - `engine`: the `DocumentRenderer` contract and its pool-backed implementation
//! - `chromium`: headless Chromium backend

pub mod chromium;
pub mod context;
pub mod engine;
pub mod options;
pub mod pool;

#[cfg(test)]
mod testing;

pub use chromium::{ChromiumBackend, ChromiumConfig};
pub use context::{RenderBackend, RenderContext};
pub use engine::{DocumentRenderer, RenderEngine};
pub use options::{Margins, PageOptions, PaperFormat};
pub use pool::{ContextPool, PoolConfig, PoolStatus, PooledContext};
