//! HTTP API: invoice-to-PDF service, routing, and response mapping.

pub mod app;
pub mod config;
pub mod pipeline;
