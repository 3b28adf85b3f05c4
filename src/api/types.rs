//! Shared state for the HTTP layer.

use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::pipeline::analysis::{HttpProviderFactory, ProviderFactory};

/// Shared context for all API routes.
///
/// Holds no per-run state: every request builds its own providers through
/// the factory, on the worker thread that runs the pipeline.
#[derive(Clone)]
pub struct ApiContext {
    pub factory: Arc<dyn ProviderFactory>,
}

impl ApiContext {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self { factory }
    }

    /// Context backed by the real HTTP providers.
    pub fn from_config(config: ProviderConfig) -> Self {
        Self::new(Arc::new(HttpProviderFactory::new(config)))
    }
}
