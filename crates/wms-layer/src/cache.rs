//! Per-layer capability memoization.
//!
//! One fetch per layer instance: concurrent callers share the in-flight
//! request, resolved values are returned immediately, and failures are not
//! retained so a later call retries. Invalidated only by dropping the
//! owning layer.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;
use wms_capabilities::{get_capabilities_url, CapabilitiesParser, CapabilityModel, RemoteFetch};
use wms_common::LayerResult;

use crate::descriptor::LayerDescriptor;

#[derive(Default)]
pub struct CapabilityCache {
    cell: OnceCell<Arc<CapabilityModel>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the capability model, fetching and parsing at most once.
    pub async fn get_or_fetch(
        &self,
        descriptor: &LayerDescriptor,
        projection: &str,
        fetch: &dyn RemoteFetch,
        parser: &dyn CapabilitiesParser,
    ) -> LayerResult<Arc<CapabilityModel>> {
        if let Some(model) = self.cell.get() {
            debug!(url = %descriptor.url, "capability cache hit");
            return Ok(model.clone());
        }

        self.cell
            .get_or_try_init(|| async {
                let url = get_capabilities_url(&descriptor.url, &descriptor.version);
                let body = fetch.fetch(&url).await?;
                let model = parser.parse(&body, &descriptor.url, projection, &descriptor.version)?;
                Ok(Arc::new(model))
            })
            .await
            .cloned()
    }

    /// Seed the cache with an already-resolved model, e.g. to share a
    /// parent's capabilities with an expanded child.
    pub fn seed(&self, model: Arc<CapabilityModel>) {
        // Ignored when already resolved; the first value wins.
        let _ = self.cell.set(model);
    }

    /// The resolved model, if any.
    pub fn cached(&self) -> Option<Arc<CapabilityModel>> {
        self.cell.get().cloned()
    }
}
