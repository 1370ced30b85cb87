//! Extent resolution fallback chain.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use wms_common::{BoundingBox, LayerError, LayerResult};

use crate::layer::WmsLayer;
use crate::map::{EnvelopeCalculator, HostMap};

/// Resolve the effective extent for a layer.
///
/// Priority: an explicit map extent wins immediately; otherwise the
/// envelope calculator is awaited. The map is re-checked after the await —
/// extent configuration may race with envelope computation under
/// cooperative scheduling, and an explicit extent configured in the interim
/// is preferred over the computed envelope.
pub async fn resolve_extent(
    map: &dyn HostMap,
    layer: &WmsLayer,
    calculator: &dyn EnvelopeCalculator,
    timeout: Option<Duration>,
) -> LayerResult<BoundingBox> {
    if let Some(extent) = map.max_extent() {
        return Ok(extent.normalize());
    }

    let envelope = calculator.compute_envelope(map, layer);
    let computed = match timeout {
        Some(deadline) => tokio::time::timeout(deadline, envelope)
            .await
            .map_err(|_| LayerError::ExtentUnavailable)??,
        None => envelope.await?,
    };

    if let Some(extent) = map.max_extent() {
        debug!("explicit extent configured while computing envelope, preferring it");
        return Ok(extent.normalize());
    }

    if !computed.is_valid() {
        return Err(LayerError::ExtentUnavailable);
    }
    Ok(computed)
}

/// Default envelope calculator: derives the envelope from the layer's own
/// capabilities.
///
/// A named layer uses its advertised extent; a collection layer uses the
/// union of every advertised extent. Falls back to the map's current view
/// box when the service advertises none.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityEnvelope;

#[async_trait]
impl EnvelopeCalculator for CapabilityEnvelope {
    async fn compute_envelope(
        &self,
        map: &dyn HostMap,
        layer: &WmsLayer,
    ) -> LayerResult<BoundingBox> {
        let capabilities = layer.capabilities().await?;

        let advertised = match layer.descriptor().name.as_deref() {
            Some(name) => capabilities.layer_extent(name),
            None => capabilities
                .layers()
                .iter()
                .filter_map(|l| l.extent)
                .reduce(|a, b| a.union(&b)),
        };

        advertised
            .filter(BoundingBox::is_valid)
            .or_else(|| map.bbox())
            .ok_or(LayerError::ExtentUnavailable)
    }
}
