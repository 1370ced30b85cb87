//! Parsed capability model consumed by the layer engine.

use serde::{Deserialize, Serialize};
use wms_common::BoundingBox;

/// One layer advertised by a capabilities document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityLayer {
    /// Machine name, used as the LAYERS request parameter.
    pub name: String,

    /// Human-readable title.
    pub title: String,

    /// WMS version the layer was advertised under.
    pub version: String,

    /// Geographic extent, when the document declares one for this layer.
    pub extent: Option<BoundingBox>,
}

/// The parsed result of one GetCapabilities fetch.
///
/// Keyed to `(service_url, version, projection)`; read-only once built and
/// shared between a parent layer and its expanded children via `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityModel {
    service_url: String,
    version: String,
    projection: String,
    layers: Vec<CapabilityLayer>,
}

impl CapabilityModel {
    pub fn new(
        service_url: impl Into<String>,
        version: impl Into<String>,
        projection: impl Into<String>,
        layers: Vec<CapabilityLayer>,
    ) -> Self {
        Self {
            service_url: service_url.into(),
            version: version.into(),
            projection: projection.into(),
            layers,
        }
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    /// Advertised layers, in document order.
    pub fn layers(&self) -> &[CapabilityLayer] {
        &self.layers
    }

    /// Look up the advertised extent for a named layer.
    pub fn layer_extent(&self, name: &str) -> Option<BoundingBox> {
        self.layers
            .iter()
            .find(|layer| layer.name == name)
            .and_then(|layer| layer.extent)
    }
}
