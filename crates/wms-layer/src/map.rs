//! Collaborator contracts consumed by the layer engine.
//!
//! The host map and render backend are supplied by the embedder; the engine
//! only ever talks to these traits. All methods take `&self` — native
//! mapping objects use interior mutability, and the engine's concurrency
//! model is single-threaded cooperative scheduling.

use std::sync::Arc;

use async_trait::async_trait;
use wms_common::{BoundingBox, LayerResult, MaxExtent};

use crate::layer::WmsLayer;
use crate::source::RenderSourceSpec;

/// The map a layer attaches to. Non-owning from the layer's perspective.
pub trait HostMap: Send + Sync {
    /// Explicitly configured maximum extent, if the embedder declared one.
    fn max_extent(&self) -> Option<MaxExtent>;

    /// Resolution list declared on the map, coarsest first.
    fn resolutions(&self) -> Option<Vec<f64>>;

    /// Current view resolution, when the map has rendered at least once.
    fn resolution(&self) -> Option<f64>;

    /// Projection code, e.g. `EPSG:3857`.
    fn projection(&self) -> String;

    /// Current view bounding box.
    fn bbox(&self) -> Option<BoundingBox>;

    fn set_bbox(&self, bbox: BoundingBox);

    /// Layers currently acting as base layers (non-transparent).
    fn base_layers(&self) -> Vec<Arc<WmsLayer>>;

    /// Register expanded children with the map.
    fn register_layers(&self, layers: &[Arc<WmsLayer>]);

    /// Attach a native rendering object produced by the backend.
    fn attach_native(&self, handle: &dyn RenderHandle);

    /// Detach a previously attached rendering object.
    fn detach_native(&self, handle: &dyn RenderHandle);

    /// Recalculate the map's resolutions from its visible base layer.
    fn update_resolutions_from_base_layer(&self);
}

/// Constructs native rendering objects from source specs.
pub trait RenderBackend: Send + Sync {
    fn create_layer(&self, spec: &RenderSourceSpec) -> Box<dyn RenderHandle>;
}

/// An opaque renderable handle owned by exactly one layer.
///
/// `set_source` swaps the backing source on a live handle without changing
/// the handle's identity.
pub trait RenderHandle: Send + Sync {
    /// Stable identity assigned by the backend.
    fn id(&self) -> u64;

    fn set_source(&self, spec: &RenderSourceSpec);
    fn set_extent(&self, extent: BoundingBox);
    fn set_visible(&self, visible: bool);
    fn set_opacity(&self, opacity: f64);
    fn set_z_index(&self, z_index: i32);
    fn set_min_resolution(&self, resolution: Option<f64>);
    fn set_max_resolution(&self, resolution: Option<f64>);
    fn set_animated(&self, animated: bool);

    /// Poke the source so the next render refetches.
    fn refresh(&self);
}

/// Computes a bounding box covering the currently relevant data, used when
/// the host map declares no explicit extent.
#[async_trait]
pub trait EnvelopeCalculator: Send + Sync {
    async fn compute_envelope(
        &self,
        map: &dyn HostMap,
        layer: &WmsLayer,
    ) -> LayerResult<BoundingBox>;
}
