//! WMS layer materialization engine.
//!
//! Attaches WMS layers to a host map: discovers capabilities with a
//! per-layer single-flight cache, resolves the effective extent through a
//! fallback chain, builds tiled or untiled render source specifications,
//! and drives the layer lifecycle (visibility, z-index stacking, hot-swap
//! resolution updates, all-layers expansion).
//!
//! The engine renders nothing itself; the host map and the native render
//! backend are collaborator traits supplied by the embedder.

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod extent;
pub mod headless;
pub mod layer;
pub mod map;
pub mod source;

pub use cache::CapabilityCache;
pub use config::EngineConfig;
pub use descriptor::LayerDescriptor;
pub use extent::{resolve_extent, CapabilityEnvelope};
pub use layer::{EngineContext, LayerState, WmsLayer};
pub use map::{EnvelopeCalculator, HostMap, RenderBackend, RenderHandle};
pub use source::{
    build_source_spec, merge_vendor_overrides, RenderSourceSpec, SourceKind, TileGrid,
    VendorOverrides,
};

pub use wms_common::{BoundingBox, LayerError, LayerResult, MaxExtent, ResolutionList};
