//! Headless collaborators: a scripted host map, a canned fetcher, and a
//! recording render backend.
//!
//! Used by the engine's own tests and by tooling that wants to run the
//! materialization pipeline without a real map widget.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use wms_common::{BoundingBox, LayerError, LayerResult, MaxExtent};

use crate::layer::WmsLayer;
use crate::map::{HostMap, RenderBackend, RenderHandle};
use crate::source::RenderSourceSpec;

// ============================================================================
// Canned fetch
// ============================================================================

/// A fetcher that returns a fixed document (or error) and counts calls.
pub struct CannedFetch {
    body: Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl CannedFetch {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            body: Ok(body.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            body: Err(message.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay each response, making in-flight sharing observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl wms_capabilities::RemoteFetch for CannedFetch {
    async fn fetch(&self, _url: &str) -> LayerResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.body {
            Ok(body) => Ok(body.clone()),
            Err(message) => Err(LayerError::Network(message.clone())),
        }
    }
}

// ============================================================================
// Scripted host map
// ============================================================================

/// A host map whose observable state is set directly by the test or tool.
#[derive(Default)]
pub struct ScriptedMap {
    projection: String,
    max_extent: Mutex<Option<MaxExtent>>,
    resolutions: Mutex<Option<Vec<f64>>>,
    resolution: Mutex<Option<f64>>,
    bbox: Mutex<Option<BoundingBox>>,
    registered: Mutex<Vec<Arc<WmsLayer>>>,
    attached: Mutex<Vec<u64>>,
    resolution_updates: AtomicUsize,
    bbox_writes: Mutex<Vec<BoundingBox>>,
}

impl ScriptedMap {
    pub fn new(projection: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            projection: projection.into(),
            ..Self::default()
        })
    }

    pub fn set_max_extent(&self, extent: Option<MaxExtent>) {
        *self.max_extent.lock() = extent;
    }

    pub fn set_resolutions(&self, resolutions: Option<Vec<f64>>) {
        *self.resolutions.lock() = resolutions;
    }

    pub fn set_resolution(&self, resolution: Option<f64>) {
        *self.resolution.lock() = resolution;
    }

    pub fn set_current_bbox(&self, bbox: Option<BoundingBox>) {
        *self.bbox.lock() = bbox;
    }

    /// Register a layer directly, e.g. an externally built base layer.
    pub fn add_layer(&self, layer: Arc<WmsLayer>) {
        self.registered.lock().push(layer);
    }

    /// Layers registered with this map, in registration order.
    pub fn layers(&self) -> Vec<Arc<WmsLayer>> {
        self.registered.lock().clone()
    }

    /// Ids of currently attached native handles.
    pub fn attached(&self) -> Vec<u64> {
        self.attached.lock().clone()
    }

    /// How many times base-layer resolution recalculation was requested.
    pub fn resolution_update_count(&self) -> usize {
        self.resolution_updates.load(Ordering::SeqCst)
    }

    /// Every bbox written back to the map, oldest first.
    pub fn bbox_writes(&self) -> Vec<BoundingBox> {
        self.bbox_writes.lock().clone()
    }
}

impl HostMap for ScriptedMap {
    fn max_extent(&self) -> Option<MaxExtent> {
        *self.max_extent.lock()
    }

    fn resolutions(&self) -> Option<Vec<f64>> {
        self.resolutions.lock().clone()
    }

    fn resolution(&self) -> Option<f64> {
        *self.resolution.lock()
    }

    fn projection(&self) -> String {
        self.projection.clone()
    }

    fn bbox(&self) -> Option<BoundingBox> {
        *self.bbox.lock()
    }

    fn set_bbox(&self, bbox: BoundingBox) {
        *self.bbox.lock() = Some(bbox);
        self.bbox_writes.lock().push(bbox);
    }

    fn base_layers(&self) -> Vec<Arc<WmsLayer>> {
        self.registered
            .lock()
            .iter()
            .filter(|layer| !layer.descriptor().transparent)
            .cloned()
            .collect()
    }

    fn register_layers(&self, layers: &[Arc<WmsLayer>]) {
        self.registered.lock().extend_from_slice(layers);
    }

    fn attach_native(&self, handle: &dyn RenderHandle) {
        self.attached.lock().push(handle.id());
    }

    fn detach_native(&self, handle: &dyn RenderHandle) {
        self.attached.lock().retain(|id| *id != handle.id());
    }

    fn update_resolutions_from_base_layer(&self) {
        self.resolution_updates.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Recording backend
// ============================================================================

/// Observable state of one recording handle.
#[derive(Debug, Clone)]
pub struct HandleState {
    pub spec: RenderSourceSpec,
    pub extent: BoundingBox,
    pub visible: bool,
    pub opacity: f64,
    pub z_index: i32,
    pub min_resolution: Option<f64>,
    pub max_resolution: Option<f64>,
    pub animated: bool,
    pub source_swaps: usize,
    pub refreshes: usize,
}

/// A render backend that records every created handle for inspection.
#[derive(Default)]
pub struct RecordingBackend {
    next_id: AtomicU64,
    handles: Mutex<Vec<(u64, Arc<Mutex<HandleState>>)>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Snapshot of a handle's state by id.
    pub fn handle_state(&self, id: u64) -> Option<HandleState> {
        self.handles
            .lock()
            .iter()
            .find(|(handle_id, _)| *handle_id == id)
            .map(|(_, state)| state.lock().clone())
    }
}

impl RenderBackend for RecordingBackend {
    fn create_layer(&self, spec: &RenderSourceSpec) -> Box<dyn RenderHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let state = Arc::new(Mutex::new(HandleState {
            spec: spec.clone(),
            extent: spec.extent,
            visible: true,
            opacity: spec.opacity,
            z_index: spec.z_index,
            min_resolution: spec.min_resolution,
            max_resolution: spec.max_resolution,
            animated: false,
            source_swaps: 0,
            refreshes: 0,
        }));
        self.handles.lock().push((id, state.clone()));
        Box::new(RecordingHandle { id, state })
    }
}

struct RecordingHandle {
    id: u64,
    state: Arc<Mutex<HandleState>>,
}

impl RenderHandle for RecordingHandle {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_source(&self, spec: &RenderSourceSpec) {
        let mut state = self.state.lock();
        state.spec = spec.clone();
        state.source_swaps += 1;
    }

    fn set_extent(&self, extent: BoundingBox) {
        self.state.lock().extent = extent;
    }

    fn set_visible(&self, visible: bool) {
        self.state.lock().visible = visible;
    }

    fn set_opacity(&self, opacity: f64) {
        self.state.lock().opacity = opacity;
    }

    fn set_z_index(&self, z_index: i32) {
        self.state.lock().z_index = z_index;
    }

    fn set_min_resolution(&self, resolution: Option<f64>) {
        self.state.lock().min_resolution = resolution;
    }

    fn set_max_resolution(&self, resolution: Option<f64>) {
        self.state.lock().max_resolution = resolution;
    }

    fn set_animated(&self, animated: bool) {
        self.state.lock().animated = animated;
    }

    fn refresh(&self) {
        self.state.lock().refreshes += 1;
    }
}
