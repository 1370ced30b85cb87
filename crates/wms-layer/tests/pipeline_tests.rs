//! End-to-end materialization pipeline tests against the headless
//! collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wms_layer::headless::{CannedFetch, RecordingBackend, ScriptedMap};
use wms_layer::{
    resolve_extent, BoundingBox, CapabilityEnvelope, EngineConfig, EngineContext,
    EnvelopeCalculator, HostMap, LayerDescriptor, LayerError, LayerResult, LayerState, MaxExtent,
    WmsLayer,
};

const CAPS_THREE_LAYERS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0">
  <Capability>
    <Layer>
      <Title>Root</Title>
      <Layer>
        <Name>c1</Name>
        <Title>First</Title>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>-10.0</westBoundLongitude>
          <eastBoundLongitude>10.0</eastBoundLongitude>
          <southBoundLatitude>-5.0</southBoundLatitude>
          <northBoundLatitude>5.0</northBoundLatitude>
        </EX_GeographicBoundingBox>
      </Layer>
      <Layer>
        <Name>c2</Name>
        <Title>Second</Title>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>0.0</westBoundLongitude>
          <eastBoundLongitude>20.0</eastBoundLongitude>
          <southBoundLatitude>0.0</southBoundLatitude>
          <northBoundLatitude>10.0</northBoundLatitude>
        </EX_GeographicBoundingBox>
      </Layer>
      <Layer>
        <Name>c3</Name>
        <Title>Third</Title>
        <EX_GeographicBoundingBox>
          <westBoundLongitude>-20.0</westBoundLongitude>
          <eastBoundLongitude>0.0</eastBoundLongitude>
          <southBoundLatitude>-10.0</southBoundLatitude>
          <northBoundLatitude>0.0</northBoundLatitude>
        </EX_GeographicBoundingBox>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

/// Envelope calculator returning a fixed box, counting invocations.
struct FixedEnvelope {
    bbox: BoundingBox,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixedEnvelope {
    fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnvelopeCalculator for FixedEnvelope {
    async fn compute_envelope(
        &self,
        _map: &dyn HostMap,
        _layer: &WmsLayer,
    ) -> LayerResult<BoundingBox> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.bbox)
    }
}

/// Envelope calculator that never completes in test time.
struct StalledEnvelope;

#[async_trait]
impl EnvelopeCalculator for StalledEnvelope {
    async fn compute_envelope(
        &self,
        _map: &dyn HostMap,
        _layer: &WmsLayer,
    ) -> LayerResult<BoundingBox> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(LayerError::ExtentUnavailable)
    }
}

fn context_with(
    fetch: CannedFetch,
    envelope: Arc<dyn EnvelopeCalculator>,
    backend: Arc<RecordingBackend>,
) -> Arc<EngineContext> {
    EngineContext::new(
        EngineConfig::default(),
        Arc::new(fetch),
        Arc::new(wms_capabilities::XmlCapabilitiesReader),
        envelope,
        backend,
    )
}

// ============================================================================
// Extent fallback chain
// ============================================================================

#[tokio::test]
async fn explicit_extent_wins_without_envelope_call() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 100.0, 100.0])));

    let backend = RecordingBackend::new();
    let envelope = Arc::new(FixedEnvelope::new(BoundingBox::new(-1.0, -1.0, 1.0, 1.0)));
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        envelope.clone(),
        backend,
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx.clone());
    layer.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();

    let resolved = resolve_extent(map.as_ref(), &layer, envelope.as_ref(), None)
        .await
        .unwrap();
    assert_eq!(resolved.to_array(), [0.0, 0.0, 100.0, 100.0]);
    // the explicit extent short-circuits the whole chain; the single call
    // above came from materialization never reaching the envelope either
    assert_eq!(envelope.calls(), 0);
}

#[tokio::test]
async fn envelope_used_when_no_explicit_extent() {
    let map = ScriptedMap::new("EPSG:3857");

    let backend = RecordingBackend::new();
    let envelope = Arc::new(FixedEnvelope::new(BoundingBox::new(-5.0, -5.0, 5.0, 5.0)));
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        envelope.clone(),
        backend,
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx.clone());
    layer.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();

    let before = envelope.calls();
    let resolved = resolve_extent(map.as_ref(), &layer, envelope.as_ref(), None)
        .await
        .unwrap();
    assert_eq!(resolved.to_array(), [-5.0, -5.0, 5.0, 5.0]);
    assert_eq!(envelope.calls(), before + 1);
}

#[tokio::test]
async fn explicit_extent_configured_during_envelope_wait_wins() {
    let map = ScriptedMap::new("EPSG:3857");

    let backend = RecordingBackend::new();
    let envelope = Arc::new(
        FixedEnvelope::new(BoundingBox::new(-5.0, -5.0, 5.0, 5.0))
            .with_delay(Duration::from_millis(30)),
    );
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        envelope.clone(),
        backend,
    );
    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx.clone());
    layer.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();

    let racing_map = map.clone();
    let (resolved, _) = tokio::join!(
        resolve_extent(map.as_ref(), &layer, envelope.as_ref(), None),
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            racing_map.set_max_extent(Some(MaxExtent::Corners([1.0, 2.0, 3.0, 4.0])));
        }
    );

    assert_eq!(resolved.unwrap().to_array(), [1.0, 2.0, 3.0, 4.0]);
}

#[tokio::test]
async fn stalled_envelope_times_out_when_configured() {
    let map = ScriptedMap::new("EPSG:3857");

    let backend = RecordingBackend::new();
    let config = EngineConfig {
        extent_timeout: Some(Duration::from_millis(20)),
        ..EngineConfig::default()
    };
    let ctx = EngineContext::new(
        config,
        Arc::new(CannedFetch::ok(CAPS_THREE_LAYERS)),
        Arc::new(wms_capabilities::XmlCapabilitiesReader),
        Arc::new(StalledEnvelope),
        backend,
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx);
    let err = layer
        .add_to(map as Arc<dyn HostMap>)
        .await
        .unwrap_err();
    assert!(matches!(err, LayerError::ExtentUnavailable));
    // the layer stalls short of Ready
    assert_eq!(layer.state(), LayerState::ResolvingExtent);
}

// ============================================================================
// Single-layer materialization
// ============================================================================

#[tokio::test]
async fn tile_grid_anchored_at_extent_bottom_left() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 100.0, 100.0])));
    map.set_resolutions(Some(vec![50.0, 25.0]));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx);
    layer.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();

    assert_eq!(layer.state(), LayerState::Ready);
    let state = backend.handle_state(layer.handle_id().unwrap()).unwrap();
    let grid = state.spec.tile_grid.expect("tiled spec carries a grid");
    assert_eq!(grid.origin, (0.0, 0.0));
    assert_eq!(grid.resolutions.as_slice(), &[50.0, 25.0]);
    assert_eq!(map.attached(), vec![layer.handle_id().unwrap()]);
}

#[tokio::test]
async fn custom_params_pass_through_verbatim() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 10.0, 10.0])));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let mut descriptor = LayerDescriptor::single("https://x/wms", "c1");
    let mut params = std::collections::BTreeMap::new();
    params.insert("format".to_string(), "image/jpeg".to_string());
    descriptor.custom_params = Some(params);

    let layer = WmsLayer::new(descriptor, ctx);
    layer.add_to(map as Arc<dyn HostMap>).await.unwrap();

    let state = backend.handle_state(layer.handle_id().unwrap()).unwrap();
    assert_eq!(state.spec.params.get("FORMAT").unwrap(), "image/jpeg");
    assert_eq!(state.spec.params.len(), 1);
}

#[tokio::test]
async fn base_layer_flagged_animated() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 10.0, 10.0])));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    // non-transparent acts as a base layer and animates
    let base = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx.clone());
    base.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();
    assert!(backend
        .handle_state(base.handle_id().unwrap())
        .unwrap()
        .animated);

    // a transparent overlay does not, unless configured animated
    let mut overlay_descriptor = LayerDescriptor::single("https://x/wms", "c2");
    overlay_descriptor.transparent = true;
    let overlay = WmsLayer::new(overlay_descriptor, ctx);
    overlay
        .add_to(map.clone() as Arc<dyn HostMap>)
        .await
        .unwrap();
    assert!(!backend
        .handle_state(overlay.handle_id().unwrap())
        .unwrap()
        .animated);
}

// ============================================================================
// Resolution updates
// ============================================================================

#[tokio::test]
async fn set_resolutions_hot_swaps_live_source() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 100.0, 100.0])));
    map.set_resolutions(Some(vec![50.0, 25.0]));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx);
    layer.add_to(map as Arc<dyn HostMap>).await.unwrap();
    let id_before = layer.handle_id().unwrap();

    layer.set_resolutions(vec![40.0, 20.0, 10.0]).await.unwrap();

    // same handle, new source
    assert_eq!(layer.handle_id().unwrap(), id_before);
    let state = backend.handle_state(id_before).unwrap();
    assert!(state.source_swaps >= 1);
    assert_eq!(
        state.spec.tile_grid.unwrap().resolutions.as_slice(),
        &[40.0, 20.0, 10.0]
    );
}

#[tokio::test]
async fn resolutions_recorded_before_attach_are_applied_after() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 100.0, 100.0])));
    // the map itself declares no resolutions

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx);
    // arrives before materialization, as in an out-of-order configuration
    layer.set_resolutions(vec![80.0, 40.0]).await.unwrap();
    layer.add_to(map as Arc<dyn HostMap>).await.unwrap();

    let state = backend.handle_state(layer.handle_id().unwrap()).unwrap();
    assert_eq!(
        state.spec.tile_grid.unwrap().resolutions.as_slice(),
        &[80.0, 40.0]
    );
}

#[tokio::test]
async fn vendor_supplied_source_disables_hot_swap() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 100.0, 100.0])));
    map.set_resolutions(Some(vec![50.0, 25.0]));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let mut descriptor = LayerDescriptor::single("https://x/wms", "c1");
    descriptor.vendor.source_supplied = true;
    let layer = WmsLayer::new(descriptor, ctx);
    layer.add_to(map as Arc<dyn HostMap>).await.unwrap();

    layer.set_resolutions(vec![40.0, 20.0]).await.unwrap();
    let state = backend.handle_state(layer.handle_id().unwrap()).unwrap();
    assert_eq!(state.source_swaps, 0);
}

// ============================================================================
// Base-layer mutual exclusion
// ============================================================================

#[tokio::test]
async fn showing_base_layer_hides_other_base_layers() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 100.0, 100.0])));
    map.set_current_bbox(Some(BoundingBox::new(10.0, 10.0, 20.0, 20.0)));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let a = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx.clone());
    let b = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c2"), ctx);
    a.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();
    b.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();
    map.add_layer(a.clone());
    map.add_layer(b.clone());
    assert!(a.is_visible() && b.is_visible());

    a.set_visible(true);

    assert!(a.is_visible());
    assert!(!b.is_visible());
    assert!(!backend.handle_state(b.handle_id().unwrap()).unwrap().visible);
    assert!(backend.handle_state(a.handle_id().unwrap()).unwrap().visible);

    // resolutions recalculated once, with the old bbox restored afterwards
    assert_eq!(map.resolution_update_count(), 1);
    assert_eq!(
        map.bbox_writes().last().unwrap().to_array(),
        [10.0, 10.0, 20.0, 20.0]
    );
}

// ============================================================================
// All-layers expansion
// ============================================================================

#[tokio::test]
async fn all_layers_expansion_scenario() {
    let map = ScriptedMap::new("EPSG:3857");
    // no explicit extent: children resolve through their capability extents

    let backend = RecordingBackend::new();
    let fetch = Arc::new(CannedFetch::ok(CAPS_THREE_LAYERS));
    let ctx = EngineContext::new(
        EngineConfig::default(),
        fetch.clone(),
        Arc::new(wms_capabilities::XmlCapabilitiesReader),
        Arc::new(CapabilityEnvelope),
        backend.clone(),
    );

    let parent = WmsLayer::new(LayerDescriptor::all_layers("https://x/wms"), ctx.clone());
    parent.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();

    assert_eq!(parent.state(), LayerState::Ready);
    let children = parent.children();
    assert_eq!(children.len(), 3);

    // registration order matches advertisement order
    let names: Vec<_> = children
        .iter()
        .map(|c| c.descriptor().name.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["c1", "c2", "c3"]);

    // z-indices are base+1..base+n, strictly increasing in registration order
    let base = EngineConfig::default().base_z_index;
    let z: Vec<_> = children.iter().map(|c| c.z_index()).collect();
    assert_eq!(z, vec![base + 1, base + 2, base + 3]);

    // every child materialized and registered with the map
    assert!(children.iter().all(|c| c.state() == LayerState::Ready));
    assert_eq!(map.layers().len(), 3);
    assert_eq!(map.attached().len(), 3);

    // one fetch served the parent and every child
    assert_eq!(fetch.calls(), 1);
}

#[tokio::test]
async fn capability_failure_aborts_expansion_with_no_children() {
    let map = ScriptedMap::new("EPSG:3857");

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::failing("connection refused"),
        Arc::new(CapabilityEnvelope),
        backend,
    );

    let parent = WmsLayer::new(LayerDescriptor::all_layers("https://x/wms"), ctx);
    let err = parent
        .add_to(map.clone() as Arc<dyn HostMap>)
        .await
        .unwrap_err();

    assert!(matches!(err, LayerError::Network(_)));
    assert!(parent.children().is_empty());
    assert!(map.layers().is_empty());
    assert_eq!(parent.state(), LayerState::FetchingCapabilities);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn destroy_detaches_handle_and_children() {
    let map = ScriptedMap::new("EPSG:3857");

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend,
    );

    let parent = WmsLayer::new(LayerDescriptor::all_layers("https://x/wms"), ctx);
    parent.add_to(map.clone() as Arc<dyn HostMap>).await.unwrap();
    assert_eq!(map.attached().len(), 3);

    parent.destroy();

    assert_eq!(map.attached().len(), 0);
    assert_eq!(parent.state(), LayerState::Destroyed);
    assert!(parent.children().is_empty());
}

#[tokio::test]
async fn legend_url_derived_from_service() {
    let map = ScriptedMap::new("EPSG:3857");
    map.set_max_extent(Some(MaxExtent::Corners([0.0, 0.0, 10.0, 10.0])));

    let backend = RecordingBackend::new();
    let ctx = context_with(
        CannedFetch::ok(CAPS_THREE_LAYERS),
        Arc::new(CapabilityEnvelope),
        backend,
    );

    let layer = WmsLayer::new(LayerDescriptor::single("https://x/wms", "c1"), ctx);
    layer.add_to(map as Arc<dyn HostMap>).await.unwrap();

    let legend = layer.legend_url().unwrap();
    assert!(legend.starts_with("https://x/wms?"));
    assert!(legend.contains("REQUEST=GetLegendGraphic"));
    assert!(legend.contains("LAYER=c1"));
}
