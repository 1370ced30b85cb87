//! Layer materialization and lifecycle.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wms_capabilities::{append_query, CapabilitiesParser, CapabilityModel, RemoteFetch};
use wms_common::{LayerError, LayerResult, ResolutionList};

use crate::cache::CapabilityCache;
use crate::config::EngineConfig;
use crate::descriptor::LayerDescriptor;
use crate::extent::resolve_extent;
use crate::map::{EnvelopeCalculator, HostMap, RenderBackend, RenderHandle};
use crate::source::{build_source_spec, merge_vendor_overrides};

const DEFAULT_PROJECTION: &str = "EPSG:3857";

/// Collaborators and configuration shared by every layer built against one
/// engine.
pub struct EngineContext {
    pub config: EngineConfig,
    pub fetch: Arc<dyn RemoteFetch>,
    pub parser: Arc<dyn CapabilitiesParser>,
    pub envelope: Arc<dyn EnvelopeCalculator>,
    pub backend: Arc<dyn RenderBackend>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        fetch: Arc<dyn RemoteFetch>,
        parser: Arc<dyn CapabilitiesParser>,
        envelope: Arc<dyn EnvelopeCalculator>,
        backend: Arc<dyn RenderBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            fetch,
            parser,
            envelope,
            backend,
        })
    }

    /// Context with the default collaborators: HTTP fetch, XML capabilities
    /// reader, and the capability-derived envelope calculator.
    pub fn with_http(config: EngineConfig, backend: Arc<dyn RenderBackend>) -> LayerResult<Arc<Self>> {
        Ok(Self::new(
            config,
            Arc::new(wms_capabilities::HttpFetch::new()?),
            Arc::new(wms_capabilities::XmlCapabilitiesReader),
            Arc::new(crate::extent::CapabilityEnvelope),
            backend,
        ))
    }
}

/// Lifecycle of a layer instance.
///
/// Single-layer path: `Unattached → ResolvingExtent → Ready`.
/// All-layers path: `Unattached → FetchingCapabilities → ExpandingChildren →
/// Ready`. `Destroyed` is terminal and reachable from any state. A layer
/// whose materialization fails stays in its current state; it never reaches
/// `Ready` and is never retried by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Unattached,
    ResolvingExtent,
    FetchingCapabilities,
    ExpandingChildren,
    Ready,
    Destroyed,
}

/// A WMS layer attached (or attaching) to a host map.
///
/// Owns its native render handle exclusively; holds the host map through a
/// non-owning weak reference. For the all-layers case the instance carries
/// its expanded children in registration order.
pub struct WmsLayer {
    descriptor: LayerDescriptor,
    ctx: Arc<EngineContext>,
    capabilities: CapabilityCache,

    state: Mutex<LayerState>,
    map: Mutex<Option<Weak<dyn HostMap>>>,
    handle: Mutex<Option<Box<dyn RenderHandle>>>,
    children: Mutex<Vec<Arc<WmsLayer>>>,

    resolutions: Mutex<Option<ResolutionList>>,
    resolution_range: Mutex<(Option<f64>, Option<f64>)>,
    visibility: Mutex<bool>,
    z_index: Mutex<i32>,
    legend_url: Mutex<Option<String>>,
}

impl WmsLayer {
    pub fn new(descriptor: LayerDescriptor, ctx: Arc<EngineContext>) -> Arc<Self> {
        let z_index = ctx.config.base_z_index;
        let visibility = descriptor.visibility;
        let resolution_range = (descriptor.min_resolution, descriptor.max_resolution);
        let legend_url = descriptor.legend_url.clone();
        Arc::new(Self {
            descriptor,
            ctx,
            capabilities: CapabilityCache::new(),
            state: Mutex::new(LayerState::Unattached),
            map: Mutex::new(None),
            handle: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            resolutions: Mutex::new(None),
            resolution_range: Mutex::new(resolution_range),
            visibility: Mutex::new(visibility),
            z_index: Mutex::new(z_index),
            legend_url: Mutex::new(legend_url),
        })
    }

    pub fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> LayerState {
        *self.state.lock()
    }

    fn set_state(&self, state: LayerState) {
        debug!(layer = %self.display_name(), ?state, "layer state transition");
        *self.state.lock() = state;
    }

    fn display_name(&self) -> &str {
        self.descriptor.name.as_deref().unwrap_or("*")
    }

    fn host_map(&self) -> LayerResult<Arc<dyn HostMap>> {
        self.map
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LayerError::Destroyed)
    }

    fn projection_or_default(&self) -> String {
        self.host_map()
            .map(|map| map.projection())
            .unwrap_or_else(|_| DEFAULT_PROJECTION.to_string())
    }

    /// Resolve this layer's capabilities, fetching at most once.
    pub async fn capabilities(&self) -> LayerResult<Arc<CapabilityModel>> {
        let projection = self.projection_or_default();
        self.capabilities
            .get_or_fetch(
                &self.descriptor,
                &projection,
                self.ctx.fetch.as_ref(),
                self.ctx.parser.as_ref(),
            )
            .await
    }

    /// The resolved capability model, when one is already cached.
    pub fn cached_capabilities(&self) -> Option<Arc<CapabilityModel>> {
        self.capabilities.cached()
    }

    /// Attach this layer to a host map.
    ///
    /// A named descriptor materializes as a single layer; a nameless one
    /// expands into one child per advertised layer.
    pub async fn add_to(self: &Arc<Self>, map: Arc<dyn HostMap>) -> LayerResult<()> {
        *self.map.lock() = Some(Arc::downgrade(&map));
        self.ensure_legend_url();

        if self.descriptor.name.is_none() {
            self.add_all_layers().await
        } else {
            self.add_single_layer().await
        }
    }

    async fn add_single_layer(self: &Arc<Self>) -> LayerResult<()> {
        self.set_state(LayerState::ResolvingExtent);
        let map = self.host_map()?;

        // map resolutions win; fall back to any configured on this instance
        let resolutions = map
            .resolutions()
            .or_else(|| {
                self.resolutions
                    .lock()
                    .as_ref()
                    .map(|list| list.as_slice().to_vec())
            });

        let extent = resolve_extent(
            map.as_ref(),
            self,
            self.ctx.envelope.as_ref(),
            self.ctx.config.extent_timeout,
        )
        .await?;

        let z_index = self.z_index();
        let spec = build_source_spec(
            &self.descriptor,
            extent,
            resolutions.as_deref(),
            z_index,
            &self.ctx.config.default_format,
        )?;
        let spec = merge_vendor_overrides(spec, &self.descriptor.vendor);

        let handle = self.ctx.backend.create_layer(&spec);
        map.attach_native(handle.as_ref());
        handle.set_visible(self.is_visible());

        // base layers animate by default, overlays only when asked to
        let animated = !self.descriptor.transparent || self.descriptor.animated;
        handle.set_animated(animated);
        *self.handle.lock() = Some(handle);

        // materialization is asynchronous; visibility, z-index, and
        // resolutions may have been set while it was in flight
        if self.is_visible() && !self.in_range() {
            self.set_visible(false);
        }
        self.set_z_index(z_index);

        let pending = self.resolutions.lock().as_ref().map(|l| l.as_slice().to_vec());
        if let Some(pending) = pending {
            self.set_resolutions(pending).await?;
        }

        self.set_state(LayerState::Ready);
        info!(layer = %self.display_name(), "layer materialized");
        Ok(())
    }

    async fn add_all_layers(self: &Arc<Self>) -> LayerResult<()> {
        self.set_state(LayerState::FetchingCapabilities);
        let map = self.host_map()?;

        // a capability failure aborts the whole expansion with no children
        let capabilities = self.capabilities().await?;
        self.set_state(LayerState::ExpandingChildren);

        let mut children: Vec<Arc<WmsLayer>> = Vec::new();
        for advertised in capabilities.layers() {
            let child = WmsLayer::new(
                self.descriptor.child(&advertised.name, &advertised.version),
                self.ctx.clone(),
            );
            child.capabilities.seed(capabilities.clone());

            // one child failing must not take its siblings down with it
            match Box::pin(child.add_to(map.clone())).await {
                Ok(()) => children.push(child),
                Err(error) => {
                    warn!(layer = %advertised.name, %error, "skipping advertised layer");
                }
            }
        }

        map.register_layers(&children);

        // later-registered children draw above earlier ones
        let base = self.ctx.config.base_z_index;
        for (index, child) in children.iter().enumerate() {
            child.set_z_index(base + 1 + index as i32);
        }

        info!(
            url = %self.descriptor.url,
            children = children.len(),
            "expanded all advertised layers"
        );
        *self.children.lock() = children;
        self.set_state(LayerState::Ready);
        Ok(())
    }

    /// Expanded children, in registration order. Empty for named layers.
    pub fn children(&self) -> Vec<Arc<WmsLayer>> {
        self.children.lock().clone()
    }

    pub fn is_visible(&self) -> bool {
        *self.visibility.lock()
    }

    /// Set layer visibility.
    ///
    /// Showing a non-transparent layer makes it the base layer: every other
    /// visible base layer on the map is hidden first, then the map's
    /// resolutions are recalculated with the current bounding box preserved
    /// across the recalculation.
    pub fn set_visible(&self, visibility: bool) {
        *self.visibility.lock() = visibility;
        if !self.in_range() {
            return;
        }

        let map = match self.host_map() {
            Ok(map) => map,
            Err(_) => return,
        };

        if visibility && !self.descriptor.transparent {
            for other in map.base_layers() {
                if other.as_ref() != self && other.is_visible() {
                    other.set_visible(false);
                }
            }

            if let Some(handle) = self.handle.lock().as_ref() {
                handle.set_visible(true);
            }

            let old_bbox = map.bbox();
            map.update_resolutions_from_base_layer();
            if let Some(bbox) = old_bbox {
                map.set_bbox(bbox);
            }
        } else if let Some(handle) = self.handle.lock().as_ref() {
            handle.set_visible(visibility);
        }
    }

    /// Whether the map's current resolution falls inside this layer's
    /// configured range. A map that has not rendered yet is in range.
    pub fn in_range(&self) -> bool {
        let resolution = match self.host_map().ok().and_then(|map| map.resolution()) {
            Some(resolution) => resolution,
            None => return true,
        };
        let (min, max) = *self.resolution_range.lock();
        min.map_or(true, |min| resolution >= min) && max.map_or(true, |max| resolution <= max)
    }

    /// Update this layer's resolutions.
    ///
    /// Records the list always; when the layer is tiled, already attached,
    /// and has no embedder-supplied source, the live handle's source and
    /// extent are hot-swapped in place — the handle identity is preserved.
    pub async fn set_resolutions(self: &Arc<Self>, resolutions: Vec<f64>) -> LayerResult<()> {
        let list = ResolutionList::new(resolutions)?;
        *self.resolutions.lock() = Some(list.clone());

        if !self.descriptor.tiled
            || self.descriptor.vendor.source_supplied
            || self.handle.lock().is_none()
        {
            return Ok(());
        }

        let map = self.host_map()?;
        let extent = resolve_extent(
            map.as_ref(),
            self,
            self.ctx.envelope.as_ref(),
            self.ctx.config.extent_timeout,
        )
        .await?;

        let spec = build_source_spec(
            &self.descriptor,
            extent,
            Some(list.as_slice()),
            self.z_index(),
            &self.ctx.config.default_format,
        )?;
        let spec = merge_vendor_overrides(spec, &self.descriptor.vendor);

        if let Some(handle) = self.handle.lock().as_ref() {
            handle.set_source(&spec);
            handle.set_extent(extent);
            debug!(layer = %self.display_name(), "hot-swapped source for new resolutions");
        }
        Ok(())
    }

    /// Resolutions recorded on this instance, if any.
    pub fn resolutions(&self) -> Option<ResolutionList> {
        self.resolutions.lock().clone()
    }

    pub fn z_index(&self) -> i32 {
        *self.z_index.lock()
    }

    pub fn set_z_index(&self, z_index: i32) {
        *self.z_index.lock() = z_index;
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.set_z_index(z_index);
        }
    }

    pub fn min_resolution(&self) -> Option<f64> {
        self.resolution_range.lock().0
    }

    pub fn max_resolution(&self) -> Option<f64> {
        self.resolution_range.lock().1
    }

    /// Re-derive the layer's resolution range, pushing it to the live
    /// handle. Used when the map's projection changes.
    pub fn set_resolution_range(&self, min: Option<f64>, max: Option<f64>) {
        *self.resolution_range.lock() = (min, max);
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.set_min_resolution(min);
            handle.set_max_resolution(max);
        }
    }

    pub fn is_queryable(&self) -> bool {
        self.descriptor.queryable
    }

    pub fn num_zoom_levels(&self) -> u32 {
        self.descriptor.num_zoom_levels
    }

    pub fn legend_url(&self) -> Option<String> {
        self.legend_url.lock().clone()
    }

    pub fn set_legend_url(&self, url: impl Into<String>) {
        *self.legend_url.lock() = Some(url.into());
    }

    /// Derive a GetLegendGraphic URL when the layer still carries the
    /// theme's placeholder legend (or none at all).
    fn ensure_legend_url(&self) {
        let name = match &self.descriptor.name {
            Some(name) => name,
            None => return,
        };
        let mut legend = self.legend_url.lock();
        let is_placeholder = match (legend.as_deref(), self.ctx.config.default_legend_url.as_deref())
        {
            (None, _) => true,
            (Some(current), Some(default)) => current == default,
            (Some(_), None) => false,
        };
        if is_placeholder {
            *legend = Some(append_query(
                &self.descriptor.url,
                &format!(
                    "SERVICE=WMS&VERSION={}&REQUEST=GetLegendGraphic&LAYER={}&FORMAT=image/png&EXCEPTIONS=image/png",
                    self.descriptor.version, name
                ),
            ));
        }
    }

    /// Poke the live source so the next render refetches.
    pub fn refresh(&self) {
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.refresh();
        }
    }

    /// Detach from the host map and drop the native handle and children.
    /// The host map itself is untouched.
    pub fn destroy(&self) {
        if let Some(handle) = self.handle.lock().take() {
            if let Ok(map) = self.host_map() {
                map.detach_native(handle.as_ref());
            }
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in &children {
            child.destroy();
        }
        *self.map.lock() = None;
        self.set_state(LayerState::Destroyed);
    }

    /// Identity of the native handle, when materialized. Stable across
    /// resolution hot-swaps.
    pub fn handle_id(&self) -> Option<u64> {
        self.handle.lock().as_ref().map(|handle| handle.id())
    }
}

impl PartialEq for WmsLayer {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.url == other.descriptor.url
            && self.descriptor.name == other.descriptor.name
            && self.descriptor.version == other.descriptor.version
    }
}
