//! Render source specification builder.
//!
//! Pure construction: identical inputs produce a structurally identical
//! spec. The spec is owned by the materializing layer until handed to the
//! render backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use wms_common::{BoundingBox, LayerResult, ResolutionList};

use crate::descriptor::LayerDescriptor;

/// Tiled sources get a tile grid; untiled sources render one image per view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Tiled,
    Untiled,
}

/// A resolution-indexed partitioning of an extent, anchored bottom-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    pub resolutions: ResolutionList,
    pub extent: BoundingBox,
    pub origin: (f64, f64),
}

impl TileGrid {
    /// Build a grid over `extent` with its origin at the extent's
    /// bottom-left corner.
    pub fn new(resolutions: ResolutionList, extent: BoundingBox) -> Self {
        let origin = extent.bottom_left();
        Self {
            resolutions,
            extent,
            origin,
        }
    }
}

/// Everything the render backend needs to construct a native source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSourceSpec {
    pub kind: SourceKind,
    pub url: String,
    pub params: BTreeMap<String, String>,
    /// Present for tiled specs built with known resolutions.
    pub tile_grid: Option<TileGrid>,
    /// Untiled specs carry their resolutions directly.
    pub resolutions: Option<ResolutionList>,
    pub extent: BoundingBox,
    pub min_resolution: Option<f64>,
    pub max_resolution: Option<f64>,
    pub opacity: f64,
    pub z_index: i32,
}

/// Build the source spec for a descriptor over a resolved extent.
///
/// `resolutions` may be absent for tiled layers whose host map has not
/// declared any; the resulting spec then carries no tile grid and the
/// backend falls back to its own default gridding.
pub fn build_source_spec(
    descriptor: &LayerDescriptor,
    extent: BoundingBox,
    resolutions: Option<&[f64]>,
    z_index: i32,
    default_format: &str,
) -> LayerResult<RenderSourceSpec> {
    let params = descriptor.request_params(default_format);

    let validated = match resolutions {
        Some(raw) => Some(ResolutionList::new(raw.to_vec())?),
        None => None,
    };

    let (kind, tile_grid, carried) = if descriptor.tiled {
        let grid = validated.map(|list| TileGrid::new(list, extent));
        (SourceKind::Tiled, grid, None)
    } else {
        (SourceKind::Untiled, None, validated)
    };

    Ok(RenderSourceSpec {
        kind,
        url: descriptor.url.clone(),
        params,
        tile_grid,
        resolutions: carried,
        extent,
        min_resolution: descriptor.min_resolution,
        max_resolution: descriptor.max_resolution,
        opacity: descriptor.opacity,
        z_index,
    })
}

/// Embedder overrides applied after spec construction.
///
/// Only the allow-listed fields below can be overridden; computed fields
/// come first and overrides win. `source_supplied` marks that the embedder
/// installed its own native source, which disables resolution hot-swaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorOverrides {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub min_resolution: Option<f64>,
    #[serde(default)]
    pub max_resolution: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub source_supplied: bool,
}

impl VendorOverrides {
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
            && self.min_resolution.is_none()
            && self.max_resolution.is_none()
            && self.opacity.is_none()
    }
}

/// Merge vendor overrides into a computed spec.
///
/// Precedence: computed fields first, overrides after. Override keys in
/// `params` replace computed entries of the same (upper-cased) key.
pub fn merge_vendor_overrides(
    mut spec: RenderSourceSpec,
    overrides: &VendorOverrides,
) -> RenderSourceSpec {
    for (key, value) in &overrides.params {
        let key = key.to_uppercase();
        if spec.params.insert(key.clone(), value.clone()).is_some() {
            warn!(param = %key, "vendor override replaces computed request parameter");
        }
    }
    if let Some(min_resolution) = overrides.min_resolution {
        spec.min_resolution = Some(min_resolution);
    }
    if let Some(max_resolution) = overrides.max_resolution {
        spec.max_resolution = Some(max_resolution);
    }
    if let Some(opacity) = overrides.opacity {
        spec.opacity = opacity;
    }
    spec
}
