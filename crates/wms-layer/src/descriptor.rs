//! Layer descriptors and request parameter normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::VendorOverrides;

/// Identifies a remote WMS layer and how to materialize it.
///
/// A descriptor without a `name` resolves to the full collection of layers
/// the server advertises, one child descriptor per advertised layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Service base URL.
    pub url: String,

    /// Layer name; `None` means "expand all advertised layers".
    #[serde(default)]
    pub name: Option<String>,

    /// WMS protocol version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Tiled (true) or single-image (false) source.
    #[serde(default = "default_true")]
    pub tiled: bool,

    /// Transparent layers overlay; non-transparent layers act as base layers.
    #[serde(default)]
    pub transparent: bool,

    /// User-supplied request parameters. When present they are passed
    /// through verbatim (keys upper-cased) and no defaults are injected.
    #[serde(default)]
    pub custom_params: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub min_resolution: Option<f64>,

    #[serde(default)]
    pub max_resolution: Option<f64>,

    #[serde(default = "default_opacity")]
    pub opacity: f64,

    #[serde(default = "default_true")]
    pub visibility: bool,

    #[serde(default)]
    pub animated: bool,

    #[serde(default = "default_true")]
    pub queryable: bool,

    #[serde(default = "default_num_zoom_levels")]
    pub num_zoom_levels: u32,

    #[serde(default)]
    pub legend_url: Option<String>,

    /// Embedder overrides merged into the computed source spec.
    #[serde(default)]
    pub vendor: VendorOverrides,
}

fn default_version() -> String {
    "1.3.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

fn default_num_zoom_levels() -> u32 {
    16
}

impl LayerDescriptor {
    /// Descriptor for a single named layer.
    pub fn single(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::all_layers(url)
        }
    }

    /// Descriptor that expands into every layer the server advertises.
    pub fn all_layers(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            version: default_version(),
            tiled: true,
            transparent: false,
            custom_params: None,
            min_resolution: None,
            max_resolution: None,
            opacity: default_opacity(),
            visibility: true,
            animated: false,
            queryable: true,
            num_zoom_levels: default_num_zoom_levels(),
            legend_url: None,
            vendor: VendorOverrides::default(),
        }
    }

    /// Child descriptor for one advertised layer, inheriting `url` and
    /// `tiled` from the parent with a per-child version.
    pub fn child(&self, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: version.into(),
            custom_params: None,
            legend_url: None,
            ..self.clone()
        }
    }

    /// Effective request parameters for this layer.
    ///
    /// Custom parameters pass through verbatim with upper-cased keys and no
    /// injected defaults; otherwise the standard WMS parameter set is
    /// synthesized.
    pub fn request_params(&self, default_format: &str) -> BTreeMap<String, String> {
        match &self.custom_params {
            Some(custom) => custom
                .iter()
                .map(|(key, value)| (key.to_uppercase(), value.clone()))
                .collect(),
            None => {
                let mut params = BTreeMap::new();
                params.insert(
                    "LAYERS".to_string(),
                    self.name.clone().unwrap_or_default(),
                );
                params.insert("TILED".to_string(), "true".to_string());
                params.insert("VERSION".to_string(), self.version.clone());
                params.insert("TRANSPARENT".to_string(), self.transparent.to_string());
                params.insert("FORMAT".to_string(), default_format.to_string());
                params
            }
        }
    }
}
