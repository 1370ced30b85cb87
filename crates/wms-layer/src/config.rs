//! Engine configuration, injected at layer construction.

use std::time::Duration;

/// Configuration shared by every layer built against one engine context.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Image format requested when the descriptor carries no custom params.
    pub default_format: String,

    /// Base z-index for WMS stacking; expanded children are assigned
    /// `base + 1 ..= base + n` in registration order.
    pub base_z_index: i32,

    /// Zoom level count reported for layers that do not set their own.
    pub default_num_zoom_levels: u32,

    /// Theme-level placeholder legend URL. A layer whose legend still points
    /// here gets a GetLegendGraphic URL derived from its own service.
    pub default_legend_url: Option<String>,

    /// Optional deadline for envelope computation during extent resolution.
    /// `None` preserves the wait-forever behavior; when set, expiry surfaces
    /// as `LayerError::ExtentUnavailable`.
    pub extent_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_format: "image/png".to_string(),
            base_z_index: 1000,
            default_num_zoom_levels: 16,
            default_legend_url: None,
            extent_timeout: None,
        }
    }
}
