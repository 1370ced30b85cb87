//! Validated resolution lists for tiled sources.

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};

/// An ordered list of rendering resolutions, coarsest first.
///
/// Tile grids index zoom levels by position in this list, so the order is
/// part of the contract: strictly decreasing, positive, finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionList(Vec<f64>);

impl ResolutionList {
    /// Validate and wrap a raw resolution list.
    pub fn new(resolutions: Vec<f64>) -> LayerResult<Self> {
        if resolutions.is_empty() {
            return Err(LayerError::InvalidResolutionList(
                "resolution list is empty".to_string(),
            ));
        }
        for value in &resolutions {
            if !value.is_finite() || *value <= 0.0 {
                return Err(LayerError::InvalidResolutionList(format!(
                    "resolution {} is not a positive finite number",
                    value
                )));
            }
        }
        for pair in resolutions.windows(2) {
            if pair[1] >= pair[0] {
                return Err(LayerError::InvalidResolutionList(format!(
                    "resolutions must strictly decrease, got {} before {}",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(Self(resolutions))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Coarsest (largest) resolution.
    pub fn coarsest(&self) -> f64 {
        self.0[0]
    }

    /// Finest (smallest) resolution.
    pub fn finest(&self) -> f64 {
        self.0[self.0.len() - 1]
    }
}

impl TryFrom<Vec<f64>> for ResolutionList {
    type Error = LayerError;

    fn try_from(resolutions: Vec<f64>) -> LayerResult<Self> {
        ResolutionList::new(resolutions)
    }
}
