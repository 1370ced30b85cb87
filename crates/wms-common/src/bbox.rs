//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic or projected bounding box.
///
/// For geographic CRS (EPSG:4326), coordinates are in degrees.
/// For projected CRS (EPSG:3857, etc.), coordinates are in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// The bottom-left corner, used as the tile grid origin.
    pub fn bottom_left(&self) -> (f64, f64) {
        (self.min_x, self.min_y)
    }

    /// True when both axes span a positive, finite range.
    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.max_x > self.min_x
            && self.max_y > self.min_y
    }

    /// Smallest bounding box enclosing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Coordinates as a `[xmin, ymin, xmax, ymax]` array.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(corners: [f64; 4]) -> Self {
        BoundingBox::new(corners[0], corners[1], corners[2], corners[3])
    }
}

/// A maximum extent as declared on a host map.
///
/// Embedders configure extents either as a corner array or as per-axis
/// ranges; both normalize to `[xmin, ymin, xmax, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxExtent {
    /// `[xmin, ymin, xmax, ymax]`
    Corners([f64; 4]),
    /// `{x: {min, max}, y: {min, max}}`
    Ranges { x: AxisRange, y: AxisRange },
}

/// A closed interval on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl MaxExtent {
    /// Normalize either form to a bounding box.
    pub fn normalize(&self) -> BoundingBox {
        match *self {
            MaxExtent::Corners(corners) => BoundingBox::from(corners),
            MaxExtent::Ranges { x, y } => BoundingBox::new(x.min, y.min, x.max, y.max),
        }
    }
}

impl From<BoundingBox> for MaxExtent {
    fn from(bbox: BoundingBox) -> Self {
        MaxExtent::Corners(bbox.to_array())
    }
}
