//! Common types shared across the WMS layer engine crates.

pub mod bbox;
pub mod error;
pub mod resolution;

pub use bbox::{BoundingBox, MaxExtent};
pub use error::{LayerError, LayerResult};
pub use resolution::ResolutionList;
