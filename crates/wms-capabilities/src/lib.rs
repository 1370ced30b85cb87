//! WMS GetCapabilities discovery: URL construction, remote fetch, and a
//! minimal capability-document reader.
//!
//! The full GetCapabilities grammar is not reproduced here; the reader
//! extracts only what the layer engine consumes per advertised layer:
//! name, title, version, and extent.

pub mod fetch;
pub mod model;
pub mod parser;

pub use fetch::{append_query, get_capabilities_url, HttpFetch, RemoteFetch};
pub use model::{CapabilityLayer, CapabilityModel};
pub use parser::{CapabilitiesParser, XmlCapabilitiesReader};
