//! Minimal GetCapabilities reader.
//!
//! Extracts the advertised layer list (name, title, extent) from WMS 1.1.1
//! and 1.3.0 capabilities documents. Everything else in the document is
//! skipped; requestable layers are those carrying a `<Name>` element.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;
use wms_common::{BoundingBox, LayerError, LayerResult};

use crate::model::{CapabilityLayer, CapabilityModel};

/// Parses a capabilities document into a [`CapabilityModel`].
pub trait CapabilitiesParser: Send + Sync {
    fn parse(
        &self,
        document: &str,
        service_url: &str,
        projection: &str,
        requested_version: &str,
    ) -> LayerResult<CapabilityModel>;
}

/// Default reader over `quick-xml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlCapabilitiesReader;

#[derive(Default)]
struct LayerBuilder {
    name: Option<String>,
    title: Option<String>,
    order: Option<usize>,
    west: Option<f64>,
    south: Option<f64>,
    east: Option<f64>,
    north: Option<f64>,
    attr_bbox: Option<BoundingBox>,
}

impl LayerBuilder {
    fn finish(self, version: &str) -> Option<(usize, CapabilityLayer)> {
        let name = self.name?;
        // EX_GeographicBoundingBox wins over attribute-form boxes.
        let extent = match (self.west, self.south, self.east, self.north) {
            (Some(w), Some(s), Some(e), Some(n)) => Some(BoundingBox::new(w, s, e, n)),
            _ => self.attr_bbox,
        };
        Some((
            self.order.unwrap_or(usize::MAX),
            CapabilityLayer {
                title: self.title.unwrap_or_else(|| name.clone()),
                name,
                version: version.to_string(),
                extent,
            },
        ))
    }
}

fn attr_f64(e: &BytesStart<'_>, key: &[u8]) -> Option<f64> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref() == key {
            String::from_utf8_lossy(&attr.value).parse().ok()
        } else {
            None
        }
    })
}

fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref() == key {
            Some(String::from_utf8_lossy(&attr.value).into_owned())
        } else {
            None
        }
    })
}

fn capture_attr_bbox(builder: &mut LayerBuilder, e: &BytesStart<'_>) {
    if builder.attr_bbox.is_some() {
        return;
    }
    if let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (
        attr_f64(e, b"minx"),
        attr_f64(e, b"miny"),
        attr_f64(e, b"maxx"),
        attr_f64(e, b"maxy"),
    ) {
        builder.attr_bbox = Some(BoundingBox::new(min_x, min_y, max_x, max_y));
    }
}

impl CapabilitiesParser for XmlCapabilitiesReader {
    fn parse(
        &self,
        document: &str,
        service_url: &str,
        projection: &str,
        requested_version: &str,
    ) -> LayerResult<CapabilityModel> {
        let mut reader = Reader::from_str(document);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut stack: Vec<LayerBuilder> = Vec::new();
        let mut finished: Vec<(usize, CapabilityLayer)> = Vec::new();
        let mut doc_version: Option<String> = None;
        let mut root_seen = false;
        let mut order_counter = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    match element.as_str() {
                        "WMS_Capabilities" | "WMT_MS_Capabilities" => {
                            root_seen = true;
                            doc_version = attr_string(&e, b"version");
                        }
                        "Layer" => stack.push(LayerBuilder::default()),
                        "LatLonBoundingBox" | "BoundingBox" => {
                            if let Some(builder) = stack.last_mut() {
                                capture_attr_bbox(builder, &e);
                            }
                        }
                        _ => {}
                    }
                    path.push(element);
                }
                Ok(Event::Empty(e)) => {
                    let element = e.name();
                    if matches!(element.as_ref(), b"LatLonBoundingBox" | b"BoundingBox") {
                        if let Some(builder) = stack.last_mut() {
                            capture_attr_bbox(builder, &e);
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| LayerError::MalformedCapabilities(e.to_string()))?;
                    let current = path.last().map(String::as_str);
                    let parent = path
                        .len()
                        .checked_sub(2)
                        .and_then(|i| path.get(i))
                        .map(String::as_str);

                    if let Some(builder) = stack.last_mut() {
                        match (parent, current) {
                            (Some("Layer"), Some("Name")) => {
                                if builder.name.is_none() {
                                    builder.name = Some(text.into_owned());
                                    builder.order = Some(order_counter);
                                    order_counter += 1;
                                }
                            }
                            (Some("Layer"), Some("Title")) => {
                                builder.title = Some(text.into_owned());
                            }
                            (Some("EX_GeographicBoundingBox"), Some(edge)) => {
                                let value = text.parse::<f64>().ok();
                                match edge {
                                    "westBoundLongitude" => builder.west = value,
                                    "eastBoundLongitude" => builder.east = value,
                                    "southBoundLatitude" => builder.south = value,
                                    "northBoundLatitude" => builder.north = value,
                                    _ => {}
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    path.pop();
                    if e.name().as_ref() == b"Layer" {
                        if let Some(builder) = stack.pop() {
                            let version = doc_version.as_deref().unwrap_or(requested_version);
                            if let Some(entry) = builder.finish(version) {
                                finished.push(entry);
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(LayerError::MalformedCapabilities(format!(
                        "XML error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        if !root_seen {
            return Err(LayerError::MalformedCapabilities(
                "document has no WMS capabilities root element".to_string(),
            ));
        }

        // Layers finish inner-first; restore advertisement order.
        finished.sort_by_key(|(order, _)| *order);
        let layers: Vec<CapabilityLayer> = finished.into_iter().map(|(_, layer)| layer).collect();

        let version = doc_version.unwrap_or_else(|| requested_version.to_string());
        debug!(
            url = %service_url,
            version = %version,
            layers = layers.len(),
            "parsed capabilities document"
        );

        Ok(CapabilityModel::new(service_url, version, projection, layers))
    }
}
