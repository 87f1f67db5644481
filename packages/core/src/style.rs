//! Rendering hints for layers.
//!
//! Styles are plain value objects: an ordered list of symbolizer parts.
//! They carry no rendering logic; renderers downstream interpret them.

use std::sync::RwLock;

use lazy_static::lazy_static;
use serde_json::Value as Json;

use crate::registry::{Entry, TypeRegistry};
use crate::Error;

/// One drawing instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Symbolizer {
    /// Interior paint for polygons.
    Fill { color: String, opacity: f64 },
    /// Outline paint for lines and polygon borders.
    Stroke {
        color: String,
        width: f64,
        opacity: f64,
    },
    /// A well-known mark drawn at point locations.
    Shape {
        name: String,
        size: f64,
        color: String,
    },
    /// A text label sourced from a feature field.
    Label {
        property: String,
        font: Option<String>,
    },
}

impl Symbolizer {
    pub fn fill(color: impl Into<String>) -> Self {
        Symbolizer::Fill {
            color: color.into(),
            opacity: 1.0,
        }
    }

    pub fn stroke(color: impl Into<String>, width: f64) -> Self {
        Symbolizer::Stroke {
            color: color.into(),
            width,
            opacity: 1.0,
        }
    }

    pub fn shape(name: impl Into<String>, size: f64, color: impl Into<String>) -> Self {
        Symbolizer::Shape {
            name: name.into(),
            size,
            color: color.into(),
        }
    }

    pub fn label(property: impl Into<String>) -> Self {
        Symbolizer::Label {
            property: property.into(),
            font: None,
        }
    }
}

/// An ordered collection of symbolizers. Parts draw in order, earlier
/// parts underneath later ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Style {
    parts: Vec<Symbolizer>,
}

impl Style {
    pub fn new(parts: Vec<Symbolizer>) -> Self {
        Style { parts }
    }

    pub fn parts(&self) -> &[Symbolizer] {
        &self.parts
    }

    /// Combine two styles, this style's parts first.
    pub fn and(mut self, other: Style) -> Style {
        self.parts.extend(other.parts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl From<Symbolizer> for Style {
    fn from(part: Symbolizer) -> Style {
        Style { parts: vec![part] }
    }
}

/// The style applied when a layer has none of its own: a pale fill, a
/// dark violet hairline, and an amber circle for point layers.
pub fn default_style() -> Style {
    Style::new(vec![
        Symbolizer::fill("#FFFFEF"),
        Symbolizer::stroke("#504673", 0.5),
        Symbolizer::shape("circle", 6.0, "#FFE1A8"),
    ])
}

type StyleRegistry = TypeRegistry<Json, Style, Style>;

lazy_static! {
    static ref REGISTRY: RwLock<StyleRegistry> = RwLock::new(seeded_registry());
}

/// Construct a style from a configuration object.
pub fn create(config: &Json) -> Result<Style, Error> {
    let registry = REGISTRY.read().expect("style registry poisoned");
    registry.create(config)
}

/// Append a style registration.
pub fn register(entry: Entry<Json, Style, Style>) {
    let mut registry = REGISTRY.write().expect("style registry poisoned");
    registry.register(entry);
}

fn seeded_registry() -> StyleRegistry {
    let mut registry = StyleRegistry::new();
    // Recursion goes through symbolizers_from, never back through the
    // registry lock.
    registry.register(Entry::new(
        "parts",
        |config: &Json| config.get("parts").map_or(false, Json::is_array),
        |config| {
            let parts = config
                .get("parts")
                .and_then(Json::as_array)
                .ok_or_else(|| Error::invalid("style 'parts' must be an array"))?;
            let mut style = Style::default();
            for part in parts {
                style = style.and(symbolizers_from(part)?);
            }
            Ok(style)
        },
    ));
    registry.register(Entry::new(
        "symbolizers",
        |config: &Json| {
            config.is_object()
                && ["fill", "stroke", "shape", "label"]
                    .iter()
                    .any(|key| config.get(key).is_some())
        },
        symbolizers_from,
    ));
    registry
}

fn symbolizers_from(config: &Json) -> Result<Style, Error> {
    let mut parts = Vec::new();
    if let Some(fill) = config.get("fill") {
        parts.push(Symbolizer::Fill {
            color: require_str(fill, config, "fill")?,
            opacity: opt_f64(config, "opacity").unwrap_or(1.0),
        });
    }
    if let Some(stroke) = config.get("stroke") {
        parts.push(Symbolizer::Stroke {
            color: require_str(stroke, config, "stroke")?,
            width: opt_f64(config, "width").unwrap_or(1.0),
            opacity: opt_f64(config, "opacity").unwrap_or(1.0),
        });
    }
    if let Some(shape) = config.get("shape") {
        parts.push(Symbolizer::Shape {
            name: require_str(shape, config, "shape")?,
            size: opt_f64(config, "size").unwrap_or(6.0),
            color: config
                .get("color")
                .and_then(Json::as_str)
                .unwrap_or("#808080")
                .to_string(),
        });
    }
    if let Some(label) = config.get("label") {
        parts.push(Symbolizer::Label {
            property: require_str(label, config, "label")?,
            font: config
                .get("font")
                .and_then(Json::as_str)
                .map(str::to_string),
        });
    }
    if parts.is_empty() {
        return Err(Error::invalid(format!(
            "no symbolizer members in style config: {}",
            config
        )));
    }
    Ok(Style::new(parts))
}

fn require_str(value: &Json, config: &Json, key: &str) -> Result<String, Error> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::invalid(format!("style '{}' must be a string: {:?}", key, config)))
}

fn opt_f64(config: &Json, key: &str) -> Option<f64> {
    config.get(key).and_then(Json::as_f64)
}
