//! Rich geometry values and the geometry registry.
//!
//! A `Geometry` owns a backing `Shape` plus an optional projection and a
//! lazily computed bounds. Construction from plain configuration objects
//! goes through the process-wide geometry registry: untyped coordinate
//! arrays dispatch on nesting depth ([x,y] is a point, [[x,y],..] a line
//! string, [[[x,y],..],..] a polygon); multi kinds and collections require
//! an explicit "type" member. Registration order is Point, LineString,
//! Polygon, MultiPoint, MultiLineString, MultiPolygon, GeometryCollection.

use std::sync::{OnceLock, RwLock};

use lazy_static::lazy_static;
use serde_json::Value as Json;

use geostore_driver::{Bounds, Coord, GeometryKind, Shape};

use crate::registry::{Entry, TypeRegistry};
use crate::{Error, Projection};

/// A geometry value: a shape, an optional projection, and cached bounds.
#[derive(Clone, Debug)]
pub struct Geometry {
    shape: Shape,
    projection: Option<Projection>,
    bounds: OnceLock<Option<Bounds>>,
}

impl Geometry {
    pub fn from_shape(shape: Shape) -> Self {
        Geometry {
            shape,
            projection: None,
            bounds: OnceLock::new(),
        }
    }

    pub fn point(coord: impl Into<Coord>) -> Self {
        Geometry::from_shape(Shape::Point(coord.into()))
    }

    pub fn line_string(coords: Vec<Coord>) -> Self {
        Geometry::from_shape(Shape::LineString(coords))
    }

    pub fn polygon(rings: Vec<Vec<Coord>>) -> Self {
        Geometry::from_shape(Shape::Polygon(rings))
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn kind(&self) -> GeometryKind {
        self.shape.kind()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn into_shape(self) -> Shape {
        self.shape
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = Some(projection);
    }

    /// The bounding rectangle, computed once and memoized.
    pub fn bounds(&self) -> Option<Bounds> {
        *self.bounds.get_or_init(|| self.shape.bounds())
    }

    /// Shape equality, ignoring projection.
    pub fn equals(&self, other: &Geometry) -> bool {
        self.shape == other.shape
    }
}

impl PartialEq for Geometry {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.projection == other.projection
    }
}

impl From<Shape> for Geometry {
    fn from(shape: Shape) -> Self {
        Geometry::from_shape(shape)
    }
}

type GeometryRegistry = TypeRegistry<Json, Shape, Geometry>;

lazy_static! {
    static ref REGISTRY: RwLock<GeometryRegistry> = RwLock::new(seeded_registry());
}

/// Construct a geometry from a configuration object.
pub fn create(config: &Json) -> Result<Geometry, Error> {
    let registry = REGISTRY.read().expect("geometry registry poisoned");
    registry.create(config)
}

/// Lift a bare shape into a geometry through the registry.
pub fn from_shape_handle(shape: Shape) -> Result<Geometry, Error> {
    let registry = REGISTRY.read().expect("geometry registry poisoned");
    registry.create_from_handle(shape)
}

/// Append a geometry registration. Registrations are append-only; dispatch
/// stays in registration order.
pub fn register(entry: Entry<Json, Shape, Geometry>) {
    let mut registry = REGISTRY.write().expect("geometry registry poisoned");
    registry.register(entry);
}

// === config parsing helpers ===

fn type_tag(config: &Json) -> Option<&str> {
    config.get("type").and_then(Json::as_str)
}

fn coords_member(config: &Json) -> &Json {
    config.get("coordinates").unwrap_or(config)
}

fn is_position(v: &Json) -> bool {
    v.as_array()
        .map(|a| a.len() >= 2 && a.iter().all(Json::is_number))
        .unwrap_or(false)
}

fn is_position_list(v: &Json) -> bool {
    v.as_array()
        .map(|a| !a.is_empty() && a.iter().all(is_position))
        .unwrap_or(false)
}

fn is_ring_list(v: &Json) -> bool {
    v.as_array()
        .map(|a| !a.is_empty() && a.iter().all(is_position_list))
        .unwrap_or(false)
}

fn parse_position(v: &Json) -> Result<Coord, Error> {
    let arr = v
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| Error::invalid(format!("expected a coordinate, got {}", v)))?;
    let num = |i: usize| -> Result<f64, Error> {
        arr[i]
            .as_f64()
            .ok_or_else(|| Error::invalid(format!("non-numeric coordinate member: {}", arr[i])))
    };
    Ok(Coord {
        x: num(0)?,
        y: num(1)?,
        z: if arr.len() > 2 { Some(num(2)?) } else { None },
    })
}

fn parse_positions(v: &Json) -> Result<Vec<Coord>, Error> {
    v.as_array()
        .ok_or_else(|| Error::invalid(format!("expected a coordinate list, got {}", v)))?
        .iter()
        .map(parse_position)
        .collect()
}

fn parse_rings(v: &Json) -> Result<Vec<Vec<Coord>>, Error> {
    v.as_array()
        .ok_or_else(|| Error::invalid(format!("expected a ring list, got {}", v)))?
        .iter()
        .map(parse_positions)
        .collect()
}

/// Parse a collection member to a shape without going back through the
/// registry lock.
fn member_shape(config: &Json) -> Result<Shape, Error> {
    match type_tag(config) {
        Some("Point") => Ok(Shape::Point(parse_position(coords_member(config))?)),
        Some("LineString") => Ok(Shape::LineString(parse_positions(coords_member(config))?)),
        Some("Polygon") => Ok(Shape::Polygon(parse_rings(coords_member(config))?)),
        Some("MultiPoint") => Ok(Shape::MultiPoint(parse_positions(coords_member(config))?)),
        Some("MultiLineString") => {
            Ok(Shape::MultiLineString(parse_rings(coords_member(config))?))
        }
        Some("MultiPolygon") => {
            let polys = coords_member(config)
                .as_array()
                .ok_or_else(|| Error::invalid("MultiPolygon needs a coordinates array"))?
                .iter()
                .map(parse_rings)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Shape::MultiPolygon(polys))
        }
        Some("GeometryCollection") => {
            let members = config
                .get("geometries")
                .and_then(Json::as_array)
                .ok_or_else(|| Error::invalid("GeometryCollection needs a geometries array"))?;
            let shapes = members
                .iter()
                .map(member_shape)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Shape::GeometryCollection(shapes))
        }
        Some(other) => Err(Error::resolution(format!(
            "unknown geometry type '{}'",
            other
        ))),
        None => {
            let coords = coords_member(config);
            if is_position(coords) {
                Ok(Shape::Point(parse_position(coords)?))
            } else if is_position_list(coords) {
                Ok(Shape::LineString(parse_positions(coords)?))
            } else if is_ring_list(coords) {
                Ok(Shape::Polygon(parse_rings(coords)?))
            } else {
                Err(Error::resolution(format!(
                    "collection member is not a geometry: {}",
                    config
                )))
            }
        }
    }
}

fn with_config_projection(mut geometry: Geometry, config: &Json) -> Geometry {
    if let Some(id) = config.get("projection").and_then(Json::as_str) {
        geometry.set_projection(Projection::new(id));
    }
    geometry
}

fn seeded_registry() -> GeometryRegistry {
    let mut registry = GeometryRegistry::new();

    registry.register(
        Entry::new(
            "Point",
            |config: &Json| match type_tag(config) {
                Some(tag) => tag == "Point",
                None => is_position(coords_member(config)),
            },
            |config| {
                let coord = parse_position(coords_member(config))?;
                Ok(with_config_projection(Geometry::point(coord), config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::Point,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry.register(
        Entry::new(
            "LineString",
            |config: &Json| match type_tag(config) {
                Some(tag) => tag == "LineString",
                None => is_position_list(coords_member(config)),
            },
            |config| {
                let coords = parse_positions(coords_member(config))?;
                Ok(with_config_projection(Geometry::line_string(coords), config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::LineString,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry.register(
        Entry::new(
            "Polygon",
            |config: &Json| match type_tag(config) {
                Some(tag) => tag == "Polygon",
                None => is_ring_list(coords_member(config)),
            },
            |config| {
                let rings = parse_rings(coords_member(config))?;
                Ok(with_config_projection(Geometry::polygon(rings), config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::Polygon,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry.register(
        Entry::new(
            "MultiPoint",
            |config: &Json| type_tag(config) == Some("MultiPoint"),
            |config| {
                let coords = parse_positions(coords_member(config))?;
                let geometry = Geometry::from_shape(Shape::MultiPoint(coords));
                Ok(with_config_projection(geometry, config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::MultiPoint,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry.register(
        Entry::new(
            "MultiLineString",
            |config: &Json| type_tag(config) == Some("MultiLineString"),
            |config| {
                let lines = parse_rings(coords_member(config))?;
                let geometry = Geometry::from_shape(Shape::MultiLineString(lines));
                Ok(with_config_projection(geometry, config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::MultiLineString,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry.register(
        Entry::new(
            "MultiPolygon",
            |config: &Json| type_tag(config) == Some("MultiPolygon"),
            |config| {
                let polys = coords_member(config)
                    .as_array()
                    .ok_or_else(|| Error::invalid("MultiPolygon needs a coordinates array"))?
                    .iter()
                    .map(parse_rings)
                    .collect::<Result<Vec<_>, _>>()?;
                let geometry = Geometry::from_shape(Shape::MultiPolygon(polys));
                Ok(with_config_projection(geometry, config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::MultiPolygon,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry.register(
        Entry::new(
            "GeometryCollection",
            |config: &Json| type_tag(config) == Some("GeometryCollection"),
            |config| {
                let members = config
                    .get("geometries")
                    .and_then(Json::as_array)
                    .ok_or_else(|| Error::invalid("GeometryCollection needs a geometries array"))?;
                let shapes = members
                    .iter()
                    .map(member_shape)
                    .collect::<Result<Vec<_>, _>>()?;
                let geometry = Geometry::from_shape(Shape::GeometryCollection(shapes));
                Ok(with_config_projection(geometry, config))
            },
        )
        .wrapping(
            |shape: &Shape| shape.kind() == GeometryKind::GeometryCollection,
            |shape| Ok(Geometry::from_shape(shape)),
        ),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untyped_arrays_dispatch_on_depth() {
        let point = create(&json!([0.0, 1.0])).unwrap();
        assert_eq!(point.kind(), GeometryKind::Point);

        let line = create(&json!([[0.0, 0.0], [1.0, 1.0]])).unwrap();
        assert_eq!(line.kind(), GeometryKind::LineString);

        let poly = create(&json!([[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 0.0]]])).unwrap();
        assert_eq!(poly.kind(), GeometryKind::Polygon);
    }

    #[test]
    fn untyped_predicates_are_mutually_exclusive() {
        // No nesting depth satisfies more than one untyped predicate.
        let depth1 = json!([0.0, 1.0]);
        let depth2 = json!([[0.0, 1.0]]);
        let depth3 = json!([[[0.0, 1.0]]]);
        assert!(is_position(&depth1) && !is_position_list(&depth1) && !is_ring_list(&depth1));
        assert!(!is_position(&depth2) && is_position_list(&depth2) && !is_ring_list(&depth2));
        assert!(!is_position(&depth3) && !is_position_list(&depth3) && is_ring_list(&depth3));
    }

    #[test]
    fn typed_configs_override_depth_dispatch() {
        // A MultiPoint has the same nesting as a LineString; the type tag
        // decides.
        let multi = create(&json!({
            "type": "MultiPoint",
            "coordinates": [[0.0, 0.0], [1.0, 1.0]]
        }))
        .unwrap();
        assert_eq!(multi.kind(), GeometryKind::MultiPoint);
    }

    #[test]
    fn projection_member_is_applied() {
        let point = create(&json!({
            "type": "Point",
            "coordinates": [0.0, 1.0],
            "projection": "EPSG:4326"
        }))
        .unwrap();
        assert_eq!(point.projection().unwrap().id(), "EPSG:4326");
    }

    #[test]
    fn collection_members_parse_recursively() {
        let collection = create(&json!({
            "type": "GeometryCollection",
            "geometries": [
                [0.0, 1.0],
                {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}
            ]
        }))
        .unwrap();
        assert_eq!(collection.kind(), GeometryKind::GeometryCollection);
    }

    #[test]
    fn unresolvable_config_is_a_resolution_error() {
        let err = create(&json!({"type": "Hypercube"})).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
        let err = create(&json!("not a geometry")).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn shape_handles_lift_to_geometries() {
        let shape = Shape::Point(Coord::new(2.0, 3.0));
        let geometry = from_shape_handle(shape.clone()).unwrap();
        assert_eq!(geometry.shape(), &shape);
    }

    #[test]
    fn bounds_are_memoized() {
        let geometry = Geometry::line_string(vec![Coord::new(0.0, 0.0), Coord::new(2.0, 3.0)]);
        let first = geometry.bounds().unwrap();
        let second = geometry.bounds().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Bounds::new(0.0, 0.0, 2.0, 3.0));
    }

    #[test]
    fn equals_ignores_projection() {
        let a = Geometry::point((0.0, 1.0)).with_projection(Projection::new("EPSG:4326"));
        let b = Geometry::point((0.0, 1.0));
        assert!(a.equals(&b));
        assert_ne!(a, b);
    }
}
