//! Geometry shapes - the backing representation of spatial values.
//!
//! These are plain coordinate structures. Spatial algorithms (buffer,
//! intersection, simplify) are the business of an external computational
//! geometry library consumed through an adapter in the core layer; the
//! driver layer only needs to store shapes and compute their bounds.

use serde::{Deserialize, Serialize};

use crate::Bounds;

/// A single coordinate. `z` is optional; most data is planar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub z: Option<f64>,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Coord { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Coord { x, y, z: Some(z) }
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Coord::new(x, y)
    }
}

impl From<(f64, f64, f64)> for Coord {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Coord::with_z(x, y, z)
    }
}

/// The fixed set of geometry kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// The canonical name, matching GeoJSON type tags.
    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A geometry shape.
///
/// Polygons are rings: the first ring is the exterior, the rest are holes.
/// No validity checking is performed here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Shape>),
}

impl Shape {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Shape::Point(_) => GeometryKind::Point,
            Shape::LineString(_) => GeometryKind::LineString,
            Shape::Polygon(_) => GeometryKind::Polygon,
            Shape::MultiPoint(_) => GeometryKind::MultiPoint,
            Shape::MultiLineString(_) => GeometryKind::MultiLineString,
            Shape::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Shape::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }

    /// The bounding rectangle of this shape, or `None` for an empty shape.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        self.each_coord(&mut |c| match bounds.as_mut() {
            Some(b) => b.expand(c.x, c.y),
            None => bounds = Some(Bounds::point(c.x, c.y)),
        });
        bounds
    }

    /// Visit every coordinate in the shape.
    pub fn each_coord(&self, f: &mut dyn FnMut(&Coord)) {
        match self {
            Shape::Point(c) => f(c),
            Shape::LineString(cs) | Shape::MultiPoint(cs) => {
                cs.iter().for_each(|c| f(c));
            }
            Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
                for ring in rings {
                    ring.iter().for_each(|c| f(c));
                }
            }
            Shape::MultiPolygon(polys) => {
                for rings in polys {
                    for ring in rings {
                        ring.iter().for_each(|c| f(c));
                    }
                }
            }
            Shape::GeometryCollection(shapes) => {
                for shape in shapes {
                    shape.each_coord(f);
                }
            }
        }
    }
}
