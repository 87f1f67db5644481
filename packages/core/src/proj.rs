//! Projection handles and the coordinate-reference-system seam.
//!
//! The actual CRS database and transform math live in an external library;
//! this module defines the narrow contract the rest of the system consumes,
//! plus an identity implementation used when no real provider is wired in.

use std::sync::Arc;

use geostore_driver::{Coord, Shape};

use crate::Error;

/// A resolved coordinate reference system handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    id: String,
}

impl Projection {
    pub fn new(id: impl Into<String>) -> Self {
        Projection { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for Projection {
    fn from(id: &str) -> Self {
        Projection::new(id)
    }
}

/// A coordinate transform between two projections.
pub type TransformFn = Box<dyn Fn(Coord) -> Coord + Send + Sync>;

/// The projection collaborator contract.
pub trait ProjectionLookup: Send + Sync {
    /// Resolve an identifier (for example `"EPSG:4326"`) to a handle.
    fn decode(&self, identifier: &str) -> Result<Projection, Error>;

    /// Find a coordinate transform between two projections.
    fn find_transform(&self, from: &Projection, to: &Projection) -> Result<TransformFn, Error>;

    fn equals(&self, a: &Projection, b: &Projection) -> bool {
        a.id() == b.id()
    }
}

/// Apply a transform to every coordinate of a shape.
pub fn transform_shape(shape: &Shape, transform: &TransformFn) -> Shape {
    let map_coords = |cs: &Vec<Coord>| cs.iter().map(|c| transform(*c)).collect::<Vec<_>>();
    let map_rings =
        |rings: &Vec<Vec<Coord>>| rings.iter().map(map_coords).collect::<Vec<_>>();
    match shape {
        Shape::Point(c) => Shape::Point(transform(*c)),
        Shape::LineString(cs) => Shape::LineString(map_coords(cs)),
        Shape::MultiPoint(cs) => Shape::MultiPoint(map_coords(cs)),
        Shape::Polygon(rings) => Shape::Polygon(map_rings(rings)),
        Shape::MultiLineString(rings) => Shape::MultiLineString(map_rings(rings)),
        Shape::MultiPolygon(polys) => {
            Shape::MultiPolygon(polys.iter().map(map_rings).collect())
        }
        Shape::GeometryCollection(shapes) => Shape::GeometryCollection(
            shapes.iter().map(|s| transform_shape(s, transform)).collect(),
        ),
    }
}

/// A provider that accepts any identifier and only supports identity
/// transforms. Transforming between two distinct systems is a projection
/// error until a real provider is supplied.
pub struct IdentityProjections;

impl ProjectionLookup for IdentityProjections {
    fn decode(&self, identifier: &str) -> Result<Projection, Error> {
        if identifier.is_empty() {
            return Err(Error::projection("empty projection identifier"));
        }
        Ok(Projection::new(identifier))
    }

    fn find_transform(&self, from: &Projection, to: &Projection) -> Result<TransformFn, Error> {
        if self.equals(from, to) {
            Ok(Box::new(|c| c))
        } else {
            Err(Error::projection(format!(
                "no transform available from '{}' to '{}'",
                from, to
            )))
        }
    }
}

/// Shared handle to the projection collaborator.
pub type ProjectionProvider = Arc<dyn ProjectionLookup>;

pub fn identity_provider() -> ProjectionProvider {
    Arc::new(IdentityProjections)
}
