//! Mapping between driver values and GeoJSON members.
//!
//! Coercion is schema-driven: the file's schema descriptor names the
//! kind each property is read back as, so numbers and temporal strings
//! round-trip without guessing.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value as Json};

use geostore_driver::{Coord, FieldKind, Shape, StoreError, Value};

fn position(coord: &Coord) -> Json {
    match coord.z {
        Some(z) => json!([coord.x, coord.y, z]),
        None => json!([coord.x, coord.y]),
    }
}

fn positions(coords: &[Coord]) -> Json {
    Json::Array(coords.iter().map(position).collect())
}

fn rings(rings: &[Vec<Coord>]) -> Json {
    Json::Array(rings.iter().map(|r| positions(r)).collect())
}

/// Encode a shape as a GeoJSON geometry object.
pub fn shape_to_geojson(shape: &Shape) -> Json {
    let type_name = shape.kind().name();
    match shape {
        Shape::Point(c) => json!({"type": type_name, "coordinates": position(c)}),
        Shape::LineString(cs) | Shape::MultiPoint(cs) => {
            json!({"type": type_name, "coordinates": positions(cs)})
        }
        Shape::Polygon(rs) | Shape::MultiLineString(rs) => {
            json!({"type": type_name, "coordinates": rings(rs)})
        }
        Shape::MultiPolygon(polys) => json!({
            "type": type_name,
            "coordinates": Json::Array(polys.iter().map(|p| rings(p)).collect()),
        }),
        Shape::GeometryCollection(shapes) => json!({
            "type": type_name,
            "geometries": Json::Array(shapes.iter().map(shape_to_geojson).collect()),
        }),
    }
}

fn coord_from(member: &Json) -> Result<Coord, StoreError> {
    let parts = member
        .as_array()
        .ok_or_else(|| StoreError::corrupt("GeoJSON position is not an array"))?;
    let axis = |i: usize| -> Result<f64, StoreError> {
        parts
            .get(i)
            .and_then(Json::as_f64)
            .ok_or_else(|| StoreError::corrupt("GeoJSON position axis is not a number"))
    };
    let mut coord = Coord::new(axis(0)?, axis(1)?);
    if parts.len() > 2 {
        coord.z = Some(axis(2)?);
    }
    Ok(coord)
}

fn coords_from(member: &Json) -> Result<Vec<Coord>, StoreError> {
    member
        .as_array()
        .ok_or_else(|| StoreError::corrupt("GeoJSON coordinates are not an array"))?
        .iter()
        .map(coord_from)
        .collect()
}

fn rings_from(member: &Json) -> Result<Vec<Vec<Coord>>, StoreError> {
    member
        .as_array()
        .ok_or_else(|| StoreError::corrupt("GeoJSON coordinates are not an array"))?
        .iter()
        .map(coords_from)
        .collect()
}

/// Decode a GeoJSON geometry object into a shape.
pub fn shape_from_geojson(member: &Json) -> Result<Shape, StoreError> {
    let type_name = member
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| StoreError::corrupt("GeoJSON geometry has no 'type'"))?;
    if type_name == "GeometryCollection" {
        let shapes = member
            .get("geometries")
            .and_then(Json::as_array)
            .ok_or_else(|| StoreError::corrupt("GeometryCollection has no 'geometries'"))?
            .iter()
            .map(shape_from_geojson)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Shape::GeometryCollection(shapes));
    }
    let coordinates = member
        .get("coordinates")
        .ok_or_else(|| StoreError::corrupt("GeoJSON geometry has no 'coordinates'"))?;
    match type_name {
        "Point" => Ok(Shape::Point(coord_from(coordinates)?)),
        "LineString" => Ok(Shape::LineString(coords_from(coordinates)?)),
        "MultiPoint" => Ok(Shape::MultiPoint(coords_from(coordinates)?)),
        "Polygon" => Ok(Shape::Polygon(rings_from(coordinates)?)),
        "MultiLineString" => Ok(Shape::MultiLineString(rings_from(coordinates)?)),
        "MultiPolygon" => {
            let polys = coordinates
                .as_array()
                .ok_or_else(|| StoreError::corrupt("GeoJSON coordinates are not an array"))?
                .iter()
                .map(rings_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Shape::MultiPolygon(polys))
        }
        other => Err(StoreError::corrupt(format!(
            "unknown GeoJSON geometry type '{}'",
            other
        ))),
    }
}

/// Encode a driver value as a GeoJSON property member.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Double(d) => json!(d),
        Value::String(s) => json!(s),
        Value::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
        Value::Datetime(dt) => json!(dt.to_rfc3339()),
        Value::Geometry(shape) => shape_to_geojson(shape),
    }
}

/// Decode a property member into the value the field's kind calls for.
pub fn value_from_json(member: &Json, kind: FieldKind) -> Result<Value, StoreError> {
    if member.is_null() {
        return Ok(Value::Null);
    }
    if kind.is_geometry() {
        return Ok(Value::Geometry(shape_from_geojson(member)?));
    }
    match kind {
        FieldKind::String => member
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| corrupt_kind(member, kind)),
        FieldKind::Integer | FieldKind::Long | FieldKind::Short => member
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| corrupt_kind(member, kind)),
        FieldKind::Float | FieldKind::Double => member
            .as_f64()
            .map(Value::Double)
            .ok_or_else(|| corrupt_kind(member, kind)),
        FieldKind::Boolean => member
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| corrupt_kind(member, kind)),
        FieldKind::Date => {
            let text = member.as_str().ok_or_else(|| corrupt_kind(member, kind))?;
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| StoreError::corrupt(format!("bad date '{}': {}", text, e)))
        }
        FieldKind::Datetime => {
            let text = member.as_str().ok_or_else(|| corrupt_kind(member, kind))?;
            DateTime::parse_from_rfc3339(text)
                .map(|dt| Value::Datetime(dt.with_timezone(&Utc)))
                .map_err(|e| StoreError::corrupt(format!("bad datetime '{}': {}", text, e)))
        }
        // geometry kinds handled above
        _ => Err(corrupt_kind(member, kind)),
    }
}

fn corrupt_kind(member: &Json, kind: FieldKind) -> StoreError {
    StoreError::corrupt(format!("property {:?} does not decode as {}", member, kind))
}
