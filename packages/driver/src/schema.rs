//! Schema descriptors - the backing representation of feature schemas.
//!
//! Drivers persist and exchange these plain descriptors. The core layer
//! wraps them in richer `Schema`/`Field` types.

use serde::{Deserialize, Serialize};

use crate::{GeometryKind, Value};

/// The fixed registry of field kinds: scalar, temporal, and geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Integer,
    Long,
    Short,
    Float,
    Double,
    Boolean,
    Date,
    Datetime,
    /// Any geometry kind.
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl FieldKind {
    /// Resolve a kind from its canonical name.
    pub fn parse(name: &str) -> Option<FieldKind> {
        Some(match name {
            "String" => FieldKind::String,
            "Integer" => FieldKind::Integer,
            "Long" => FieldKind::Long,
            "Short" => FieldKind::Short,
            "Float" => FieldKind::Float,
            "Double" => FieldKind::Double,
            "Boolean" => FieldKind::Boolean,
            "Date" => FieldKind::Date,
            "Datetime" => FieldKind::Datetime,
            "Geometry" => FieldKind::Geometry,
            "Point" => FieldKind::Point,
            "LineString" => FieldKind::LineString,
            "Polygon" => FieldKind::Polygon,
            "MultiPoint" => FieldKind::MultiPoint,
            "MultiLineString" => FieldKind::MultiLineString,
            "MultiPolygon" => FieldKind::MultiPolygon,
            "GeometryCollection" => FieldKind::GeometryCollection,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Integer => "Integer",
            FieldKind::Long => "Long",
            FieldKind::Short => "Short",
            FieldKind::Float => "Float",
            FieldKind::Double => "Double",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::Datetime => "Datetime",
            FieldKind::Geometry => "Geometry",
            FieldKind::Point => "Point",
            FieldKind::LineString => "LineString",
            FieldKind::Polygon => "Polygon",
            FieldKind::MultiPoint => "MultiPoint",
            FieldKind::MultiLineString => "MultiLineString",
            FieldKind::MultiPolygon => "MultiPolygon",
            FieldKind::GeometryCollection => "GeometryCollection",
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            FieldKind::Geometry
                | FieldKind::Point
                | FieldKind::LineString
                | FieldKind::Polygon
                | FieldKind::MultiPoint
                | FieldKind::MultiLineString
                | FieldKind::MultiPolygon
                | FieldKind::GeometryCollection
        )
    }

    /// Whether a runtime value is acceptable for a field of this kind.
    ///
    /// `Null` is always acceptable here; nillability is enforced separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Bool(_) => *self == FieldKind::Boolean,
            Value::Int(_) => matches!(
                self,
                FieldKind::Integer | FieldKind::Long | FieldKind::Short
            ),
            Value::Double(_) => matches!(self, FieldKind::Double | FieldKind::Float),
            Value::String(_) => *self == FieldKind::String,
            Value::Date(_) => *self == FieldKind::Date,
            Value::Datetime(_) => *self == FieldKind::Datetime,
            Value::Geometry(shape) => match self {
                FieldKind::Geometry => true,
                _ => self.geometry_kind() == Some(shape.kind()),
            },
        }
    }

    /// The geometry kind for a concrete geometry field kind.
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        Some(match self {
            FieldKind::Point => GeometryKind::Point,
            FieldKind::LineString => GeometryKind::LineString,
            FieldKind::Polygon => GeometryKind::Polygon,
            FieldKind::MultiPoint => GeometryKind::MultiPoint,
            FieldKind::MultiLineString => GeometryKind::MultiLineString,
            FieldKind::MultiPolygon => GeometryKind::MultiPolygon,
            FieldKind::GeometryCollection => GeometryKind::GeometryCollection,
            _ => return None,
        })
    }

    /// Infer a kind from a runtime value, matching how untyped host values
    /// map onto the type registry (strings → String, numbers → Double).
    pub fn infer(value: &Value) -> Option<FieldKind> {
        Some(match value {
            Value::Null => return None,
            Value::Bool(_) => FieldKind::Boolean,
            Value::Int(_) => FieldKind::Integer,
            Value::Double(_) => FieldKind::Double,
            Value::String(_) => FieldKind::String,
            Value::Date(_) => FieldKind::Date,
            Value::Datetime(_) => FieldKind::Datetime,
            Value::Geometry(shape) => match shape.kind() {
                crate::GeometryKind::Point => FieldKind::Point,
                crate::GeometryKind::LineString => FieldKind::LineString,
                crate::GeometryKind::Polygon => FieldKind::Polygon,
                crate::GeometryKind::MultiPoint => FieldKind::MultiPoint,
                crate::GeometryKind::MultiLineString => FieldKind::MultiLineString,
                crate::GeometryKind::MultiPolygon => FieldKind::MultiPolygon,
                crate::GeometryKind::GeometryCollection => FieldKind::GeometryCollection,
            },
        })
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single field definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Coordinate reference system identifier; only meaningful for
    /// geometry-kinded fields.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crs: Option<String>,
    #[serde(default)]
    pub min_occurs: u32,
    #[serde(default = "default_max_occurs")]
    pub max_occurs: u32,
    #[serde(default = "default_nillable")]
    pub nillable: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_value: Option<Value>,
}

fn default_max_occurs() -> u32 {
    1
}

fn default_nillable() -> bool {
    true
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind,
            crs: None,
            min_occurs: 0,
            max_occurs: 1,
            nillable: true,
            default_value: None,
        }
    }
}

/// An ordered, named set of field definitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        SchemaDescriptor {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
