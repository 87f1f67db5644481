//! The RawFeature type - a backing record as drivers see it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Bounds, Value};

/// A raw backing record: an identifier plus named attribute values.
///
/// This is what drivers read and write. The core layer wraps these in
/// schema-validated `Feature` objects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    pub id: String,
    pub values: BTreeMap<String, Value>,
}

impl RawFeature {
    pub fn new(id: impl Into<String>) -> Self {
        RawFeature {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_values(id: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        RawFeature {
            id: id.into(),
            values,
        }
    }

    /// The value at a name, or `Value::Null` if absent.
    pub fn get(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// The union of bounds of all geometry-valued attributes.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut bounds: Option<Bounds> = None;
        for value in self.values.values() {
            if let Some(shape) = value.as_geometry() {
                if let Some(b) = shape.bounds() {
                    match bounds.as_mut() {
                        Some(acc) => acc.include(&b),
                        None => bounds = Some(b),
                    }
                }
            }
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coord, Shape};

    #[test]
    fn get_missing_is_null() {
        let record = RawFeature::new("roads.1");
        assert!(record.get("name").is_null());
    }

    #[test]
    fn set_then_get() {
        let mut record = RawFeature::new("roads.1");
        record.set("name", Value::from("main st"));
        assert_eq!(record.get("name").as_str(), Some("main st"));
    }

    #[test]
    fn bounds_union_geometry_values() {
        let mut record = RawFeature::new("x.1");
        record.set("a", Value::from(Shape::Point(Coord::new(0.0, 0.0))));
        record.set("b", Value::from(Shape::Point(Coord::new(2.0, 3.0))));
        record.set("name", Value::from("two points"));
        assert_eq!(record.bounds().unwrap(), Bounds::new(0.0, 0.0, 2.0, 3.0));
    }
}
