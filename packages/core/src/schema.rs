//! Schemas and fields.
//!
//! `Field` and `Schema` wrap the plain driver descriptors, adding name
//! lookup, uniqueness validation, cloning with overrides, and inference
//! from bare values. Both are immutable after construction.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use geostore_driver::{FieldDescriptor, FieldKind, SchemaDescriptor, Value};

use crate::{Error, Projection};

/// A single field definition, wrapping a driver descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    descriptor: FieldDescriptor,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            descriptor: FieldDescriptor::new(name, kind),
        }
    }

    pub fn from_descriptor(descriptor: FieldDescriptor) -> Self {
        Field { descriptor }
    }

    /// Set the coordinate reference system; only meaningful for geometry
    /// kinds.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.descriptor.crs = Some(projection.id().to_string());
        self
    }

    pub fn with_nillable(mut self, nillable: bool) -> Self {
        self.descriptor.nillable = nillable;
        self
    }

    pub fn with_default_value(mut self, value: Value) -> Self {
        self.descriptor.default_value = Some(value);
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> FieldKind {
        self.descriptor.kind
    }

    pub fn is_geometry(&self) -> bool {
        self.descriptor.kind.is_geometry()
    }

    pub fn projection(&self) -> Option<Projection> {
        if !self.is_geometry() {
            return None;
        }
        self.descriptor.crs.as_deref().map(Projection::new)
    }

    pub fn min_occurs(&self) -> u32 {
        self.descriptor.min_occurs
    }

    pub fn max_occurs(&self) -> u32 {
        self.descriptor.max_occurs
    }

    pub fn is_nillable(&self) -> bool {
        self.descriptor.nillable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.descriptor.default_value.as_ref()
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    /// Check a runtime value against this field's declared kind and
    /// nillability.
    pub fn check(&self, value: &Value) -> Result<(), Error> {
        if value.is_null() {
            if !self.descriptor.nillable {
                return Err(Error::TypeMismatch {
                    field: self.descriptor.name.clone(),
                    expected: format!("non-null {}", self.descriptor.kind),
                });
            }
            return Ok(());
        }
        if !self.descriptor.kind.accepts(value) {
            return Err(Error::TypeMismatch {
                field: self.descriptor.name.clone(),
                expected: self.descriptor.kind.to_string(),
            });
        }
        Ok(())
    }

    pub fn equals(&self, other: &Field) -> bool {
        self.descriptor == other.descriptor
    }
}

/// An ordered, named set of fields with unique names.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    /// Create a schema. Field names must be unique.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Result<Self, Error> {
        let name = name.into();
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name() == field.name()) {
                return Err(Error::invalid(format!(
                    "schema '{}' has duplicate field name '{}'",
                    name,
                    field.name()
                )));
            }
        }
        Ok(Schema { name, fields })
    }

    pub fn from_descriptor(descriptor: SchemaDescriptor) -> Result<Self, Error> {
        let fields = descriptor
            .fields
            .into_iter()
            .map(Field::from_descriptor)
            .collect();
        Schema::new(descriptor.name, fields)
    }

    /// Derive a schema from bare values: one field per value, the kind
    /// inferred from the value's runtime type. Null values cannot be
    /// inferred and are rejected.
    pub fn from_values(name: impl Into<String>, values: &BTreeMap<String, Value>) -> Result<Self, Error> {
        let name = name.into();
        let mut fields = Vec::with_capacity(values.len());
        for (field_name, value) in values {
            let kind = FieldKind::infer(value).ok_or_else(|| {
                Error::invalid(format!(
                    "cannot infer a field type for '{}' from a null value",
                    field_name
                ))
            })?;
            fields.push(Field::new(field_name.clone(), kind));
        }
        Schema::new(name, fields)
    }

    /// Build a schema from a configuration object of the form
    /// `{"name": ..., "fields": [{"name": ..., "type": ...}, ...]}`.
    pub fn from_config(config: &Json) -> Result<Self, Error> {
        let name = config
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::invalid("schema config must include 'name'"))?;
        let fields = config
            .get("fields")
            .and_then(Json::as_array)
            .ok_or_else(|| Error::invalid("schema config must include 'fields'"))?
            .iter()
            .map(field_from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Schema::new(name, fields)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// The first geometry-kinded field, if any (the default geometry).
    pub fn geometry(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_geometry())
    }

    /// Produce a new schema with a different name and/or replacement
    /// fields (matched by name; other fields are carried over unchanged).
    pub fn clone_with(
        &self,
        name: Option<&str>,
        replacements: Vec<Field>,
    ) -> Result<Schema, Error> {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                replacements
                    .iter()
                    .find(|r| r.name() == field.name())
                    .cloned()
                    .unwrap_or_else(|| field.clone())
            })
            .collect();
        Schema::new(name.unwrap_or(&self.name), fields)
    }

    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor::new(
            self.name.clone(),
            self.fields.iter().map(|f| f.descriptor().clone()).collect(),
        )
    }
}

fn field_from_config(config: &Json) -> Result<Field, Error> {
    let name = config
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::invalid("field config must include 'name'"))?;
    let kind_name = config
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::invalid("field config must include 'type'"))?;
    let kind = FieldKind::parse(kind_name)
        .ok_or_else(|| Error::invalid(format!("unsupported field type: {}", kind_name)))?;
    let mut field = Field::new(name, kind);
    if let Some(id) = config.get("projection").and_then(Json::as_str) {
        field = field.with_projection(Projection::new(id));
    }
    if let Some(nillable) = config.get("nillable").and_then(Json::as_bool) {
        field = field.with_nillable(nillable);
    }
    Ok(field)
}
