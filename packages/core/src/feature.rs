//! Features: schema-checked records with an optional layer binding.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use lazy_static::lazy_static;
use serde_json::Value as Json;

use geostore_driver::{Bounds, RawFeature, Value};

use crate::registry::{Entry, TypeRegistry};
use crate::{geom, Error, Geometry, Schema};

/// Pending modifications for a layer, keyed by feature id. Each entry
/// coalesces writes per field, keeping only the latest value.
pub type DirtyIndex = BTreeMap<String, BTreeMap<String, Value>>;

/// A feature's back-reference to the layer it was read from. Holds the
/// layer's name and a shared handle on its dirty index, not the layer
/// itself.
#[derive(Clone)]
pub struct Binding {
    layer: String,
    dirty: Arc<Mutex<DirtyIndex>>,
}

impl Binding {
    pub fn new(layer: impl Into<String>, dirty: Arc<Mutex<DirtyIndex>>) -> Self {
        Binding {
            layer: layer.into(),
            dirty,
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Whether this binding points at the given dirty index. Layer
    /// identity is the index handle; names can recur across workspaces.
    pub fn attached_to(&self, dirty: &Arc<Mutex<DirtyIndex>>) -> bool {
        Arc::ptr_eq(&self.dirty, dirty)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_id() -> String {
    format!("fid-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A single feature: an identified set of values conforming to a schema.
///
/// Features read from a layer carry a binding back to it; setting a value
/// on a bound feature also queues the change in the layer's dirty index,
/// to be flushed by the layer's update operation.
pub struct Feature {
    schema: Arc<Schema>,
    raw: RawFeature,
    geometry: Option<Geometry>,
    binding: Option<Binding>,
}

impl Feature {
    /// Create a feature with the given schema. Every value is checked
    /// against its field; an id is generated when none is supplied.
    pub fn new(
        schema: Arc<Schema>,
        id: Option<String>,
        values: BTreeMap<String, Value>,
    ) -> Result<Self, Error> {
        for (name, value) in &values {
            let field = schema.get(name).ok_or_else(|| Error::SchemaMismatch {
                schema: schema.name().to_string(),
                field: name.clone(),
            })?;
            field.check(value)?;
        }
        let id = id.unwrap_or_else(generate_id);
        Ok(Feature {
            schema,
            raw: RawFeature::with_values(id, values),
            geometry: None,
            binding: None,
        })
    }

    /// Create a standalone feature, inferring a schema from the values.
    pub fn from_values(values: BTreeMap<String, Value>) -> Result<Self, Error> {
        let schema = Schema::from_values("feature", &values)?;
        Feature::new(Arc::new(schema), None, values)
    }

    /// Wrap a raw record read from a store. The record's values are
    /// trusted to conform; drivers are responsible for coercion.
    pub fn from_raw(schema: Arc<Schema>, raw: RawFeature) -> Self {
        Feature {
            schema,
            raw,
            geometry: None,
            binding: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.raw.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The values, in field-name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.raw.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fetch a value. Fields declared by the schema but never set read
    /// as null; undeclared names are a schema mismatch.
    pub fn get(&self, name: &str) -> Result<&Value, Error> {
        if self.schema.get(name).is_none() {
            return Err(Error::SchemaMismatch {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
            });
        }
        Ok(self.raw.get(name))
    }

    /// Set a value, checking it against the field's declared kind. On a
    /// bound feature the change is also queued in the layer's dirty
    /// index.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into();
        let field = self.schema.get(name).ok_or_else(|| Error::SchemaMismatch {
            schema: self.schema.name().to_string(),
            field: name.to_string(),
        })?;
        field.check(&value)?;
        if self
            .schema
            .geometry()
            .is_some_and(|g| g.name() == name)
        {
            self.geometry = None;
        }
        if let Some(binding) = &self.binding {
            let mut dirty = binding
                .dirty
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            dirty
                .entry(self.raw.id.clone())
                .or_default()
                .insert(name.to_string(), value.clone());
        }
        self.raw.set(name, value);
        Ok(())
    }

    /// The default geometry: the value of the schema's first geometry
    /// field, tagged with that field's projection. Cached until the
    /// field is written again.
    pub fn geometry(&mut self) -> Result<Option<&Geometry>, Error> {
        if self.geometry.is_none() {
            let field = match self.schema.geometry() {
                Some(field) => field,
                None => return Ok(None),
            };
            let value = self.raw.get(field.name());
            let shape = match value {
                Value::Null => return Ok(None),
                Value::Geometry(shape) => shape.clone(),
                other => {
                    return Err(Error::TypeMismatch {
                        field: field.name().to_string(),
                        expected: format!("geometry, found {:?}", other),
                    })
                }
            };
            let mut geometry = Geometry::from_shape(shape);
            if let Some(projection) = field.projection() {
                geometry.set_projection(projection);
            }
            self.geometry = Some(geometry);
        }
        Ok(self.geometry.as_ref())
    }

    /// Replace the default geometry value.
    pub fn set_geometry(&mut self, geometry: Geometry) -> Result<(), Error> {
        let name = self
            .schema
            .geometry()
            .map(|f| f.name().to_string())
            .ok_or_else(|| Error::SchemaMismatch {
                schema: self.schema.name().to_string(),
                field: "<geometry>".to_string(),
            })?;
        self.set(&name, Value::Geometry(geometry.shape().clone()))
    }

    /// The bounds of the default geometry, if the feature has one.
    pub fn bounds(&mut self) -> Result<Option<Bounds>, Error> {
        Ok(self.geometry()?.and_then(Geometry::bounds))
    }

    /// A semantic copy: same schema and values, a fresh id, no binding.
    pub fn duplicate(&self) -> Feature {
        Feature {
            schema: Arc::clone(&self.schema),
            raw: RawFeature::with_values(generate_id(), self.raw.values.clone()),
            geometry: None,
            binding: None,
        }
    }

    /// Attach the feature to a layer's dirty index. Subsequent writes
    /// are queued for that layer.
    pub fn bind(&mut self, binding: Binding) {
        self.binding = Some(binding);
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub(crate) fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// The name of the layer this feature is bound to, if any.
    pub fn layer_name(&self) -> Option<&str> {
        self.binding.as_ref().map(Binding::layer)
    }

    pub fn raw(&self) -> &RawFeature {
        &self.raw
    }

    pub fn into_raw(self) -> RawFeature {
        self.raw
    }
}

type FeatureRegistry = TypeRegistry<Json, (), Feature>;

lazy_static! {
    static ref REGISTRY: RwLock<FeatureRegistry> = RwLock::new(seeded_registry());
}

/// Construct a feature from a configuration object of the form
/// `{"values": {...}, "schema": optional, "id": optional}`.
pub fn create(config: &Json) -> Result<Feature, Error> {
    let registry = REGISTRY.read().expect("feature registry poisoned");
    registry.create(config)
}

/// Append a feature registration.
pub fn register(entry: Entry<Json, (), Feature>) {
    let mut registry = REGISTRY.write().expect("feature registry poisoned");
    registry.register(entry);
}

fn seeded_registry() -> FeatureRegistry {
    let mut registry = FeatureRegistry::new();
    registry.register(Entry::new(
        "values",
        |config: &Json| config.get("values").map_or(false, Json::is_object),
        |config| {
            let members = config
                .get("values")
                .and_then(Json::as_object)
                .ok_or_else(|| Error::invalid("feature config 'values' must be an object"))?;
            let mut values = BTreeMap::new();
            for (name, member) in members {
                values.insert(name.clone(), value_from_config(member)?);
            }
            let id = config
                .get("id")
                .and_then(Json::as_str)
                .map(str::to_string);
            match config.get("schema") {
                Some(schema) => {
                    let schema = Arc::new(Schema::from_config(schema)?);
                    Feature::new(schema, id, values)
                }
                None => {
                    let schema = Arc::new(Schema::from_values("feature", &values)?);
                    Feature::new(schema, id, values)
                }
            }
        },
    ));
    registry
}

/// Map a configuration member to a typed value, lifting objects and
/// coordinate arrays through the geometry registry.
fn value_from_config(member: &Json) -> Result<Value, Error> {
    match member {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else {
                Ok(Value::Double(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Json::String(s) => Ok(Value::String(s.clone())),
        other => Ok(Value::Geometry(geom::create(other)?.into_shape())),
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.schema.name() == other.schema.name()
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("id", &self.raw.id)
            .field("schema", &self.schema.name())
            .field("values", &self.raw.values)
            .field("bound", &self.binding.as_ref().map(Binding::layer))
            .finish()
    }
}
