//! Workspaces: exclusive owners of one store connection.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use lazy_static::lazy_static;
use serde_json::Value as Json;

use geostore_driver::{DataStore, RawFeature};

use crate::layer::SharedStore;
use crate::registry::{Entry, TypeRegistry};
use crate::{
    identity_provider, transform_shape, Error, ExpressionParser, Field, Filter, Layer, NoParser,
    Projection, ProjectionProvider, Schema,
};

/// Features are copied between workspaces in batches of this size.
const COPY_BATCH: usize = 1000;

/// Options for [`Workspace::add_layer`].
#[derive(Default)]
pub struct AddLayerOptions {
    /// Name for the copy; defaults to the source layer's name.
    pub name: Option<String>,
    /// Copy only the matching features.
    pub filter: Option<Filter>,
    /// Reproject geometries into this system while copying.
    pub projection: Option<Projection>,
}

/// The owner of one backing store and the layers derived from it.
///
/// The workspace owns the store exclusively. `close()` releases the
/// connection; layers derived from this workspace fail with
/// [`Error::WorkspaceClosed`] afterwards rather than silently succeeding.
pub struct Workspace {
    store: SharedStore,
    projections: ProjectionProvider,
    parser: Arc<dyn ExpressionParser>,
}

impl Workspace {
    pub fn new(store: Box<dyn DataStore>) -> Self {
        Workspace {
            store: Arc::new(Mutex::new(Some(store))),
            projections: identity_provider(),
            parser: Arc::new(NoParser),
        }
    }

    /// Replace the projection collaborator.
    pub fn with_projections(mut self, projections: ProjectionProvider) -> Self {
        self.projections = projections;
        self
    }

    /// Replace the expression parser used for string filters.
    pub fn with_parser(mut self, parser: Arc<dyn ExpressionParser>) -> Self {
        self.parser = parser;
        self
    }

    /// The names of the layers the store currently holds.
    pub fn names(&self) -> Result<Vec<String>, Error> {
        let guard = self.lock_store();
        let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
        Ok(store.names()?)
    }

    /// Resolve a layer by name, or `None` when the store has no such
    /// layer.
    pub fn layer(&self, name: &str) -> Result<Option<Layer>, Error> {
        if !self.names()?.iter().any(|n| n == name) {
            return Ok(None);
        }
        Ok(Some(self.bind_layer(name)))
    }

    /// All layers, in store order.
    pub fn layers(&self) -> Result<Vec<Layer>, Error> {
        Ok(self
            .names()?
            .into_iter()
            .map(|name| self.bind_layer(&name))
            .collect())
    }

    /// Create a new, empty layer from a schema. An existing layer with
    /// the schema's name is a conflict, never auto-renamed.
    pub fn create_layer(&self, schema: &Schema) -> Result<Layer, Error> {
        let mut guard = self.lock_store();
        let store = guard.as_deref_mut().ok_or(Error::WorkspaceClosed)?;
        if store.names()?.iter().any(|n| n == schema.name()) {
            return Err(Error::Conflict {
                name: schema.name().to_string(),
            });
        }
        store.create_schema(&schema.descriptor())?;
        drop(guard);
        Ok(self.bind_layer(schema.name()))
    }

    /// Copy another layer's features into this workspace.
    ///
    /// Features stream through in batches, optionally filtered and
    /// reprojected. The target name must not already exist.
    pub fn add_layer(&self, source: &Layer, options: AddLayerOptions) -> Result<Layer, Error> {
        let source_schema = source.schema()?;
        let name = options.name.as_deref().unwrap_or_else(|| source.name());

        let schema = match &options.projection {
            Some(projection) => {
                let replacements = source_schema
                    .geometry()
                    .map(|field| {
                        vec![Field::new(field.name(), field.kind())
                            .with_projection(projection.clone())]
                    })
                    .unwrap_or_default();
                source_schema.clone_with(Some(name), replacements)?
            }
            None => source_schema.clone_with(Some(name), Vec::new())?,
        };
        let created = self.create_layer(&schema)?;

        let transform = match (&options.projection, source.projection()?) {
            (Some(to), Some(from)) if !self.projections.equals(&from, to) => {
                Some(self.projections.find_transform(&from, to)?)
            }
            _ => None,
        };
        let geometry_field = schema.geometry().map(|f| f.name().to_string());

        let mut cursor = source.query(options.filter.unwrap_or_default())?;
        let mut batch: Vec<RawFeature> = Vec::with_capacity(COPY_BATCH);
        while let Some(feature) = cursor.next() {
            let mut raw = feature.into_raw();
            if let (Some(transform), Some(field)) = (&transform, &geometry_field) {
                if let geostore_driver::Value::Geometry(shape) = raw.get(field).clone() {
                    raw.set(
                        field.clone(),
                        geostore_driver::Value::Geometry(transform_shape(&shape, transform)),
                    );
                }
            }
            batch.push(raw);
            if batch.len() == COPY_BATCH {
                self.flush_batch(name, std::mem::take(&mut batch))?;
            }
        }
        if !batch.is_empty() {
            self.flush_batch(name, batch)?;
        }
        Ok(created)
    }

    /// Release the store connection. Idempotent; every later operation
    /// on this workspace or its layers fails with `WorkspaceClosed`.
    pub fn close(&self) {
        self.lock_store().take();
    }

    pub fn is_closed(&self) -> bool {
        self.lock_store().is_none()
    }

    /// Run `f` against the live store, for callers that need driver
    /// capabilities beyond the layer surface.
    pub fn with_store<R>(
        &self,
        f: impl FnOnce(&dyn DataStore) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let guard = self.lock_store();
        let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
        f(store)
    }

    fn bind_layer(&self, name: &str) -> Layer {
        Layer::new(
            name,
            Arc::clone(&self.store),
            Arc::clone(&self.projections),
            Arc::clone(&self.parser),
        )
    }

    fn flush_batch(&self, name: &str, batch: Vec<RawFeature>) -> Result<(), Error> {
        let guard = self.lock_store();
        let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
        let mut target = store.feature_source(name)?;
        target.add_features(batch)?;
        Ok(())
    }

    fn lock_store(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<Box<dyn DataStore>>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("closed", &self.is_closed())
            .finish()
    }
}

type WorkspaceRegistry = TypeRegistry<Json, Box<dyn DataStore>, Workspace>;

lazy_static! {
    static ref REGISTRY: RwLock<WorkspaceRegistry> = RwLock::new(WorkspaceRegistry::new());
}

/// Construct a workspace from a configuration object. The registry is
/// seeded by the store backends a build links in.
pub fn create(config: &Json) -> Result<Workspace, Error> {
    let registry = REGISTRY.read().expect("workspace registry poisoned");
    registry.create(config)
}

/// Lift a live store connection into a workspace through the registry.
pub fn from_store_handle(store: Box<dyn DataStore>) -> Result<Workspace, Error> {
    let registry = REGISTRY.read().expect("workspace registry poisoned");
    registry.create_from_handle(store)
}

/// Append a workspace registration. Dispatch stays in registration
/// order; register the most common kind first.
pub fn register(entry: Entry<Json, Box<dyn DataStore>, Workspace>) {
    let mut registry = REGISTRY.write().expect("workspace registry poisoned");
    registry.register(entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use geostore_driver::{
        Bounds, Coord, FeatureSource, FieldKind, RawFeatureReader, RawFeatureWriter,
        RecordPredicate, SchemaDescriptor, Shape, StoreError, Value,
    };
    use std::collections::{BTreeMap, BTreeSet};

    // A multi-table in-memory store, just enough for workspace tests.

    #[derive(Default)]
    struct Tables {
        tables: BTreeMap<String, (SchemaDescriptor, Vec<RawFeature>)>,
        next_id: u64,
    }

    #[derive(Clone, Default)]
    struct TestStore {
        tables: Arc<Mutex<Tables>>,
    }

    struct TestSource {
        name: String,
        tables: Arc<Mutex<Tables>>,
    }

    struct VecReader {
        records: Vec<RawFeature>,
        at: usize,
    }

    impl RawFeatureReader for VecReader {
        fn has_next(&mut self) -> Result<bool, StoreError> {
            Ok(self.at < self.records.len())
        }
        fn next(&mut self) -> Result<RawFeature, StoreError> {
            let record = self.records[self.at].clone();
            self.at += 1;
            Ok(record)
        }
        fn close(&mut self) {}
    }

    impl FeatureSource for TestSource {
        fn name(&self) -> &str {
            &self.name
        }
        fn schema(&self) -> Result<SchemaDescriptor, StoreError> {
            let tables = self.tables.lock().unwrap();
            Ok(tables.tables.get(&self.name).unwrap().0.clone())
        }
        fn count(&self, filter: &dyn RecordPredicate) -> Result<Option<usize>, StoreError> {
            let tables = self.tables.lock().unwrap();
            Ok(Some(
                tables.tables[&self.name]
                    .1
                    .iter()
                    .filter(|r| filter.matches(r))
                    .count(),
            ))
        }
        fn bounds(&self, _filter: &dyn RecordPredicate) -> Result<Option<Bounds>, StoreError> {
            Ok(None)
        }
        fn add_features(&mut self, batch: Vec<RawFeature>) -> Result<Vec<String>, StoreError> {
            let mut tables = self.tables.lock().unwrap();
            let mut ids = Vec::with_capacity(batch.len());
            for mut record in batch {
                tables.next_id += 1;
                record.id = format!("{}.{}", self.name, tables.next_id);
                ids.push(record.id.clone());
                tables.tables.get_mut(&self.name).unwrap().1.push(record);
            }
            Ok(ids)
        }
        fn remove_features(&mut self, filter: &dyn RecordPredicate) -> Result<usize, StoreError> {
            let mut tables = self.tables.lock().unwrap();
            let records = &mut tables.tables.get_mut(&self.name).unwrap().1;
            let before = records.len();
            records.retain(|r| !filter.matches(r));
            Ok(before - records.len())
        }
        fn feature_reader(
            &self,
            filter: Box<dyn RecordPredicate>,
        ) -> Result<Box<dyn RawFeatureReader>, StoreError> {
            let tables = self.tables.lock().unwrap();
            let records = tables.tables[&self.name]
                .1
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            Ok(Box::new(VecReader { records, at: 0 }))
        }
        fn feature_writer(
            &mut self,
            _ids: &BTreeSet<String>,
        ) -> Result<Box<dyn RawFeatureWriter>, StoreError> {
            Err(StoreError::NotSupported)
        }
    }

    impl DataStore for TestStore {
        fn names(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.tables.lock().unwrap().tables.keys().cloned().collect())
        }
        fn feature_source(&self, name: &str) -> Result<Box<dyn FeatureSource>, StoreError> {
            if !self.tables.lock().unwrap().tables.contains_key(name) {
                return Err(StoreError::NoSuchLayer {
                    name: name.to_string(),
                });
            }
            Ok(Box::new(TestSource {
                name: name.to_string(),
                tables: Arc::clone(&self.tables),
            }))
        }
        fn create_schema(&mut self, schema: &SchemaDescriptor) -> Result<(), StoreError> {
            let mut tables = self.tables.lock().unwrap();
            tables
                .tables
                .insert(schema.name.clone(), (schema.clone(), Vec::new()));
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn city_schema(name: &str) -> Schema {
        Schema::new(
            name,
            vec![
                Field::new("geom", FieldKind::Point)
                    .with_projection(Projection::new("EPSG:4326")),
                Field::new("name", FieldKind::String),
            ],
        )
        .unwrap()
    }

    fn workspace() -> Workspace {
        Workspace::new(Box::new(TestStore::default()))
    }

    fn add_city(layer: &Layer, name: &str, x: f64, y: f64) {
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), Value::from(name));
        values.insert(
            "geom".to_string(),
            Value::from(Shape::Point(Coord::new(x, y))),
        );
        layer.add(values).unwrap();
    }

    #[test]
    fn create_layer_then_resolve_by_name() {
        let ws = workspace();
        assert!(ws.names().unwrap().is_empty());
        ws.create_layer(&city_schema("cities")).unwrap();
        assert_eq!(ws.names().unwrap(), vec!["cities"]);
        assert!(ws.layer("cities").unwrap().is_some());
        assert!(ws.layer("missing").unwrap().is_none());
        assert_eq!(ws.layers().unwrap().len(), 1);
    }

    #[test]
    fn creating_an_existing_layer_is_a_conflict() {
        let ws = workspace();
        ws.create_layer(&city_schema("cities")).unwrap();
        assert!(matches!(
            ws.create_layer(&city_schema("cities")),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn add_layer_copies_features() {
        let source_ws = workspace();
        let source = source_ws.create_layer(&city_schema("cities")).unwrap();
        add_city(&source, "Tucson", -110.97, 32.22);
        add_city(&source, "Phoenix", -112.07, 33.45);

        let target_ws = workspace();
        let copy = target_ws
            .add_layer(&source, AddLayerOptions::default())
            .unwrap();
        assert_eq!(copy.name(), "cities");
        assert_eq!(copy.count(Filter::Pass).unwrap(), 2);
        // the source is untouched
        assert_eq!(source.count(Filter::Pass).unwrap(), 2);
    }

    #[test]
    fn add_layer_honors_name_and_filter() {
        let source_ws = workspace();
        let source = source_ws.create_layer(&city_schema("cities")).unwrap();
        add_city(&source, "Tucson", -110.97, 32.22);
        add_city(&source, "Phoenix", -112.07, 33.45);

        let target_ws = workspace();
        let copy = target_ws
            .add_layer(
                &source,
                AddLayerOptions {
                    name: Some("just_one".to_string()),
                    filter: Some(Filter::fids(["cities.1"])),
                    projection: None,
                },
            )
            .unwrap();
        assert_eq!(copy.name(), "just_one");
        assert_eq!(copy.count(Filter::Pass).unwrap(), 1);
    }

    #[test]
    fn add_layer_into_a_taken_name_is_a_conflict() {
        let source_ws = workspace();
        let source = source_ws.create_layer(&city_schema("cities")).unwrap();
        let target_ws = workspace();
        target_ws.create_layer(&city_schema("cities")).unwrap();
        assert!(matches!(
            target_ws.add_layer(&source, AddLayerOptions::default()),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn close_releases_the_store_for_workspace_and_layers() {
        let ws = workspace();
        let layer = ws.create_layer(&city_schema("cities")).unwrap();
        ws.close();
        ws.close(); // idempotent
        assert!(ws.is_closed());
        assert!(matches!(ws.names().unwrap_err(), Error::WorkspaceClosed));
        assert!(matches!(
            layer.count(Filter::Pass).unwrap_err(),
            Error::WorkspaceClosed
        ));
    }

    #[test]
    fn registry_resolves_registered_kinds_in_order() {
        // a private registry exercised directly; the process-wide one is
        // seeded by the store backends
        let mut registry = WorkspaceRegistry::new();
        registry.register(Entry::new(
            "test",
            |config: &Json| config.get("type").and_then(Json::as_str) == Some("test"),
            |_config| Ok(Workspace::new(Box::new(TestStore::default()))),
        ));
        let ws = registry
            .create(&serde_json::json!({"type": "test"}))
            .unwrap();
        assert!(!ws.is_closed());
        assert!(matches!(
            registry.create(&serde_json::json!({"type": "nope"})),
            Err(Error::Resolution { .. })
        ));
    }
}
