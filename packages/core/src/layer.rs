//! Layers: schema-bound views over one feature source, with local
//! dirty tracking for deferred writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use geostore_driver::{
    Bounds, DataStore, FeatureSource, RawFeature, RawFeatureReader, Value,
};

use crate::feature::{Binding, DirtyIndex};
use crate::style::{default_style, Style};
use crate::{
    transform_shape, Cursor, Error, ExpressionParser, Feature, Filter, Geometry, Projection,
    ProjectionProvider, Schema,
};

/// The store handle shared between a workspace and its layers. The
/// workspace's `close()` takes the box out; layers observing `None` fail
/// with [`Error::WorkspaceClosed`].
pub type SharedStore = Arc<Mutex<Option<Box<dyn DataStore>>>>;

/// Something that can be added to a layer: a feature, or bare values to
/// build one from.
pub enum AddTarget {
    Feature(Feature),
    Values(BTreeMap<String, Value>),
}

impl From<Feature> for AddTarget {
    fn from(feature: Feature) -> Self {
        AddTarget::Feature(feature)
    }
}

impl From<BTreeMap<String, Value>> for AddTarget {
    fn from(values: BTreeMap<String, Value>) -> Self {
        AddTarget::Values(values)
    }
}

/// What to remove: a filter, an expression for the parser, or one
/// feature by identity. Removal is always explicit; there is no
/// "remove everything" default.
pub enum RemoveTarget {
    Filter(Filter),
    Expression(String),
    Id(String),
}

impl From<Filter> for RemoveTarget {
    fn from(filter: Filter) -> Self {
        RemoveTarget::Filter(filter)
    }
}

impl From<&str> for RemoveTarget {
    fn from(expression: &str) -> Self {
        RemoveTarget::Expression(expression.to_string())
    }
}

impl From<&Feature> for RemoveTarget {
    fn from(feature: &Feature) -> Self {
        RemoveTarget::Id(feature.id().to_string())
    }
}

/// Lookup key for [`Layer::get`]: a feature id or a filter.
pub enum GetTarget {
    Id(String),
    Filter(Filter),
}

impl From<&str> for GetTarget {
    fn from(id: &str) -> Self {
        GetTarget::Id(id.to_string())
    }
}

impl From<String> for GetTarget {
    fn from(id: String) -> Self {
        GetTarget::Id(id)
    }
}

impl From<Filter> for GetTarget {
    fn from(filter: Filter) -> Self {
        GetTarget::Filter(filter)
    }
}

/// A named, schema-bound view over one feature source.
///
/// A layer holds a non-owning reference to its workspace's store and a
/// dirty index of pending field edits. Features read through `query` are
/// bound back to the layer, so their setters queue changes here until
/// `update()` flushes them. One layer instance is single-consumer by
/// contract.
pub struct Layer {
    name: String,
    store: SharedStore,
    dirty: Arc<Mutex<DirtyIndex>>,
    schema: Mutex<Option<Arc<Schema>>>,
    projection: Mutex<Option<Projection>>,
    style: Mutex<Option<Style>>,
    projections: ProjectionProvider,
    parser: Arc<dyn ExpressionParser>,
}

impl Layer {
    pub fn new(
        name: impl Into<String>,
        store: SharedStore,
        projections: ProjectionProvider,
        parser: Arc<dyn ExpressionParser>,
    ) -> Self {
        Layer {
            name: name.into(),
            store,
            dirty: Arc::new(Mutex::new(DirtyIndex::new())),
            schema: Mutex::new(None),
            projection: Mutex::new(None),
            style: Mutex::new(None),
            projections,
            parser,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The layer's schema, fetched from the store once and memoized.
    pub fn schema(&self) -> Result<Arc<Schema>, Error> {
        let mut cached = lock(&self.schema);
        if let Some(schema) = cached.as_ref() {
            return Ok(Arc::clone(schema));
        }
        let descriptor = self.with_source(|source| source.schema().map_err(Error::from))?;
        let schema = Arc::new(Schema::from_descriptor(descriptor)?);
        *cached = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// The layer's projection: set once explicitly, otherwise taken from
    /// the schema's geometry field.
    pub fn projection(&self) -> Result<Option<Projection>, Error> {
        if let Some(projection) = lock(&self.projection).clone() {
            return Ok(Some(projection));
        }
        let schema = self.schema()?;
        Ok(schema.geometry().and_then(|field| field.projection()))
    }

    /// Establish the layer's projection. Set-once: a second call is an
    /// error rather than a silent re-interpretation of stored geometry.
    pub fn set_projection(&self, projection: Projection) -> Result<(), Error> {
        let mut cached = lock(&self.projection);
        if cached.is_some() {
            return Err(Error::invalid(format!(
                "layer '{}' already has a projection",
                self.name
            )));
        }
        *cached = Some(projection);
        Ok(())
    }

    /// The layer's style, or the default style when none was set.
    pub fn style(&self) -> Style {
        lock(&self.style).clone().unwrap_or_else(default_style)
    }

    pub fn set_style(&self, style: Style) {
        *lock(&self.style) = Some(style);
    }

    /// Query the layer. The returned cursor opens the store read lazily
    /// and yields features bound to this layer.
    pub fn query(&self, filter: Filter) -> Result<Cursor<Feature>, Error> {
        let schema = self.schema()?;
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let binding_name = self.name.clone();
        let dirty = Arc::clone(&self.dirty);
        let open = move || -> Result<Box<dyn RawFeatureReader>, Error> {
            let guard = lock(&store);
            let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
            let source = store.feature_source(&name)?;
            Ok(source.feature_reader(Box::new(filter))?)
        };
        let cast = move |raw: RawFeature| -> Result<Feature, Error> {
            let mut feature = Feature::from_raw(Arc::clone(&schema), raw);
            feature.bind(Binding::new(binding_name.clone(), Arc::clone(&dirty)));
            Ok(feature)
        };
        Ok(Cursor::new(open, cast))
    }

    /// All features, in store order.
    pub fn features(&self) -> Result<Cursor<Feature>, Error> {
        self.query(Filter::Pass)
    }

    /// The first feature matching an id or filter, if any.
    pub fn get(&self, target: impl Into<GetTarget>) -> Result<Option<Feature>, Error> {
        let filter = match target.into() {
            GetTarget::Id(id) => Filter::fids([id]),
            GetTarget::Filter(filter) => filter,
        };
        Ok(self.query(filter)?.first())
    }

    /// How many features match. Falls back to counting a full read when
    /// the driver reports counting unsupported.
    pub fn count(&self, filter: Filter) -> Result<usize, Error> {
        let counted = self.with_source(|source| source.count(&filter).map_err(Error::from))?;
        if let Some(count) = counted {
            return Ok(count);
        }
        let mut cursor = self.query(filter)?;
        let mut count = 0;
        while cursor.next().is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// The bounds of the matching features, or `None` when nothing
    /// matched or no feature has a geometry. Falls back to a manual union
    /// when the driver reports bounds unsupported.
    pub fn bounds(&self, filter: Filter) -> Result<Option<Bounds>, Error> {
        let computed =
            self.with_source(|source| source.bounds(&filter).map_err(Error::from))?;
        if let Some(bounds) = computed {
            return Ok(Some(bounds));
        }
        let mut union: Option<Bounds> = None;
        let mut cursor = self.query(filter)?;
        while let Some(mut feature) = cursor.next() {
            if let Some(bounds) = feature.bounds()? {
                match union.as_mut() {
                    Some(current) => current.include(&bounds),
                    None => union = Some(bounds),
                }
            }
        }
        Ok(union)
    }

    /// Add one feature (or bare values) to the layer.
    ///
    /// A feature bound to another layer is duplicated first; a live
    /// feature is never a member of two layers at once. If the layer has
    /// an established projection and the feature's geometry is in a
    /// different one, the geometry is reprojected before the write; a
    /// geometry without a projection is assumed to already be in the
    /// layer's system. Returns the stored feature, bound to this layer
    /// under its assigned id.
    pub fn add(&self, target: impl Into<AddTarget>) -> Result<Feature, Error> {
        let schema = self.schema()?;
        let mut feature = match target.into() {
            AddTarget::Values(values) => Feature::new(Arc::clone(&schema), None, values)?,
            AddTarget::Feature(feature) => {
                if feature
                    .binding()
                    .is_some_and(|binding| !binding.attached_to(&self.dirty))
                {
                    feature.duplicate()
                } else {
                    feature
                }
            }
        };
        if let Some(layer_projection) = self.projection()? {
            self.align_projection(&mut feature, &layer_projection)?;
        }
        let raw = feature.raw().clone();
        let ids = self.with_source_mut(|source| {
            source.add_features(vec![raw]).map_err(Error::from)
        })?;
        let id = ids
            .into_iter()
            .next()
            .ok_or_else(|| Error::invalid("store assigned no id for the added feature"))?;
        let mut stored = Feature::from_raw(
            Arc::clone(&schema),
            RawFeature::with_values(id, feature.into_raw().values),
        );
        stored.bind(Binding::new(self.name.clone(), Arc::clone(&self.dirty)));
        Ok(stored)
    }

    /// Remove the matching features, returning how many went away.
    pub fn remove(&self, target: impl Into<RemoveTarget>) -> Result<usize, Error> {
        let filter = match target.into() {
            RemoveTarget::Filter(filter) => filter,
            RemoveTarget::Expression(text) => Filter::parse(&text, self.parser.as_ref())?,
            RemoveTarget::Id(id) => Filter::fids([id]),
        };
        self.with_source_mut(|source| source.remove_features(&filter).map_err(Error::from))
    }

    /// The pending edits: dirty field names per feature id.
    pub fn pending(&self) -> BTreeMap<String, BTreeSet<String>> {
        lock(&self.dirty)
            .iter()
            .map(|(id, fields)| (id.clone(), fields.keys().cloned().collect()))
            .collect()
    }

    /// Flush the pending edits to the store.
    ///
    /// Opens one writer scoped to exactly the dirty id set, merges the
    /// recorded dirty fields into the store's current record per id
    /// (fields not marked dirty keep the store's current value), and
    /// clears each entry as its write succeeds. Edits queued for a
    /// feature the store no longer holds are dropped on success, so a
    /// remove-after-edit cannot leave the index stuck. On a mid-batch
    /// failure, entries already written stay cleared and the rest
    /// remain queued for a later call; the failure is returned.
    pub fn update(&self) -> Result<(), Error> {
        let ids: BTreeSet<String> = lock(&self.dirty).keys().cloned().collect();
        if ids.is_empty() {
            return Ok(());
        }
        let guard = lock(&self.store);
        let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
        let mut source = store.feature_source(&self.name)?;
        let mut writer = source.feature_writer(&ids)?;
        loop {
            match writer.has_next() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let _ = writer.close();
                    return Err(err.into());
                }
            }
            let record = match writer.next() {
                Ok(record) => record,
                Err(err) => {
                    let _ = writer.close();
                    return Err(err.into());
                }
            };
            let id = record.id.clone();
            if let Some(fields) = lock(&self.dirty).get(&id).cloned() {
                for (field, value) in fields {
                    record.set(field, value);
                }
            }
            match writer.write() {
                Ok(()) => {
                    lock(&self.dirty).remove(&id);
                }
                Err(err) => {
                    let _ = writer.close();
                    return Err(err.into());
                }
            }
        }
        writer.close()?;
        // Ids the writer never yielded no longer exist in the store;
        // their edits have nowhere to land, so the entries drain too.
        let mut dirty = lock(&self.dirty);
        for id in &ids {
            dirty.remove(id);
        }
        Ok(())
    }

    fn align_projection(
        &self,
        feature: &mut Feature,
        layer_projection: &Projection,
    ) -> Result<(), Error> {
        let geometry = match feature.geometry()? {
            Some(geometry) => geometry.clone(),
            None => return Ok(()),
        };
        match geometry.projection() {
            Some(from) if !self.projections.equals(from, layer_projection) => {
                let transform = self.projections.find_transform(from, layer_projection)?;
                let reprojected =
                    Geometry::from_shape(transform_shape(geometry.shape(), &transform))
                        .with_projection(layer_projection.clone());
                feature.set_geometry(reprojected)
            }
            Some(_) => Ok(()),
            // no projection: assume already in the layer's system
            None => Ok(()),
        }
    }

    fn with_source<R>(
        &self,
        f: impl FnOnce(&dyn FeatureSource) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let guard = lock(&self.store);
        let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
        let source = store.feature_source(&self.name)?;
        f(source.as_ref())
    }

    fn with_source_mut<R>(
        &self,
        f: impl FnOnce(&mut dyn FeatureSource) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let guard = lock(&self.store);
        let store = guard.as_deref().ok_or(Error::WorkspaceClosed)?;
        let mut source = store.feature_source(&self.name)?;
        f(source.as_mut())
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("pending", &lock(&self.dirty).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{identity_provider, Field, NoParser};
    use geostore_driver::{
        Coord, FieldKind, RawFeatureWriter, RecordPredicate, SchemaDescriptor, Shape, StoreError,
    };

    // A minimal in-module store: one table, insertion-ordered, with
    // switches to simulate unsupported count/bounds and failing writes.

    #[derive(Clone, Default)]
    struct TableState {
        records: Vec<RawFeature>,
        next_id: u64,
    }

    #[derive(Clone)]
    struct TestStore {
        name: String,
        table: Arc<Mutex<TableState>>,
        support_count: bool,
        support_bounds: bool,
        fail_write_for: Option<String>,
    }

    impl TestStore {
        fn new(name: &str) -> Self {
            TestStore {
                name: name.to_string(),
                table: Arc::new(Mutex::new(TableState::default())),
                support_count: true,
                support_bounds: true,
                fail_write_for: None,
            }
        }
    }

    struct TestSource {
        store: TestStore,
    }

    struct TestReader {
        records: Vec<RawFeature>,
        at: usize,
    }

    impl RawFeatureReader for TestReader {
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

    struct TestWriter {
        table: Arc<Mutex<TableState>>,
        scoped: Vec<RawFeature>,
        at: usize,
        started: bool,
        fail_for: Option<String>,
    }

    impl RawFeatureWriter for TestWriter {
        fn has_next(&mut self) -> Result<bool, StoreError> {
            if self.started {
                self.at += 1;
            }
            self.started = true;
            Ok(self.at < self.scoped.len())
        }
        fn next(&mut self) -> Result<&mut RawFeature, StoreError> {
            Ok(&mut self.scoped[self.at])
        }
        fn write(&mut self) -> Result<(), StoreError> {
            let record = self.scoped[self.at].clone();
            if self.fail_for.as_deref() == Some(record.id.as_str()) {
                return Err(StoreError::backend("write refused"));
            }
            let mut table = self.table.lock().unwrap();
            if let Some(stored) = table.records.iter_mut().find(|r| r.id == record.id) {
                *stored = record;
            }
            Ok(())
        }
        fn close(&mut self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    impl FeatureSource for TestSource {
        fn name(&self) -> &str {
            &self.store.name
        }
        fn schema(&self) -> Result<SchemaDescriptor, StoreError> {
            Ok(city_schema().descriptor())
        }
        fn count(&self, filter: &dyn RecordPredicate) -> Result<Option<usize>, StoreError> {
            if !self.store.support_count {
                return Ok(None);
            }
            let table = self.store.table.lock().unwrap();
            Ok(Some(
                table.records.iter().filter(|r| filter.matches(r)).count(),
            ))
        }
        fn bounds(&self, filter: &dyn RecordPredicate) -> Result<Option<Bounds>, StoreError> {
            if !self.store.support_bounds {
                return Ok(None);
            }
            let table = self.store.table.lock().unwrap();
            let mut union: Option<Bounds> = None;
            for record in table.records.iter().filter(|r| filter.matches(r)) {
                if let Some(bounds) = record.bounds() {
                    match union.as_mut() {
                        Some(current) => current.include(&bounds),
                        None => union = Some(bounds),
                    }
                }
            }
            Ok(union)
        }
        fn add_features(&mut self, batch: Vec<RawFeature>) -> Result<Vec<String>, StoreError> {
            let mut table = self.store.table.lock().unwrap();
            let mut ids = Vec::with_capacity(batch.len());
            for mut record in batch {
                table.next_id += 1;
                record.id = format!("{}.{}", self.store.name, table.next_id);
                ids.push(record.id.clone());
                table.records.push(record);
            }
            Ok(ids)
        }
        fn remove_features(&mut self, filter: &dyn RecordPredicate) -> Result<usize, StoreError> {
            let mut table = self.store.table.lock().unwrap();
            let before = table.records.len();
            table.records.retain(|r| !filter.matches(r));
            Ok(before - table.records.len())
        }
        fn feature_reader(
            &self,
            filter: Box<dyn RecordPredicate>,
        ) -> Result<Box<dyn RawFeatureReader>, StoreError> {
            let table = self.store.table.lock().unwrap();
            let records = table
                .records
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            Ok(Box::new(TestReader { records, at: 0 }))
        }
        fn feature_writer(
            &mut self,
            ids: &BTreeSet<String>,
        ) -> Result<Box<dyn RawFeatureWriter>, StoreError> {
            let table = self.store.table.lock().unwrap();
            let scoped = table
                .records
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect();
            Ok(Box::new(TestWriter {
                table: Arc::clone(&self.store.table),
                scoped,
                at: 0,
                started: false,
                fail_for: self.store.fail_write_for.clone(),
            }))
        }
    }

    impl DataStore for TestStore {
        fn names(&self) -> Result<Vec<String>, StoreError> {
            Ok(vec![self.name.clone()])
        }
        fn feature_source(&self, name: &str) -> Result<Box<dyn FeatureSource>, StoreError> {
            if name != self.name {
                return Err(StoreError::NoSuchLayer {
                    name: name.to_string(),
                });
            }
            Ok(Box::new(TestSource {
                store: self.clone(),
            }))
        }
        fn create_schema(&mut self, _schema: &SchemaDescriptor) -> Result<(), StoreError> {
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn city_schema() -> Schema {
        Schema::new(
            "cities",
            vec![
                Field::new("geom", FieldKind::Point)
                    .with_projection(Projection::new("EPSG:4326")),
                Field::new("name", FieldKind::String),
                Field::new("population", FieldKind::Integer),
            ],
        )
        .unwrap()
    }

    fn city(name: &str, x: f64, y: f64, population: i64) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), Value::from(name));
        values.insert("population".to_string(), Value::from(population));
        values.insert(
            "geom".to_string(),
            Value::from(Shape::Point(Coord::new(x, y))),
        );
        values
    }

    fn layer_over(store: TestStore) -> Layer {
        let shared: SharedStore = Arc::new(Mutex::new(Some(Box::new(store))));
        Layer::new("cities", shared, identity_provider(), Arc::new(NoParser))
    }

    fn seeded_layer() -> Layer {
        let layer = layer_over(TestStore::new("cities"));
        layer.add(city("Tucson", -110.97, 32.22, 520_116)).unwrap();
        layer.add(city("Phoenix", -112.07, 33.45, 1_608_139)).unwrap();
        layer.add(city("Flagstaff", -111.65, 35.20, 76_831)).unwrap();
        layer
    }

    #[test]
    fn query_yields_bound_features_in_store_order() {
        let layer = seeded_layer();
        let mut names = Vec::new();
        layer.features().unwrap().for_each(|f, _| {
            names.push(f.get("name").unwrap().as_str().unwrap().to_string());
            true
        });
        assert_eq!(names, vec!["Tucson", "Phoenix", "Flagstaff"]);
        let feature = layer.features().unwrap().first().unwrap();
        assert_eq!(feature.layer_name(), Some("cities"));
    }

    #[test]
    fn add_assigns_store_ids_and_binds() {
        let layer = layer_over(TestStore::new("cities"));
        let feature = layer.add(city("Yuma", -114.62, 32.69, 97_093)).unwrap();
        assert_eq!(feature.id(), "cities.1");
        assert!(feature.is_bound());
    }

    #[test]
    fn add_duplicates_a_feature_bound_elsewhere() {
        let here = seeded_layer();
        let there = layer_over(TestStore::new("cities"));
        let original = here.get("cities.2").unwrap().unwrap();
        let original_id = original.id().to_string();
        let copied = there.add(original).unwrap();
        assert_eq!(copied.layer_name(), Some("cities"));
        assert_ne!(copied.id(), original_id);
        // the source layer still has its feature, untouched
        assert!(here.get(original_id.as_str()).unwrap().is_some());
    }

    #[test]
    fn get_by_id_and_by_filter() {
        let layer = seeded_layer();
        let by_id = layer.get("cities.2").unwrap().unwrap();
        assert_eq!(by_id.get("name").unwrap().as_str(), Some("Phoenix"));
        let by_filter = layer
            .get(Filter::fids(["cities.3"]))
            .unwrap()
            .unwrap();
        assert_eq!(by_filter.get("name").unwrap().as_str(), Some("Flagstaff"));
        assert!(layer.get("cities.99").unwrap().is_none());
    }

    #[test]
    fn count_and_bounds_fall_back_to_iteration() {
        let mut store = TestStore::new("cities");
        store.support_count = false;
        store.support_bounds = false;
        let layer = layer_over(store);
        layer.add(city("Tucson", -110.97, 32.22, 520_116)).unwrap();
        layer.add(city("Phoenix", -112.07, 33.45, 1_608_139)).unwrap();
        assert_eq!(layer.count(Filter::Pass).unwrap(), 2);
        let bounds = layer.bounds(Filter::Pass).unwrap().unwrap();
        assert_eq!(bounds.min_x, -112.07);
        assert_eq!(bounds.max_y, 33.45);
    }

    #[test]
    fn remove_by_feature_and_by_filter() {
        let layer = seeded_layer();
        let doomed = layer.get("cities.1").unwrap().unwrap();
        assert_eq!(layer.remove(&doomed).unwrap(), 1);
        assert_eq!(layer.count(Filter::Pass).unwrap(), 2);
        assert_eq!(
            layer
                .remove(Filter::fids(["cities.2", "cities.3"]))
                .unwrap(),
            2
        );
        assert_eq!(layer.count(Filter::Pass).unwrap(), 0);
    }

    #[test]
    fn edits_coalesce_into_one_pending_entry() {
        let layer = seeded_layer();
        let mut feature = layer.get("cities.1").unwrap().unwrap();
        feature.set("name", "Tucson, AZ").unwrap();
        feature.set("population", 550_000i64).unwrap();
        let pending = layer.pending();
        assert_eq!(pending.len(), 1);
        let fields = pending.get("cities.1").unwrap();
        assert!(fields.contains("name") && fields.contains("population"));
    }

    #[test]
    fn update_flushes_and_clears() {
        let layer = seeded_layer();
        let mut feature = layer.get("cities.1").unwrap().unwrap();
        feature.set("name", "Old Pueblo").unwrap();
        layer.update().unwrap();
        assert!(layer.pending().is_empty());
        let reread = layer.get("cities.1").unwrap().unwrap();
        assert_eq!(reread.get("name").unwrap().as_str(), Some("Old Pueblo"));
    }

    #[test]
    fn update_merges_only_dirty_fields() {
        let store = TestStore::new("cities");
        let table = Arc::clone(&store.table);
        let layer = layer_over(store);
        layer.add(city("Tucson", -110.97, 32.22, 520_116)).unwrap();
        let mut feature = layer.get("cities.1").unwrap().unwrap();
        feature.set("name", "Old Pueblo").unwrap();
        // a concurrent external writer changes a field this edit never
        // touched, after the feature was read but before the flush
        {
            let mut guard = table.lock().unwrap();
            let record = guard.records.iter_mut().find(|r| r.id == "cities.1").unwrap();
            record.set("population", Value::from(999_999i64));
        }
        layer.update().unwrap();
        let reread = layer.get("cities.1").unwrap().unwrap();
        assert_eq!(reread.get("name").unwrap().as_str(), Some("Old Pueblo"));
        // the untouched field keeps the store's current value
        assert_eq!(reread.get("population").unwrap().as_int(), Some(999_999));
    }

    #[test]
    fn update_keeps_failed_entries_queued() {
        let mut store = TestStore::new("cities");
        store.fail_write_for = Some("cities.2".to_string());
        let layer = layer_over(store);
        layer.add(city("Tucson", -110.97, 32.22, 520_116)).unwrap();
        layer.add(city("Phoenix", -112.07, 33.45, 1_608_139)).unwrap();
        let mut first = layer.get("cities.1").unwrap().unwrap();
        first.set("name", "Old Pueblo").unwrap();
        let mut second = layer.get("cities.2").unwrap().unwrap();
        second.set("name", "PHX").unwrap();
        let err = layer.update().unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        let pending = layer.pending();
        // the write that succeeded is cleared; the failed one is retained
        assert!(!pending.contains_key("cities.1"));
        assert!(pending.contains_key("cities.2"));
    }

    #[test]
    fn update_drains_edits_to_a_removed_feature() {
        let layer = seeded_layer();
        let mut feature = layer.get("cities.1").unwrap().unwrap();
        feature.set("name", "Old Pueblo").unwrap();
        layer.remove(Filter::fids(["cities.1"])).unwrap();
        layer.update().unwrap();
        assert!(layer.pending().is_empty());
        // a second flush stays a no-op
        layer.update().unwrap();
        assert!(layer.pending().is_empty());
    }

    #[test]
    fn update_with_nothing_pending_is_a_no_op() {
        let layer = seeded_layer();
        layer.update().unwrap();
        assert!(layer.pending().is_empty());
    }

    #[test]
    fn operations_fail_after_the_store_is_taken() {
        let shared: SharedStore =
            Arc::new(Mutex::new(Some(Box::new(TestStore::new("cities")))));
        let layer = Layer::new(
            "cities",
            Arc::clone(&shared),
            identity_provider(),
            Arc::new(NoParser),
        );
        shared.lock().unwrap().take();
        assert!(matches!(
            layer.schema().unwrap_err(),
            Error::WorkspaceClosed
        ));
        assert!(matches!(
            layer.count(Filter::Pass).unwrap_err(),
            Error::WorkspaceClosed
        ));
    }
}
