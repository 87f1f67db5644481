//! In-memory feature store backend.
//!
//! Tables live behind a shared handle, so the sources a store hands out
//! stay usable while the store itself is owned by a workspace. Records
//! keep insertion order; readers iterate a filtered snapshot taken when
//! the reader is opened; writers stage edits per record and apply them
//! on `write()`.
//!
//! # Example
//!
//! ```rust
//! use geostore_memory::MemoryStore;
//! use geostore_driver::{DataStore, FieldDescriptor, FieldKind, SchemaDescriptor};
//!
//! let mut store = MemoryStore::new();
//! store.create_schema(&SchemaDescriptor::new(
//!     "cities".to_string(),
//!     vec![FieldDescriptor::new("name", FieldKind::String)],
//! )).unwrap();
//! assert_eq!(store.names().unwrap(), vec!["cities".to_string()]);
//! ```

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use geostore_driver::{
    Bounds, DataStore, FeatureSource, RawFeature, RawFeatureReader, RawFeatureWriter,
    RecordPredicate, SchemaDescriptor, StoreError,
};

/// One named table: a schema plus its records in insertion order.
struct Table {
    schema: SchemaDescriptor,
    records: Vec<RawFeature>,
    next_id: u64,
}

impl Table {
    fn new(schema: SchemaDescriptor) -> Self {
        Table {
            schema,
            records: Vec::new(),
            next_id: 0,
        }
    }
}

type Tables = Arc<Mutex<BTreeMap<String, Table>>>;

fn lock(tables: &Tables) -> MutexGuard<'_, BTreeMap<String, Table>> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A feature store backed entirely by process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl DataStore for MemoryStore {
    fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.tables).keys().cloned().collect())
    }

    fn feature_source(&self, name: &str) -> Result<Box<dyn FeatureSource>, StoreError> {
        if !lock(&self.tables).contains_key(name) {
            return Err(StoreError::NoSuchLayer {
                name: name.to_string(),
            });
        }
        Ok(Box::new(MemorySource {
            name: name.to_string(),
            tables: Arc::clone(&self.tables),
        }))
    }

    fn create_schema(&mut self, schema: &SchemaDescriptor) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        if tables.contains_key(&schema.name) {
            return Err(StoreError::LayerExists {
                name: schema.name.clone(),
            });
        }
        tables.insert(schema.name.clone(), Table::new(schema.clone()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemorySource {
    name: String,
    tables: Tables,
}

impl MemorySource {
    fn with_table<R>(
        &self,
        f: impl FnOnce(&Table) -> R,
    ) -> Result<R, StoreError> {
        let tables = lock(&self.tables);
        let table = tables.get(&self.name).ok_or_else(|| StoreError::NoSuchLayer {
            name: self.name.clone(),
        })?;
        Ok(f(table))
    }

    fn with_table_mut<R>(
        &self,
        f: impl FnOnce(&mut Table) -> R,
    ) -> Result<R, StoreError> {
        let mut tables = lock(&self.tables);
        let table = tables
            .get_mut(&self.name)
            .ok_or_else(|| StoreError::NoSuchLayer {
                name: self.name.clone(),
            })?;
        Ok(f(table))
    }
}

impl FeatureSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Result<SchemaDescriptor, StoreError> {
        self.with_table(|table| table.schema.clone())
    }

    fn count(&self, filter: &dyn RecordPredicate) -> Result<Option<usize>, StoreError> {
        self.with_table(|table| {
            Some(table.records.iter().filter(|r| filter.matches(r)).count())
        })
    }

    fn bounds(&self, filter: &dyn RecordPredicate) -> Result<Option<Bounds>, StoreError> {
        self.with_table(|table| {
            let mut union: Option<Bounds> = None;
            for record in table.records.iter().filter(|r| filter.matches(r)) {
                if let Some(bounds) = record.bounds() {
                    match union.as_mut() {
                        Some(current) => current.include(&bounds),
                        None => union = Some(bounds),
                    }
                }
            }
            union
        })
    }

    fn add_features(&mut self, batch: Vec<RawFeature>) -> Result<Vec<String>, StoreError> {
        self.with_table_mut(|table| {
            let mut ids = Vec::with_capacity(batch.len());
            for mut record in batch {
                table.next_id += 1;
                record.id = format!("{}.{}", table.schema.name, table.next_id);
                ids.push(record.id.clone());
                table.records.push(record);
            }
            ids
        })
    }

    fn remove_features(&mut self, filter: &dyn RecordPredicate) -> Result<usize, StoreError> {
        self.with_table_mut(|table| {
            let before = table.records.len();
            table.records.retain(|r| !filter.matches(r));
            before - table.records.len()
        })
    }

    fn feature_reader(
        &self,
        filter: Box<dyn RecordPredicate>,
    ) -> Result<Box<dyn RawFeatureReader>, StoreError> {
        let snapshot = self.with_table(|table| {
            table
                .records
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Box::new(SnapshotReader {
            records: snapshot,
            at: 0,
        }))
    }

    fn feature_writer(
        &mut self,
        ids: &BTreeSet<String>,
    ) -> Result<Box<dyn RawFeatureWriter>, StoreError> {
        let scoped = self.with_table(|table| {
            table
                .records
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(Box::new(StagingWriter {
            name: self.name.clone(),
            tables: Arc::clone(&self.tables),
            scoped,
            at: 0,
            started: false,
        }))
    }
}

/// Reads a snapshot taken when the reader was opened; unaffected by
/// concurrent writes.
struct SnapshotReader {
    records: Vec<RawFeature>,
    at: usize,
}

impl RawFeatureReader for SnapshotReader {
    fn has_next(&mut self) -> Result<bool, StoreError> {
        Ok(self.at < self.records.len())
    }

    fn next(&mut self) -> Result<RawFeature, StoreError> {
        if self.at >= self.records.len() {
            return Err(StoreError::backend("read past the end of the snapshot"));
        }
        let record = self.records[self.at].clone();
        self.at += 1;
        Ok(record)
    }

    fn close(&mut self) {
        self.records.clear();
        self.at = 0;
    }
}

/// Stages edits against a scoped copy of the records; each `write` puts
/// the staged record back into the table.
struct StagingWriter {
    name: String,
    tables: Tables,
    scoped: Vec<RawFeature>,
    at: usize,
    started: bool,
}

impl RawFeatureWriter for StagingWriter {
    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.started {
            self.at += 1;
        }
        self.started = true;
        Ok(self.at < self.scoped.len())
    }

    fn next(&mut self) -> Result<&mut RawFeature, StoreError> {
        self.scoped
            .get_mut(self.at)
            .ok_or_else(|| StoreError::backend("writer has no current record"))
    }

    fn write(&mut self) -> Result<(), StoreError> {
        let staged = self
            .scoped
            .get(self.at)
            .ok_or_else(|| StoreError::backend("writer has no current record"))?
            .clone();
        let mut tables = lock(&self.tables);
        let table = tables
            .get_mut(&self.name)
            .ok_or_else(|| StoreError::NoSuchLayer {
                name: self.name.clone(),
            })?;
        match table.records.iter_mut().find(|r| r.id == staged.id) {
            Some(stored) => {
                *stored = staged;
                Ok(())
            }
            None => Err(StoreError::backend(format!(
                "record '{}' disappeared during the write",
                staged.id
            ))),
        }
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.scoped.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geostore_driver::{
        AllRecords, Coord, FieldDescriptor, FieldKind, Shape, Value,
    };

    fn city_descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new(
            "cities".to_string(),
            vec![
                FieldDescriptor::new("geom", FieldKind::Point),
                FieldDescriptor::new("name", FieldKind::String),
            ],
        )
    }

    fn city(name: &str, x: f64, y: f64) -> RawFeature {
        let mut record = RawFeature::new("");
        record.set("name", Value::from(name));
        record.set("geom", Value::from(Shape::Point(Coord::new(x, y))));
        record
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.create_schema(&city_descriptor()).unwrap();
        let mut source = store.feature_source("cities").unwrap();
        source
            .add_features(vec![
                city("Tucson", -110.97, 32.22),
                city("Phoenix", -112.07, 33.45),
            ])
            .unwrap();
        store
    }

    #[test]
    fn create_schema_registers_the_name_once() {
        let mut store = MemoryStore::new();
        store.create_schema(&city_descriptor()).unwrap();
        assert_eq!(store.names().unwrap(), vec!["cities".to_string()]);
        assert!(matches!(
            store.create_schema(&city_descriptor()),
            Err(StoreError::LayerExists { .. })
        ));
    }

    #[test]
    fn unknown_source_is_no_such_layer() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.feature_source("missing"),
            Err(StoreError::NoSuchLayer { .. })
        ));
    }

    #[test]
    fn ids_are_assigned_in_insertion_order() {
        let store = seeded();
        let source = store.feature_source("cities").unwrap();
        let mut reader = source.feature_reader(Box::new(AllRecords)).unwrap();
        assert_eq!(reader.next().unwrap().id, "cities.1");
        assert_eq!(reader.next().unwrap().id, "cities.2");
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn count_and_bounds_are_supported() {
        let store = seeded();
        let source = store.feature_source("cities").unwrap();
        assert_eq!(source.count(&AllRecords).unwrap(), Some(2));
        let bounds = source.bounds(&AllRecords).unwrap().unwrap();
        assert_eq!(bounds.min_x, -112.07);
        assert_eq!(bounds.max_x, -110.97);
    }

    #[test]
    fn reader_iterates_a_snapshot() {
        let store = seeded();
        let source = store.feature_source("cities").unwrap();
        let mut reader = source.feature_reader(Box::new(AllRecords)).unwrap();
        // a write that lands after the reader opened is not observed
        store
            .feature_source("cities")
            .unwrap()
            .add_features(vec![city("Flagstaff", -111.65, 35.20)])
            .unwrap();
        let mut seen = 0;
        while reader.has_next().unwrap() {
            reader.next().unwrap();
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[test]
    fn writer_applies_staged_edits_per_record() {
        let store = seeded();
        let mut source = store.feature_source("cities").unwrap();
        let ids: BTreeSet<String> = ["cities.1".to_string()].into_iter().collect();
        let mut writer = source.feature_writer(&ids).unwrap();
        assert!(writer.has_next().unwrap());
        writer
            .next()
            .unwrap()
            .set("name", Value::from("Old Pueblo"));
        writer.write().unwrap();
        assert!(!writer.has_next().unwrap());
        writer.close().unwrap();

        let mut reader = source
            .feature_reader(Box::new(AllRecords))
            .unwrap();
        let first = reader.next().unwrap();
        assert_eq!(first.get("name").as_str(), Some("Old Pueblo"));
    }

    #[test]
    fn remove_features_reports_how_many() {
        let store = seeded();
        let mut source = store.feature_source("cities").unwrap();
        assert_eq!(source.remove_features(&AllRecords).unwrap(), 2);
        assert_eq!(source.count(&AllRecords).unwrap(), Some(0));
    }

    // The core layer drives this backend end to end; keep one hinge test
    // here so driver-level regressions surface next to the driver.
    #[test]
    fn layers_over_memory_flush_deferred_edits() {
        use geostore_core::{Filter, Workspace};

        let mut store = MemoryStore::new();
        store.create_schema(&city_descriptor()).unwrap();
        let ws = Workspace::new(Box::new(store));
        let layer = ws.layer("cities").unwrap().unwrap();
        let mut values = std::collections::BTreeMap::new();
        values.insert("name".to_string(), Value::from("Tucson"));
        let added = layer.add(values).unwrap();
        let mut feature = layer.get(added.id()).unwrap().unwrap();
        feature.set("name", "Old Pueblo").unwrap();
        layer.update().unwrap();
        let reread = layer.get(added.id()).unwrap().unwrap();
        assert_eq!(
            reread.get("name").unwrap().as_str(),
            Some("Old Pueblo")
        );
        assert!(layer.query(Filter::Pass).unwrap().first().is_some());
    }
}
