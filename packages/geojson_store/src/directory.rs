//! A feature store over a directory of GeoJSON files.

use std::collections::BTreeSet;
use std::{fs, path};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value as Json};

use geostore_driver::{
    Bounds, DataStore, FeatureSource, RawFeature, RawFeatureReader, RawFeatureWriter,
    RecordPredicate, SchemaDescriptor, StoreError,
};

use crate::codec;

const EXTENSION: &str = "geojson";

fn valid_layer_name(name: &str) -> bool {
    lazy_static! {
        static ref LAYER_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").unwrap();
    }
    LAYER_NAME.is_match(name)
}

/// A feature store keeping one `<layer>.geojson` FeatureCollection per
/// layer under a root directory.
///
/// The file carries the layer's schema descriptor as a `schema` foreign
/// member, so properties are read back with their declared kinds. Every
/// operation is a whole-file read (and write, for mutations); writes
/// commit per batch.
pub struct DirectoryStore {
    root: path::PathBuf,
}

impl DirectoryStore {
    /// Open a store over an existing, writable directory.
    pub fn new(root: impl Into<path::PathBuf>) -> Result<DirectoryStore, StoreError> {
        let root = root.into();
        let attr = fs::metadata(&root)?;
        if !attr.is_dir() {
            return Err(StoreError::backend(format!(
                "store root '{}' must be a directory",
                root.display()
            )));
        }
        if attr.permissions().readonly() {
            return Err(StoreError::backend(format!(
                "store root '{}' must be writable",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        Ok(DirectoryStore { root })
    }

    pub fn root(&self) -> &path::Path {
        &self.root
    }

    fn layer_path(&self, name: &str) -> path::PathBuf {
        self.root.join(format!("{}.{}", name, EXTENSION))
    }
}

impl DataStore for DirectoryStore {
    fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file = entry.path();
            if file.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                if valid_layer_name(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        Ok(names)
    }

    fn feature_source(&self, name: &str) -> Result<Box<dyn FeatureSource>, StoreError> {
        if !valid_layer_name(name) {
            return Err(StoreError::backend(format!(
                "'{}' is not a valid layer name",
                name
            )));
        }
        let file = self.layer_path(name);
        if !file.exists() {
            return Err(StoreError::NoSuchLayer {
                name: name.to_string(),
            });
        }
        Ok(Box::new(GeoJsonSource {
            name: name.to_string(),
            file,
        }))
    }

    fn create_schema(&mut self, schema: &SchemaDescriptor) -> Result<(), StoreError> {
        if !valid_layer_name(&schema.name) {
            return Err(StoreError::backend(format!(
                "'{}' is not a valid layer name",
                schema.name
            )));
        }
        let file = self.layer_path(&schema.name);
        if file.exists() {
            return Err(StoreError::LayerExists {
                name: schema.name.clone(),
            });
        }
        let layer = ParsedLayer {
            schema: schema.clone(),
            records: Vec::new(),
        };
        layer.save(&file)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A whole file, parsed: the schema foreign member plus every feature.
struct ParsedLayer {
    schema: SchemaDescriptor,
    records: Vec<RawFeature>,
}

impl ParsedLayer {
    fn load(file: &path::Path) -> Result<ParsedLayer, StoreError> {
        log::debug!("Reading {}...", file.display());
        let text = fs::read_to_string(file)?;
        let document: Json = serde_json::from_str(&text)
            .map_err(|e| StoreError::corrupt(format!("{}: {}", file.display(), e)))?;
        if document.get("type").and_then(Json::as_str) != Some("FeatureCollection") {
            return Err(StoreError::corrupt(format!(
                "{}: not a FeatureCollection",
                file.display()
            )));
        }
        let schema: SchemaDescriptor = document
            .get("schema")
            .cloned()
            .ok_or_else(|| {
                StoreError::corrupt(format!("{}: missing 'schema' member", file.display()))
            })
            .and_then(|member| {
                serde_json::from_value(member)
                    .map_err(|e| StoreError::corrupt(format!("{}: bad schema: {}", file.display(), e)))
            })?;
        let features = document
            .get("features")
            .and_then(Json::as_array)
            .ok_or_else(|| {
                StoreError::corrupt(format!("{}: missing 'features' member", file.display()))
            })?;
        let records = features
            .iter()
            .map(|feature| decode_feature(feature, &schema))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParsedLayer { schema, records })
    }

    fn save(&self, file: &path::Path) -> Result<(), StoreError> {
        log::debug!("Writing {}...", file.display());
        let features: Vec<Json> = self
            .records
            .iter()
            .map(|record| encode_feature(record, &self.schema))
            .collect();
        let document = json!({
            "type": "FeatureCollection",
            "schema": serde_json::to_value(&self.schema)
                .map_err(|e| StoreError::backend(format!("schema did not serialize: {}", e)))?,
            "features": features,
        });
        let text = serde_json::to_string_pretty(&document)
            .map_err(|e| StoreError::backend(format!("document did not serialize: {}", e)))?;
        fs::write(file, text)?;
        Ok(())
    }

    /// The next unused numeric id suffix for `<layer>.<n>` ids.
    fn next_id(&self, layer: &str) -> u64 {
        let prefix = format!("{}.", layer);
        self.records
            .iter()
            .filter_map(|r| r.id.strip_prefix(&prefix))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1)
    }
}

/// The schema's first geometry field carries the GeoJSON `geometry`
/// member; everything else lives in `properties`.
fn geometry_field(schema: &SchemaDescriptor) -> Option<&str> {
    schema
        .fields
        .iter()
        .find(|f| f.kind.is_geometry())
        .map(|f| f.name.as_str())
}

fn encode_feature(record: &RawFeature, schema: &SchemaDescriptor) -> Json {
    let geometry_name = geometry_field(schema);
    let geometry = geometry_name
        .map(|name| codec::value_to_json(record.get(name)))
        .unwrap_or(Json::Null);
    let mut properties = serde_json::Map::new();
    for (name, value) in &record.values {
        if Some(name.as_str()) == geometry_name {
            continue;
        }
        properties.insert(name.clone(), codec::value_to_json(value));
    }
    json!({
        "type": "Feature",
        "id": record.id,
        "geometry": geometry,
        "properties": Json::Object(properties),
    })
}

fn decode_feature(member: &Json, schema: &SchemaDescriptor) -> Result<RawFeature, StoreError> {
    let id = member
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| StoreError::corrupt("feature has no string 'id'"))?;
    let mut record = RawFeature::new(id);
    if let (Some(name), Some(geometry)) = (geometry_field(schema), member.get("geometry")) {
        if !geometry.is_null() {
            let kind = schema
                .fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.kind)
                .unwrap_or(geostore_driver::FieldKind::Geometry);
            record.set(name, codec::value_from_json(geometry, kind)?);
        }
    }
    if let Some(properties) = member.get("properties").and_then(Json::as_object) {
        for (name, value) in properties {
            let kind = match schema.fields.iter().find(|f| f.name == *name) {
                Some(field) => field.kind,
                // a property the schema does not declare is a mangled file
                None => {
                    return Err(StoreError::corrupt(format!(
                        "property '{}' is not in the schema",
                        name
                    )))
                }
            };
            record.set(name.clone(), codec::value_from_json(value, kind)?);
        }
    }
    Ok(record)
}

struct GeoJsonSource {
    name: String,
    file: path::PathBuf,
}

impl FeatureSource for GeoJsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Result<SchemaDescriptor, StoreError> {
        Ok(ParsedLayer::load(&self.file)?.schema)
    }

    fn count(&self, filter: &dyn RecordPredicate) -> Result<Option<usize>, StoreError> {
        let layer = ParsedLayer::load(&self.file)?;
        Ok(Some(
            layer.records.iter().filter(|r| filter.matches(r)).count(),
        ))
    }

    fn bounds(&self, filter: &dyn RecordPredicate) -> Result<Option<Bounds>, StoreError> {
        let layer = ParsedLayer::load(&self.file)?;
        let mut union: Option<Bounds> = None;
        for record in layer.records.iter().filter(|r| filter.matches(r)) {
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
        let mut layer = ParsedLayer::load(&self.file)?;
        let mut next = layer.next_id(&self.name);
        let mut ids = Vec::with_capacity(batch.len());
        for mut record in batch {
            record.id = format!("{}.{}", self.name, next);
            next += 1;
            ids.push(record.id.clone());
            layer.records.push(record);
        }
        layer.save(&self.file)?;
        Ok(ids)
    }

    fn remove_features(&mut self, filter: &dyn RecordPredicate) -> Result<usize, StoreError> {
        let mut layer = ParsedLayer::load(&self.file)?;
        let before = layer.records.len();
        layer.records.retain(|r| !filter.matches(r));
        let removed = before - layer.records.len();
        if removed > 0 {
            layer.save(&self.file)?;
        }
        Ok(removed)
    }

    fn feature_reader(
        &self,
        filter: Box<dyn RecordPredicate>,
    ) -> Result<Box<dyn RawFeatureReader>, StoreError> {
        let layer = ParsedLayer::load(&self.file)?;
        let records: Vec<RawFeature> = layer
            .records
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        Ok(Box::new(FileReader { records, at: 0 }))
    }

    fn feature_writer(
        &mut self,
        ids: &BTreeSet<String>,
    ) -> Result<Box<dyn RawFeatureWriter>, StoreError> {
        let layer = ParsedLayer::load(&self.file)?;
        let scoped = layer
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| ids.contains(&r.id))
            .map(|(i, _)| i)
            .collect();
        Ok(Box::new(FileWriter {
            file: self.file.clone(),
            layer,
            scoped,
            at: 0,
            started: false,
        }))
    }
}

struct FileReader {
    records: Vec<RawFeature>,
    at: usize,
}

impl RawFeatureReader for FileReader {
    fn has_next(&mut self) -> Result<bool, StoreError> {
        Ok(self.at < self.records.len())
    }

    fn next(&mut self) -> Result<RawFeature, StoreError> {
        if self.at >= self.records.len() {
            return Err(StoreError::backend("read past the end of the file"));
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

/// Edits records in a parsed copy of the file; each `write` saves the
/// whole document (auto-commit per record).
struct FileWriter {
    file: path::PathBuf,
    layer: ParsedLayer,
    scoped: Vec<usize>,
    at: usize,
    started: bool,
}

impl RawFeatureWriter for FileWriter {
    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.started {
            self.at += 1;
        }
        self.started = true;
        Ok(self.at < self.scoped.len())
    }

    fn next(&mut self) -> Result<&mut RawFeature, StoreError> {
        let index = *self
            .scoped
            .get(self.at)
            .ok_or_else(|| StoreError::backend("writer has no current record"))?;
        Ok(&mut self.layer.records[index])
    }

    fn write(&mut self) -> Result<(), StoreError> {
        self.layer.save(&self.file)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
