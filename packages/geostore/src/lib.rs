//! Geostore: a uniform interface for geospatial feature data.
//!
//! Geometries, features, filters, styles, and workspaces are constructed
//! from plain configuration objects without naming a concrete backing
//! implementation; queries stream through pull-based cursors; local
//! edits are staged per feature and flushed as minimal batched writes.
//!
//! This crate ties the layers together: it re-exports the core object
//! model, links in the built-in store backends, and seeds the workspace
//! registry with them.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//!
//! let workspace = geostore::connect(&json!({"type": "memory"})).unwrap();
//! assert!(workspace.names().unwrap().is_empty());
//! ```

use std::sync::Once;

use serde_json::Value as Json;

pub use geostore_core::{
    feature, filter, geom, registry, style, workspace, AddLayerOptions, AddTarget, Binding,
    Bounds, Coord, Cursor, DataStore, Entry, Error, ExpressionParser, Feature, Field, FieldKind,
    Filter, Geometry, GeometryKind, GetTarget, Layer, NoParser, PredicateHandle, Projection,
    ProjectionLookup, ProjectionProvider, RawFeature, RemoveTarget, Schema, Shape, StoreError,
    Style, Symbolizer, TypeRegistry, Value, Workspace,
};
pub use geostore_geojson::DirectoryStore;
pub use geostore_memory::MemoryStore;

static SEED: Once = Once::new();

/// Seed the workspace registry with the built-in kinds: memory first,
/// then directory. Idempotent; called by [`connect`] and
/// [`from_store`], so it only needs calling directly when going through
/// `geostore_core::workspace` by hand.
pub fn register_default_workspaces() {
    SEED.call_once(|| {
        workspace::register(
            Entry::new(
                "memory",
                |config: &Json| {
                    config.get("type").and_then(Json::as_str) == Some("memory")
                        || config.as_object().is_some_and(|o| o.is_empty())
                },
                |_config| Ok(Workspace::new(Box::new(MemoryStore::new()))),
            )
            .wrapping(
                |handle: &Box<dyn DataStore>| handle.as_any().is::<MemoryStore>(),
                |handle| Ok(Workspace::new(handle)),
            ),
        );
        workspace::register(
            Entry::new(
                "directory",
                |config: &Json| {
                    config.is_string()
                        || config.get("type").and_then(Json::as_str) == Some("directory")
                },
                |config| {
                    let path = config
                        .as_str()
                        .or_else(|| config.get("path").and_then(Json::as_str))
                        .ok_or_else(|| {
                            Error::invalid("directory workspace config must name a 'path'")
                        })?;
                    let store = DirectoryStore::new(path)?;
                    Ok(Workspace::new(Box::new(store)))
                },
            )
            .wrapping(
                |handle: &Box<dyn DataStore>| handle.as_any().is::<DirectoryStore>(),
                |handle| Ok(Workspace::new(handle)),
            ),
        );
    });
}

/// Resolve a configuration object to a workspace over the matching
/// backend. A bare string is a directory path; `{"type": "memory"}` or
/// an empty object is an in-memory workspace.
pub fn connect(config: &Json) -> Result<Workspace, Error> {
    register_default_workspaces();
    workspace::create(config)
}

/// Lift an already-open store connection into a workspace.
pub fn from_store(store: Box<dyn DataStore>) -> Result<Workspace, Error> {
    register_default_workspaces();
    workspace::from_store_handle(store)
}

/// A layer backed by a throwaway in-memory workspace, for scratch data
/// and tests. The backing store lives as long as the layer does.
pub fn temporary_layer(schema: &Schema) -> Result<Layer, Error> {
    let workspace = Workspace::new(Box::new(MemoryStore::new()));
    workspace.create_layer(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connect_resolves_memory_configs() {
        let ws = connect(&json!({"type": "memory"})).unwrap();
        assert!(!ws.is_closed());
        let empty = connect(&json!({})).unwrap();
        assert!(!empty.is_closed());
    }

    #[test]
    fn connect_rejects_unknown_configs() {
        assert!(matches!(
            connect(&json!({"type": "oracle"})),
            Err(Error::Resolution { .. })
        ));
    }

    #[test]
    fn from_store_wraps_a_live_memory_handle() {
        let ws = from_store(Box::new(MemoryStore::new())).unwrap();
        assert!(ws.names().unwrap().is_empty());
    }

    #[test]
    fn temporary_layer_is_immediately_usable() {
        let schema = Schema::new(
            "scratch",
            vec![Field::new("name", FieldKind::String)],
        )
        .unwrap();
        let layer = temporary_layer(&schema).unwrap();
        let mut values = std::collections::BTreeMap::new();
        values.insert("name".to_string(), Value::from("x"));
        layer.add(values).unwrap();
        assert_eq!(layer.count(Filter::Pass).unwrap(), 1);
    }
}
