//! GeoJSON directory store backend.
//!
//! Each layer is one `<name>.geojson` file under the store's root
//! directory: a standard FeatureCollection carrying the layer's schema
//! descriptor as a `schema` foreign member. Simple, inspectable, and
//! diffable; not built for large layers, since every operation reads
//! (and every mutation rewrites) the whole file.
//!
//! # Example
//!
//! ```rust,no_run
//! use geostore_geojson::DirectoryStore;
//! use geostore_driver::DataStore;
//!
//! let store = DirectoryStore::new("/data/layers")?;
//! for name in store.names()? {
//!     println!("{}", name);
//! }
//! # Ok::<(), geostore_driver::StoreError>(())
//! ```

mod codec;
mod directory;

pub use codec::{shape_from_geojson, shape_to_geojson, value_from_json, value_to_json};
pub use directory::DirectoryStore;
