//! Driver layer: the backing record model and the minimal store contract.
//!
//! This layer defines what every store backend must speak:
//! - `Value`: a typed attribute value
//! - `Shape` / `Coord` / `Bounds`: backing geometry representation
//! - `FieldKind` / `FieldDescriptor` / `SchemaDescriptor`: plain schema
//!   descriptors drivers can persist
//! - `RawFeature`: a record as drivers see it
//! - `DataStore` / `FeatureSource` / `RawFeatureReader` / `RawFeatureWriter`:
//!   the blocking store contract
//!
//! Errors at this level are transport-focused (`StoreError`). Semantic
//! errors (resolution failures, schema mismatches) belong to the core layer.

mod bounds;
mod error;
mod geometry;
mod record;
mod schema;
mod traits;
mod value;

pub use bounds::Bounds;
pub use error::StoreError;
pub use geometry::{Coord, GeometryKind, Shape};
pub use record::RawFeature;
pub use schema::{FieldDescriptor, FieldKind, SchemaDescriptor};
pub use traits::{
    AllRecords, DataStore, FeatureSource, RawFeatureReader, RawFeatureWriter, RecordPredicate,
};
pub use value::Value;
