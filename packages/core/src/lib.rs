//! Core geostore: the semantic access layer.
//!
//! This layer adds meaning to the raw records of the store drivers:
//! - `Geometry`, `Feature`, `Schema`, `Filter`, `Style`: typed value
//!   objects constructed from plain configuration
//! - `TypeRegistry`: ordered capability-predicate dispatch resolving a
//!   configuration object to a concrete kind
//! - `Cursor`: single-pass, lazily opened iteration over store records
//! - `Layer` / `Workspace`: queries, batched writes, and deferred
//!   field-level updates over one store connection
//!
//! # Example
//!
//! ```rust,no_run
//! use geostore_core::{Filter, Workspace};
//!
//! fn first_name(workspace: &Workspace) -> Result<Option<String>, geostore_core::Error> {
//!     let layer = match workspace.layer("cities")? {
//!         Some(layer) => layer,
//!         None => return Ok(None),
//!     };
//!     Ok(layer
//!         .query(Filter::Pass)?
//!         .first()
//!         .and_then(|f| f.get("name").ok().and_then(|v| v.as_str().map(String::from))))
//! }
//! ```

mod cursor;
mod error;
pub mod feature;
pub mod filter;
pub mod geom;
mod layer;
mod proj;
pub mod registry;
mod schema;
pub mod style;
pub mod workspace;

pub use cursor::Cursor;
pub use error::Error;
pub use feature::{Binding, DirtyIndex, Feature};
pub use filter::{ExpressionParser, Filter, NoParser, PredicateHandle};
pub use geom::Geometry;
pub use layer::{AddTarget, GetTarget, Layer, RemoveTarget, SharedStore};
pub use proj::{
    identity_provider, transform_shape, IdentityProjections, Projection, ProjectionLookup,
    ProjectionProvider, TransformFn,
};
pub use registry::{Entry, TypeRegistry};
pub use schema::{Field, Schema};
pub use style::{default_style, Style, Symbolizer};
pub use workspace::{AddLayerOptions, Workspace};

// Re-export driver types for convenience
pub use geostore_driver::{
    Bounds, Coord, DataStore, FieldKind, GeometryKind, RawFeature, Shape, StoreError, Value,
};
