//! The store driver contract.
//!
//! Every backend implements these traits. They are deliberately minimal:
//! blocking calls, one record at a time, no query planning. Higher layers
//! build cursors and deferred writes on top.

use std::any::Any;
use std::collections::BTreeSet;

use crate::{Bounds, RawFeature, SchemaDescriptor, StoreError};

/// A predicate over raw records, supplied by the caller of a read.
///
/// The core layer's `Filter` implements this; drivers only ever need to
/// call `matches`. Predicates are side-effect-free.
pub trait RecordPredicate: Send + Sync {
    fn matches(&self, record: &RawFeature) -> bool;

    /// A human-readable rendering for diagnostics.
    fn describe(&self) -> String;
}

/// A predicate that matches every record.
pub struct AllRecords;

impl RecordPredicate for AllRecords {
    fn matches(&self, _record: &RawFeature) -> bool {
        true
    }

    fn describe(&self) -> String {
        "INCLUDE".to_string()
    }
}

/// A streaming read handle over raw records.
///
/// Single pass. `has_next` must be cheap to call repeatedly; `next` is only
/// valid after `has_next` returned true. `close` releases the underlying
/// resource and is idempotent.
///
/// # Object Safety
///
/// This trait is object-safe: drivers return `Box<dyn RawFeatureReader>`.
pub trait RawFeatureReader: Send {
    fn has_next(&mut self) -> Result<bool, StoreError>;

    fn next(&mut self) -> Result<RawFeature, StoreError>;

    fn close(&mut self);
}

/// A streaming write handle scoped to a set of existing records.
///
/// The protocol follows read-modify-write: `next` yields a mutable view of
/// the store's current record, the caller edits it in place, and `write`
/// commits the edit. Records not visited or not written are left untouched.
pub trait RawFeatureWriter: Send {
    fn has_next(&mut self) -> Result<bool, StoreError>;

    /// Advance to the next record and return it for editing.
    fn next(&mut self) -> Result<&mut RawFeature, StoreError>;

    /// Commit the current record back to the store.
    fn write(&mut self) -> Result<(), StoreError>;

    fn close(&mut self) -> Result<(), StoreError>;
}

/// One named collection of records within a store.
pub trait FeatureSource: Send {
    fn name(&self) -> &str;

    fn schema(&self) -> Result<SchemaDescriptor, StoreError>;

    /// The number of records matching the filter, or `None` when the driver
    /// cannot count without a full scan.
    fn count(&self, filter: &dyn RecordPredicate) -> Result<Option<usize>, StoreError>;

    /// The bounds of records matching the filter, or `None` when the driver
    /// cannot compute bounds (callers fall back to manual union).
    fn bounds(&self, filter: &dyn RecordPredicate) -> Result<Option<Bounds>, StoreError>;

    /// Add a batch of records; ids on the inputs are advisory and the store
    /// returns the identifiers it actually assigned, in input order.
    fn add_features(&mut self, batch: Vec<RawFeature>) -> Result<Vec<String>, StoreError>;

    /// Remove all records matching the filter, returning how many went away.
    fn remove_features(&mut self, filter: &dyn RecordPredicate) -> Result<usize, StoreError>;

    fn feature_reader(
        &self,
        filter: Box<dyn RecordPredicate>,
    ) -> Result<Box<dyn RawFeatureReader>, StoreError>;

    /// A writer over exactly the records with the given ids (auto-commit
    /// per `write` call).
    fn feature_writer(
        &mut self,
        ids: &BTreeSet<String>,
    ) -> Result<Box<dyn RawFeatureWriter>, StoreError>;
}

/// A connection to one backing store holding named feature sources.
///
/// # Object Safety
///
/// This trait is object-safe: workspaces hold `Box<dyn DataStore>`.
pub trait DataStore: Send {
    fn names(&self) -> Result<Vec<String>, StoreError>;

    fn feature_source(&self, name: &str) -> Result<Box<dyn FeatureSource>, StoreError>;

    fn create_schema(&mut self, schema: &SchemaDescriptor) -> Result<(), StoreError>;

    /// Downcasting hook for wrap predicates in the workspace registry.
    fn as_any(&self) -> &dyn Any;
}

// Blanket implementations for boxes

impl RawFeatureReader for Box<dyn RawFeatureReader> {
    fn has_next(&mut self) -> Result<bool, StoreError> {
        self.as_mut().has_next()
    }

    fn next(&mut self) -> Result<RawFeature, StoreError> {
        self.as_mut().next()
    }

    fn close(&mut self) {
        self.as_mut().close()
    }
}
