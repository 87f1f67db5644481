//! Error types for the core layer.
//!
//! These are the user-facing taxonomy. Driver errors are wrapped; the one
//! place a driver error is deliberately not surfaced is inside
//! `Cursor::has_next`, which downgrades stream errors to end-of-stream.

use geostore_driver::StoreError;

/// Errors at the core layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No registered predicate matched the configuration object.
    #[error("no matching type for config: {message}")]
    Resolution { message: String },

    /// An operation referenced a field absent from the bound schema.
    #[error("schema '{schema}' has no field named '{field}'")]
    SchemaMismatch { schema: String, field: String },

    /// A value's runtime type does not match its field's declared kind.
    #[error("value for field '{field}' is not a {expected}")]
    TypeMismatch { field: String, expected: String },

    /// A failure from a store driver call.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A layer with this name already exists in the target workspace.
    #[error("layer '{name}' already exists in the workspace")]
    Conflict { name: String },

    /// A geometry is missing a projection required for a transform, or a
    /// projection identifier could not be resolved.
    #[error("projection error: {message}")]
    Projection { message: String },

    /// A filter expression could not be parsed.
    #[error("filter error: {message}")]
    Filter { message: String },

    /// The owning workspace has been closed.
    #[error("workspace is closed")]
    WorkspaceClosed,

    /// Malformed configuration or values.
    #[error("{message}")]
    Invalid { message: String },
}

impl Error {
    pub fn resolution(message: impl Into<String>) -> Self {
        Error::Resolution {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid {
            message: message.into(),
        }
    }

    pub fn projection(message: impl Into<String>) -> Self {
        Error::Projection {
            message: message.into(),
        }
    }

    pub fn filter(message: impl Into<String>) -> Self {
        Error::Filter {
            message: message.into(),
        }
    }
}
