//! Error types for the driver layer.
//!
//! Errors at this level are transport-focused. No semantic errors like
//! "no matching type for config" or "schema mismatch" - those belong in
//! higher layers.

/// Errors raised by store drivers.
///
/// These are transport and system-level errors only. Resolution failures,
/// schema mismatches, and projection errors belong in higher layers.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Generic I/O failure from the backing medium.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The named layer does not exist in the store.
    #[error("no such layer: '{name}'")]
    NoSuchLayer { name: String },

    /// A layer with this name already exists in the store.
    #[error("layer '{name}' already exists")]
    LayerExists { name: String },

    /// The operation is not supported by this driver.
    ///
    /// For example, writing to a read-only store.
    #[error("operation not supported")]
    NotSupported,

    /// A record in the backing medium could not be interpreted.
    #[error("corrupt record: {message}")]
    Corrupt { message: String },

    /// Driver-specific failure with a message.
    #[error("{message}")]
    Backend { message: String },
}

impl StoreError {
    /// Shorthand for a driver-specific failure.
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    /// Shorthand for a corrupt-record failure.
    pub fn corrupt(message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_layer_name() {
        let e = StoreError::NoSuchLayer {
            name: "roads".to_string(),
        };
        assert!(format!("{}", e).contains("roads"));

        let e = StoreError::LayerExists {
            name: "roads".to_string(),
        };
        assert!(format!("{}", e).contains("roads"));
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::other("disk on fire");
        let e: StoreError = io.into();
        assert!(matches!(e, StoreError::Io(_)));
        assert!(format!("{}", e).contains("disk on fire"));
    }
}
