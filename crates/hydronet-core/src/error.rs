//! Error types for the normalization and association pipeline.
//!
//! Structured with `thiserror` so every failure carries its context (layer,
//! column, table) instead of a bare message. The taxonomy mirrors the
//! propagation policy: [`ConfigError`] and [`StoreError`] abort a run,
//! [`LayerError`] aborts exactly one layer, and per-feature problems are
//! not errors at all; they are counted drops in the run summary.

use std::path::PathBuf;
use thiserror::Error;

/// Root error type for Hydronet operations.
#[derive(Debug, Error)]
pub enum HydronetError {
    /// Invalid layer configuration; nothing has been processed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Target-store failure; the only fatal condition during a run.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A single-layer failure, surfaced when a caller runs one layer
    /// directly rather than through the pipeline summary.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// Generic errors from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Layer-configuration errors, raised before any feature is read.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two layer specs share a name.
    #[error("duplicate layer name '{name}' in configuration")]
    DuplicateLayer {
        /// The repeated layer name.
        name: String,
    },

    /// Two layer specs resolve to the same target table.
    #[error("layers '{first}' and '{second}' both write table '{table}'")]
    DuplicateTable {
        /// First layer using the table.
        first: String,
        /// Second layer using the table.
        second: String,
        /// The contested table name.
        table: String,
    },

    /// A spec retains no source columns and is not geometry-only.
    #[error("layer '{layer}' retains no source columns (set geometry_only to allow this)")]
    EmptyColumnList {
        /// The offending layer.
        layer: String,
    },

    /// Tolerance must be a finite positive number of storage-CRS units.
    #[error("layer '{layer}' has invalid tolerance {value}")]
    InvalidTolerance {
        /// The offending layer.
        layer: String,
        /// The rejected value.
        value: f64,
    },

    /// A coordinate system pair could not be instantiated.
    #[error("cannot build transform EPSG:{source_epsg} -> EPSG:{target_epsg}: {message}")]
    Crs {
        /// Source EPSG code.
        source_epsg: u32,
        /// Target EPSG code.
        target_epsg: u32,
        /// Underlying PROJ message.
        message: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("failed to load configuration '{path}': {message}")]
    Load {
        /// Path of the configuration file.
        path: PathBuf,
        /// Parse or I/O detail.
        message: String,
    },
}

/// Target-store errors. Opening failures abort the run immediately since no
/// output is trustworthy without a writable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened for writing.
    #[error("cannot open target store '{path}': {source}")]
    Open {
        /// Store path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// Errors scoped to a single layer. The pipeline records them in the layer
/// outcome and moves on to the next layer.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The source layer is absent or unreadable.
    #[error("cannot read source layer '{layer}': {source}")]
    SourceRead {
        /// The layer name in the source dataset.
        layer: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// A column named by the spec does not exist in the source layer.
    #[error("source layer '{layer}' is missing required column '{column}'")]
    SchemaMismatch {
        /// The layer name.
        layer: String,
        /// The missing column.
        column: String,
    },

    /// Writing the normalized table failed.
    #[error("cannot write table '{table}' for layer '{layer}': {source}")]
    Write {
        /// The layer name.
        layer: String,
        /// The target table.
        table: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

/// Type alias for Results using [`HydronetError`].
pub type Result<T> = std::result::Result<T, HydronetError>;

impl HydronetError {
    /// A one-line operator-facing description, used by the CLI so the last
    /// word of a failed run is never a bare debug dump.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Store(e) => format!("Target store error: {e}"),
            Self::Layer(e) => format!("Layer error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = LayerError::SchemaMismatch {
            layer: "wHydrant".to_string(),
            column: "tag".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "source layer 'wHydrant' is missing required column 'tag'"
        );

        let err: HydronetError = ConfigError::InvalidTolerance {
            layer: "chamber".to_string(),
            value: -0.5,
        }
        .into();
        assert!(err.user_message().starts_with("Configuration error"));
    }
}
