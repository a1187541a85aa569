//! `hydronet-core` is the engine of the Hydronet toolkit: it normalizes
//! heterogeneous water-utility GIS datasets into canonical per-asset tables
//! and associates point assets with the pipe network they belong to.
//!
//! The crate is organized around two independently invokable operations:
//!
//! - **Normalization** ([`pipeline::run`]): per [`spec::LayerSpec`], read a
//!   source layer, map it onto the normalized schema (retained text-cast
//!   columns, derived columns, dual-CRS geometry), and write it into the
//!   target store under overwrite semantics.
//! - **Association** ([`associate::associate_layers`]): match normalized
//!   point layers against the line network through an R-tree index, with a
//!   tolerance-buffered fallback and ambiguity exclusion.
//!
//! The association engine reads only normalized tables, so it is oblivious
//! to the original source format.

pub mod associate;
pub mod error;
pub mod mapper;
pub mod pipeline;
pub mod report;
pub mod reproject;
pub mod source;
pub mod spec;

pub use error::{ConfigError, HydronetError, LayerError, Result, StoreError};
pub use report::{AssociationReport, LayerOutcome, RunSummary};
pub use spec::{LayerSpec, PipelineConfig};

// The GeoPackage store is the default normalized target; re-exported so
// thin callers (the CLI) need only this crate.
pub use hydronet_geopackage::{GpkgSource, GpkgStore};
