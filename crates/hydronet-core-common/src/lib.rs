//! `hydronet-core-common` holds the shared vocabulary of the Hydronet
//! pipeline: attribute values, source features, normalized records, and the
//! traits that decouple the core engine from concrete dataset formats.
//!
//! Format adapters (shapefile directories, GeoPackages, WKT/XY CSV tables)
//! implement [`VectorSource`]; writable normalized stores implement
//! [`RecordSink`]. The core crate depends only on these traits, so a new
//! source format plugs in without touching the engine.

pub mod io;
pub mod types;

pub use io::{FeatureStream, MemoryLayer, MemorySource, RecordSink, VectorSource};
pub use types::{ColumnSpec, ColumnType, Feature, GeometryType, NormalizedRecord, TableSchema, Value};
