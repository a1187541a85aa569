//! GeoPackage adapter: read access for normalized (or third-party) feature
//! tables and the writable target store of the normalization pipeline.
//!
//! Built directly on `rusqlite`; geometries travel as GeoPackage WKB blobs
//! encoded and decoded with `geozero`. The store maintains the OGC catalog
//! tables (`gpkg_spatial_ref_sys`, `gpkg_contents`,
//! `gpkg_geometry_columns`) so the output opens in QGIS and `ogrinfo`
//! without ceremony.

mod geom;
mod source;
mod store;

pub use geom::{decode_gpkg_geometry, encode_gpkg_geometry};
pub use source::GpkgSource;
pub use store::GpkgStore;
