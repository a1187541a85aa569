//! GeoPackage geometry blob codec.

use anyhow::{Context, Result};
use geo_types::Geometry;
use geozero::wkb::{GpkgWkb, WkbDialect, WkbWriter};
use geozero::{CoordDimensions, GeozeroGeometry, ToGeo};

/// Encodes geometry as a GeoPackage binary blob (GP header + WKB).
///
/// # Errors
///
/// Returns an error if the geometry cannot be serialized.
pub fn encode_gpkg_geometry(geometry: &Geometry<f64>, srs_id: i32) -> Result<Vec<u8>> {
    let mut blob: Vec<u8> = Vec::new();
    let mut writer = WkbWriter::with_opts(
        &mut blob,
        WkbDialect::Geopackage,
        CoordDimensions::xy(),
        Some(srs_id),
        Vec::new(),
    );
    geometry
        .process_geom(&mut writer)
        .context("failed to encode GeoPackage geometry blob")?;
    Ok(blob)
}

/// Decodes a GeoPackage binary blob into geometry.
///
/// # Errors
///
/// Returns an error if the blob is not valid GeoPackage WKB.
pub fn decode_gpkg_geometry(blob: &[u8]) -> Result<Geometry<f64>> {
    GpkgWkb(blob)
        .to_geo()
        .context("failed to decode GeoPackage geometry blob")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Coord, LineString, Point};

    #[test]
    fn point_roundtrip() {
        let geom = Geometry::Point(Point::new(531000.25, 181000.5));
        let blob = encode_gpkg_geometry(&geom, 27700).unwrap();
        // GeoPackage magic
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(decode_gpkg_geometry(&blob).unwrap(), geom);
    }

    #[test]
    fn linestring_roundtrip() {
        let geom = Geometry::LineString(LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 5.0 },
        ]));
        let blob = encode_gpkg_geometry(&geom, 4326).unwrap();
        assert_eq!(decode_gpkg_geometry(&blob).unwrap(), geom);
    }

    #[test]
    fn garbage_blob_is_rejected() {
        assert!(decode_gpkg_geometry(b"not a geometry").is_err());
    }
}
