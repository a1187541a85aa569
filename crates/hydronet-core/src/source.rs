//! Source dataset dispatch and auditing.
//!
//! The pipeline consumes any [`VectorSource`]; this module picks the right
//! adapter for a path (shapefile directory vs GeoPackage) and provides the
//! layer audit behind the CLI's `layers` command.

use std::path::Path;

use anyhow::{Result, anyhow};
use geo_types::Geometry;
use hydronet_core_common::VectorSource;
use hydronet_csv::{CsvGeometry, CsvTableSource};
use hydronet_geopackage::GpkgSource;
use hydronet_shapefile::ShapefileSource;
use log::info;

/// Supported source dataset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// A `.shp` file or a directory of them.
    Shapefile,
    /// A GeoPackage file.
    Geopackage,
}

impl SourceFormat {
    /// Parses a format name as given on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "shapefile" | "shp" => Ok(SourceFormat::Shapefile),
            "geopackage" | "gpkg" => Ok(SourceFormat::Geopackage),
            other => Err(anyhow!(
                "unknown source format '{other}' (expected 'shapefile' or 'gpkg')"
            )),
        }
    }

    /// Infers the format from a path: `.gpkg` files are GeoPackages,
    /// `.shp` files and directories are shapefile datasets.
    #[must_use]
    pub fn infer(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(SourceFormat::Shapefile);
        }
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "gpkg" => Some(SourceFormat::Geopackage),
            "shp" => Some(SourceFormat::Shapefile),
            _ => None,
        }
    }
}

/// Opens a source dataset with an explicit or inferred format.
///
/// # Errors
///
/// Returns an error when the format cannot be inferred or the dataset
/// cannot be opened.
pub fn open_source(path: &Path, format: Option<SourceFormat>) -> Result<Box<dyn VectorSource>> {
    let format = match format.or_else(|| SourceFormat::infer(path)) {
        Some(format) => format,
        None => {
            return Err(anyhow!(
                "cannot infer source format of '{}'; pass --format",
                path.display()
            ));
        },
    };

    info!("opening {format:?} source '{}'", path.display());
    match format {
        SourceFormat::Shapefile => Ok(Box::new(ShapefileSource::open(path)?)),
        SourceFormat::Geopackage => Ok(Box::new(GpkgSource::open(path)?)),
    }
}

/// Opens a degenerate tabular source: one CSV file with a WKT geometry
/// column, exposed as a single layer.
///
/// # Errors
///
/// Returns an error when the file cannot be opened.
pub fn open_csv_source(
    path: &Path,
    wkt_column: &str,
    epsg: Option<u32>,
) -> Result<Box<dyn VectorSource>> {
    info!("opening CSV table source '{}'", path.display());
    Ok(Box::new(CsvTableSource::new(
        path,
        CsvGeometry::Wkt {
            column: wkt_column.to_string(),
        },
        epsg,
    )))
}

/// One row of a source audit.
#[derive(Debug, Clone)]
pub struct LayerAudit {
    /// Layer name.
    pub name: String,
    /// Feature count.
    pub features: u64,
    /// Distinct geometry classes observed.
    pub geometry_types: Vec<&'static str>,
    /// Declared EPSG code, if any.
    pub epsg: Option<u32>,
}

fn geometry_class(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::Rect(_) | Geometry::Triangle(_) | Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Audits a source dataset: per layer, feature count, geometry classes,
/// and declared CRS.
///
/// With `network_only`, the listing keeps the water-network layers and
/// drops the rest; the `w` prefix marks network layers in the utility
/// exports, and `*Anno` layers are map annotation with no asset value.
///
/// # Errors
///
/// Returns an error if the dataset cannot be enumerated; unreadable
/// individual layers are reported with a zero count rather than failing
/// the audit.
pub fn audit_layers(source: &dyn VectorSource, network_only: bool) -> Result<Vec<LayerAudit>> {
    let mut audits = Vec::new();
    for name in source.layer_names()? {
        if network_only && !(name.starts_with('w') && !name.ends_with("Anno")) {
            continue;
        }

        let mut audit = LayerAudit {
            name: name.clone(),
            features: 0,
            geometry_types: Vec::new(),
            epsg: source.declared_epsg(&name).unwrap_or(None),
        };
        if let Ok(stream) = source.read_layer(&name) {
            for feature in stream.flatten() {
                audit.features += 1;
                if let Some(geometry) = &feature.geometry {
                    let class = geometry_class(geometry);
                    if !audit.geometry_types.contains(&class) {
                        audit.geometry_types.push(class);
                    }
                }
            }
        }
        audits.push(audit);
    }
    Ok(audits)
}
