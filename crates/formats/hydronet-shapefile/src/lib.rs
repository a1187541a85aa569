//! ESRI Shapefile source adapter.
//!
//! A [`ShapefileSource`] exposes either a single `.shp` file or a directory
//! of them as a vector dataset: one layer per file stem. Attribute records
//! come from the sidecar `.dbf`, the CRS from a best-effort scan of the
//! sidecar `.prj` (shapefile projection files embed the EPSG code in an
//! `AUTHORITY` clause more often than not; when they don't, the configured
//! source CRS applies).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use hydronet_core_common::{Feature, FeatureStream, Value, VectorSource};
use log::debug;
use shapefile::dbase::FieldValue;

/// Vector dataset backed by shapefiles on disk.
#[derive(Debug, Clone)]
pub struct ShapefileSource {
    /// Layer name → `.shp` path.
    layers: BTreeMap<String, PathBuf>,
}

impl ShapefileSource {
    /// Opens a `.shp` file or a directory containing them.
    ///
    /// For a directory, every `*.shp` entry becomes a layer named after its
    /// file stem; layers are ordered by name so enumeration is stable.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, is not readable, or
    /// contains no shapefiles.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut layers = BTreeMap::new();

        if path.is_file() {
            let stem = layer_stem(path)
                .ok_or_else(|| anyhow!("'{}' is not a .shp file", path.display()))?;
            layers.insert(stem, path.to_path_buf());
        } else {
            let entries = std::fs::read_dir(path)
                .with_context(|| format!("failed to read directory '{}'", path.display()))?;
            for entry in entries {
                let entry =
                    entry.with_context(|| format!("failed to list '{}'", path.display()))?;
                let entry_path = entry.path();
                if let Some(stem) = layer_stem(&entry_path) {
                    layers.insert(stem, entry_path);
                }
            }
        }

        if layers.is_empty() {
            return Err(anyhow!("no shapefiles found under '{}'", path.display()));
        }
        debug!("opened shapefile source with {} layer(s)", layers.len());
        Ok(Self { layers })
    }

    fn layer_path(&self, name: &str) -> Result<&Path> {
        self.layers
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow!("shapefile layer '{name}' not found"))
    }
}

fn layer_stem(path: &Path) -> Option<String> {
    let is_shp = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("shp"));
    if !is_shp {
        return None;
    }
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

impl VectorSource for ShapefileSource {
    fn layer_names(&self) -> Result<Vec<String>> {
        Ok(self.layers.keys().cloned().collect())
    }

    fn read_layer(&self, name: &str) -> Result<FeatureStream<'_>> {
        let path = self.layer_path(name)?;
        let pairs = shapefile::read(path)
            .with_context(|| format!("failed to read shapefile '{}'", path.display()))?;

        let layer = name.to_string();
        let stream = pairs.into_iter().map(move |(shape, record)| {
            let geometry = shape_to_geometry(shape)
                .with_context(|| format!("unsupported shape in layer '{layer}'"))?;

            // dBase records carry no column order; sort by name so reruns
            // see identical attribute sequences.
            let mut attributes: Vec<(String, Value)> = record
                .into_iter()
                .map(|(column, value)| (column, field_to_value(value)))
                .collect();
            attributes.sort_by(|(a, _), (b, _)| a.cmp(b));

            Ok(Feature::new(attributes, geometry))
        });

        Ok(Box::new(stream))
    }

    fn declared_epsg(&self, name: &str) -> Result<Option<u32>> {
        let prj = self.layer_path(name)?.with_extension("prj");
        let Ok(text) = std::fs::read_to_string(prj) else {
            return Ok(None);
        };
        Ok(epsg_from_prj(&text))
    }
}

/// Extracts an EPSG code from WKT1 projection text.
///
/// The authoritative code is the last `AUTHORITY["EPSG","<code>"]` clause
/// (inner clauses describe datums and axes).
#[must_use]
pub fn epsg_from_prj(wkt: &str) -> Option<u32> {
    const MARKER: &str = "AUTHORITY[\"EPSG\",\"";
    let start = wkt.rfind(MARKER)? + MARKER.len();
    let rest = &wkt[start..];
    let end = rest.find('"')?;
    rest[..end].parse().ok()
}

fn field_to_value(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::Text(trimmed.to_string())
            }
        },
        FieldValue::Numeric(Some(n)) => Value::Real(n),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Float(Some(f)) => Value::Real(f64::from(f)),
        FieldValue::Integer(i) => Value::Integer(i64::from(i)),
        FieldValue::Double(d) => Value::Real(d),
        FieldValue::Date(Some(d)) => {
            Value::Text(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        },
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Logical(None)
        | FieldValue::Float(None)
        | FieldValue::Date(None) => Value::Null,
        other => {
            debug!("unmapped dBase field value {other:?}");
            Value::Null
        },
    }
}

// The Z/M shape variants differ only in their point struct; these macros
// flatten all of them onto 2D geo types without trait machinery.
macro_rules! polyline_geometry {
    ($pl:expr) => {
        lines_to_geometry(
            $pl.parts()
                .iter()
                .map(|part| LineString(part.iter().map(|p| Coord { x: p.x, y: p.y }).collect()))
                .collect(),
        )
    };
}

macro_rules! polygon_geometry {
    ($pg:expr) => {
        rings_to_geometry(
            $pg.rings()
                .iter()
                .map(|ring| match ring {
                    shapefile::PolygonRing::Outer(pts) => {
                        (true, pts.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
                    },
                    shapefile::PolygonRing::Inner(pts) => {
                        (false, pts.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
                    },
                })
                .collect(),
        )
    };
}

macro_rules! multipoint_geometry {
    ($mp:expr) => {
        Geometry::MultiPoint(MultiPoint(
            $mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        ))
    };
}

/// Converts a shapefile shape into geo geometry, dropping Z/M ordinates.
///
/// `NullShape` becomes `None` (a feature without geometry); multipatch
/// shapes are rejected.
fn shape_to_geometry(shape: shapefile::Shape) -> Result<Option<Geometry<f64>>> {
    use shapefile::Shape;

    let geometry = match shape {
        Shape::NullShape => return Ok(None),

        Shape::Point(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointM(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Geometry::Point(Point::new(p.x, p.y)),

        Shape::Multipoint(mp) => multipoint_geometry!(mp),
        Shape::MultipointM(mp) => multipoint_geometry!(mp),
        Shape::MultipointZ(mp) => multipoint_geometry!(mp),

        Shape::Polyline(pl) => polyline_geometry!(pl),
        Shape::PolylineM(pl) => polyline_geometry!(pl),
        Shape::PolylineZ(pl) => polyline_geometry!(pl),

        Shape::Polygon(pg) => polygon_geometry!(pg),
        Shape::PolygonM(pg) => polygon_geometry!(pg),
        Shape::PolygonZ(pg) => polygon_geometry!(pg),

        Shape::Multipatch(_) => {
            return Err(anyhow!("multipatch shapes are not supported"));
        },
    };

    Ok(Some(geometry))
}

fn lines_to_geometry(lines: Vec<LineString<f64>>) -> Geometry<f64> {
    // A single-part polyline stays a LineString; the schema mapper decides
    // whether to promote it.
    if lines.len() == 1 {
        let mut lines = lines;
        Geometry::LineString(lines.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString(lines))
    }
}

fn rings_to_geometry(rings: Vec<(bool, Vec<Coord<f64>>)>) -> Geometry<f64> {
    // Outer rings open a polygon; inner rings attach to the polygon opened
    // most recently, which matches shapefile ring ordering.
    let mut assembled: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for (outer, coords) in rings {
        let ring = LineString(coords);
        if outer || assembled.is_empty() {
            assembled.push((ring, Vec::new()));
        } else if let Some((_, interiors)) = assembled.last_mut() {
            interiors.push(ring);
        }
    }

    let mut polygons: Vec<Polygon<f64>> = assembled
        .into_iter()
        .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
        .collect();
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon(polygons))
    }
}
