//! Coordinate transformation and reference-WKT derivation.
//!
//! A [`Reprojector`] wraps one PROJ transform between two EPSG codes.
//! The pipeline uses two of them per layer: source → storage CRS for the
//! `geom` column, and storage → reference CRS for the portable WKT column.
//! Equal codes short-circuit to a clone so the common "already in British
//! National Grid" case never touches PROJ.
//!
//! Per-feature transform failures are the caller's policy decision: the
//! storage transform dropping a feature and the reference transform leaving
//! a NULL WKT are both decided in the pipeline, not here.

use crate::error::ConfigError;
use geo_types::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geozero::ToWkt;
use log::debug;
use proj::Proj;

/// Transform between two coordinate reference systems.
#[derive(Debug)]
pub struct Reprojector {
    transform: Option<Proj>,
    source_epsg: u32,
    target_epsg: u32,
}

impl Reprojector {
    /// Builds a transform from `source_epsg` to `target_epsg`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Crs`] when PROJ does not know the pair.
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, ConfigError> {
        if source_epsg == target_epsg {
            return Ok(Self {
                transform: None,
                source_epsg,
                target_epsg,
            });
        }

        let source = format!("EPSG:{source_epsg}");
        let target = format!("EPSG:{target_epsg}");
        let transform =
            Proj::new_known_crs(&source, &target, None).map_err(|e| ConfigError::Crs {
                source_epsg,
                target_epsg,
                message: e.to_string(),
            })?;
        debug!("built transform {source} -> {target}");

        Ok(Self {
            transform: Some(transform),
            source_epsg,
            target_epsg,
        })
    }

    /// Source EPSG code.
    #[must_use]
    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    /// Target EPSG code.
    #[must_use]
    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// `true` when source and target are the same CRS.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.transform.is_none()
    }

    /// Transforms a geometry into the target CRS.
    ///
    /// # Errors
    ///
    /// Returns an error when any coordinate falls outside the transform's
    /// valid domain; the geometry is then unusable in the target CRS.
    pub fn project(&self, geometry: &Geometry<f64>) -> anyhow::Result<Geometry<f64>> {
        let Some(transform) = &self.transform else {
            return Ok(geometry.clone());
        };

        let projected = match geometry {
            Geometry::Point(p) => {
                let (x, y) = transform.convert((p.x(), p.y()))?;
                Geometry::Point(Point::new(x, y))
            }
            Geometry::MultiPoint(mp) => {
                let mut pairs: Vec<(f64, f64)> = mp.0.iter().map(|p| (p.x(), p.y())).collect();
                transform.convert_array(&mut pairs)?;
                Geometry::MultiPoint(MultiPoint(
                    pairs.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
                ))
            }
            Geometry::LineString(ls) => Geometry::LineString(self.project_line(transform, ls)?),
            Geometry::MultiLineString(mls) => {
                let lines: anyhow::Result<Vec<LineString<f64>>> = mls
                    .0
                    .iter()
                    .map(|ls| self.project_line(transform, ls))
                    .collect();
                Geometry::MultiLineString(MultiLineString(lines?))
            }
            Geometry::Polygon(p) => Geometry::Polygon(self.project_polygon(transform, p)?),
            Geometry::MultiPolygon(mp) => {
                let polygons: anyhow::Result<Vec<Polygon<f64>>> = mp
                    .0
                    .iter()
                    .map(|p| self.project_polygon(transform, p))
                    .collect();
                Geometry::MultiPolygon(MultiPolygon(polygons?))
            }
            other => anyhow::bail!("unsupported geometry class {other:?} for reprojection"),
        };
        Ok(projected)
    }

    // Batch conversion per line: substantially faster than point-by-point
    // on long mains.
    fn project_line(&self, transform: &Proj, line: &LineString<f64>) -> anyhow::Result<LineString<f64>> {
        let mut pairs: Vec<(f64, f64)> = line.0.iter().map(|c| (c.x, c.y)).collect();
        transform.convert_array(&mut pairs)?;
        Ok(LineString(
            pairs.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        ))
    }

    fn project_polygon(&self, transform: &Proj, polygon: &Polygon<f64>) -> anyhow::Result<Polygon<f64>> {
        let exterior = self.project_line(transform, polygon.exterior())?;
        let interiors: anyhow::Result<Vec<LineString<f64>>> = polygon
            .interiors()
            .iter()
            .map(|ring| self.project_line(transform, ring))
            .collect();
        Ok(Polygon::new(exterior, interiors?))
    }
}

/// Renders a geometry as WKT in the reprojector's target CRS.
///
/// Returns `None` when the geometry cannot be transformed or serialized;
/// the caller records a feature-level warning and keeps the feature with a
/// NULL reference column.
#[must_use]
pub fn reference_wkt(reprojector: &Reprojector, geometry: &Geometry<f64>) -> Option<String> {
    let projected = match reprojector.project(geometry) {
        Ok(projected) => projected,
        Err(e) => {
            debug!(
                "reference reprojection to EPSG:{} failed: {e}",
                reprojector.target_epsg()
            );
            return None;
        }
    };
    projected.to_wkt().ok()
}
