//! Tabular CSV source adapter.
//!
//! Covers the degenerate "no native layer wrapper" inputs of the pipeline:
//! typically a `dma.csv` export of district boundaries with a WKT geometry
//! column, or point tables with X/Y coordinate columns. The file is exposed
//! as a single-layer [`VectorSource`] so it flows through exactly the same
//! schema-mapping contract as any other dataset.
//!
//! Geometry cells are trimmed; an empty cell yields a feature without
//! geometry, and the layer's `missing_geometry` policy decides its fate
//! downstream.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use geo_types::{Geometry, Point};
use geozero::ToGeo;
use geozero::wkt::Wkt;
use hydronet_core_common::{Feature, FeatureStream, Value, VectorSource};
use log::debug;

/// How the geometry of each row is encoded.
#[derive(Debug, Clone)]
pub enum CsvGeometry {
    /// A column holding WKT text (e.g. `wkt`, `geometry`).
    Wkt {
        /// Geometry column name.
        column: String,
    },
    /// A pair of coordinate columns producing point geometry.
    Xy {
        /// Easting / longitude column name.
        x: String,
        /// Northing / latitude column name.
        y: String,
    },
}

/// A single CSV file exposed as a one-layer vector dataset.
#[derive(Debug, Clone)]
pub struct CsvTableSource {
    path: PathBuf,
    layer_name: String,
    geometry: CsvGeometry,
    epsg: Option<u32>,
}

impl CsvTableSource {
    /// Creates an adapter over `path`.
    ///
    /// The layer is named after the file stem (`dma.csv` → layer `dma`);
    /// `epsg` is the CRS declared for the table, since CSV carries none of
    /// its own.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, geometry: CsvGeometry, epsg: Option<u32>) -> Self {
        let path = path.as_ref().to_path_buf();
        let layer_name = path
            .file_stem()
            .map_or_else(|| "table".to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            path,
            layer_name,
            geometry,
            epsg,
        }
    }

    /// Overrides the layer name.
    #[must_use]
    pub fn with_layer_name(mut self, name: impl Into<String>) -> Self {
        self.layer_name = name.into();
        self
    }

    fn geometry_columns(&self) -> Vec<&str> {
        match &self.geometry {
            CsvGeometry::Wkt { column } => vec![column.as_str()],
            CsvGeometry::Xy { x, y } => vec![x.as_str(), y.as_str()],
        }
    }
}

fn cell_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::Text(trimmed.to_string())
    }
}

fn parse_wkt(cell: &str) -> Result<Option<Geometry<f64>>> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let geom = Wkt(trimmed)
        .to_geo()
        .map_err(|e| anyhow!("invalid WKT '{trimmed}': {e}"))?;
    Ok(Some(geom))
}

fn parse_coordinate(cell: &str, column: &str) -> Result<Option<f64>> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|e| anyhow!("column '{column}': invalid coordinate '{trimmed}': {e}"))
}

impl VectorSource for CsvTableSource {
    fn layer_names(&self) -> Result<Vec<String>> {
        Ok(vec![self.layer_name.clone()])
    }

    fn read_layer(&self, name: &str) -> Result<FeatureStream<'_>> {
        if name != self.layer_name {
            return Err(anyhow!(
                "layer '{name}' not found in CSV table '{}'",
                self.path.display()
            ));
        }

        let file = File::open(&self.path)
            .with_context(|| format!("failed to open CSV file '{}'", self.path.display()))?;
        let mut reader = csv::Reader::from_reader(file);
        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("failed to read CSV header of '{}'", self.path.display()))?
            .iter()
            .map(ToString::to_string)
            .collect();

        for geom_col in self.geometry_columns() {
            if !headers.iter().any(|h| h.eq_ignore_ascii_case(geom_col)) {
                return Err(anyhow!(
                    "geometry column '{geom_col}' not present in '{}'",
                    self.path.display()
                ));
            }
        }
        debug!(
            "reading CSV table '{}' with {} columns",
            self.path.display(),
            headers.len()
        );

        let geometry = self.geometry.clone();
        let path = self.path.clone();
        let stream = reader.into_records().map(move |record| {
            let record =
                record.with_context(|| format!("malformed CSV row in '{}'", path.display()))?;

            let mut attributes = Vec::with_capacity(headers.len());
            let mut wkt_cell: Option<String> = None;
            let mut x_cell: Option<String> = None;
            let mut y_cell: Option<String> = None;

            for (header, cell) in headers.iter().zip(record.iter()) {
                match &geometry {
                    CsvGeometry::Wkt { column } if header.eq_ignore_ascii_case(column) => {
                        wkt_cell = Some(cell.to_string());
                    },
                    CsvGeometry::Xy { x, y } => {
                        if header.eq_ignore_ascii_case(x) {
                            x_cell = Some(cell.to_string());
                        } else if header.eq_ignore_ascii_case(y) {
                            y_cell = Some(cell.to_string());
                        } else {
                            attributes.push((header.clone(), cell_value(cell)));
                        }
                    },
                    _ => attributes.push((header.clone(), cell_value(cell))),
                }
            }

            let geom = match &geometry {
                CsvGeometry::Wkt { .. } => wkt_cell.as_deref().map_or(Ok(None), parse_wkt)?,
                CsvGeometry::Xy { x, y } => {
                    let px = x_cell.as_deref().map_or(Ok(None), |c| parse_coordinate(c, x))?;
                    let py = y_cell.as_deref().map_or(Ok(None), |c| parse_coordinate(c, y))?;
                    match (px, py) {
                        (Some(px), Some(py)) => Some(Geometry::Point(Point::new(px, py))),
                        _ => None,
                    }
                },
            };

            Ok(Feature::new(attributes, geom))
        });

        Ok(Box::new(stream))
    }

    fn declared_epsg(&self, name: &str) -> Result<Option<u32>> {
        if name != self.layer_name {
            return Err(anyhow!(
                "layer '{name}' not found in CSV table '{}'",
                self.path.display()
            ));
        }
        Ok(self.epsg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        write!(file, "{contents}").unwrap();
        path
    }

    #[test]
    fn reads_wkt_table() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "dma.csv",
            "DMANAME,DMAAREACODE,wkt\n\
             North,N01,\"POLYGON((0 0,10 0,10 10,0 10,0 0))\"\n\
             South,S02,\n",
        );

        let source = CsvTableSource::new(
            &path,
            CsvGeometry::Wkt {
                column: "wkt".to_string(),
            },
            Some(27700),
        );

        assert_eq!(source.layer_names().unwrap(), vec!["dma".to_string()]);
        assert_eq!(source.declared_epsg("dma").unwrap(), Some(27700));

        let features: Vec<Feature> = source
            .read_layer("dma")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].get("dmaname"), Some(&Value::from("North")));
        assert!(matches!(features[0].geometry, Some(Geometry::Polygon(_))));
        // the WKT column is not duplicated into the attributes
        assert_eq!(features[0].get("wkt"), None);
        // empty geometry cell: feature retained, geometry absent
        assert!(features[1].geometry.is_none());
    }

    #[test]
    fn reads_xy_table() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "sites.csv",
            "GISID,easting,northing\n7,531000.5,181000.25\n8,,\n",
        );

        let source = CsvTableSource::new(
            &path,
            CsvGeometry::Xy {
                x: "easting".to_string(),
                y: "northing".to_string(),
            },
            Some(27700),
        );

        let features: Vec<Feature> = source
            .read_layer("sites")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(features.len(), 2);
        match &features[0].geometry {
            Some(Geometry::Point(p)) => {
                assert!((p.x() - 531000.5).abs() < 1e-9);
                assert!((p.y() - 181000.25).abs() < 1e-9);
            },
            other => panic!("expected point geometry, got {other:?}"),
        }
        assert!(features[1].geometry.is_none());
        // coordinate columns are consumed by the geometry, not kept as text
        assert_eq!(features[0].get("easting"), None);
        assert_eq!(features[0].get("GISID"), Some(&Value::from("7")));
    }

    #[test]
    fn invalid_wkt_is_a_row_error() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "bad.csv", "id,wkt\n1,NOT A SHAPE\n");

        let source = CsvTableSource::new(
            &path,
            CsvGeometry::Wkt {
                column: "wkt".to_string(),
            },
            None,
        );
        let results: Vec<Result<Feature>> = source.read_layer("bad").unwrap().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn missing_geometry_column_fails_on_open() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "plain.csv", "id,name\n1,x\n");

        let source = CsvTableSource::new(
            &path,
            CsvGeometry::Wkt {
                column: "wkt".to_string(),
            },
            None,
        );
        assert!(source.read_layer("plain").is_err());
    }

    #[test]
    fn unknown_layer_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "dma.csv", "id,wkt\n");
        let source = CsvTableSource::new(
            &path,
            CsvGeometry::Wkt {
                column: "wkt".to_string(),
            },
            None,
        )
        .with_layer_name("boundaries");
        assert!(source.read_layer("dma").is_err());
        assert!(source.read_layer("boundaries").is_ok());
    }
}
