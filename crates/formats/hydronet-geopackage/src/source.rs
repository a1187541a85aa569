//! Read adapter over GeoPackage feature tables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use hydronet_core_common::{Feature, FeatureStream, Value, VectorSource};
use log::debug;
use rusqlite::Connection;
use rusqlite::types::ValueRef;

/// A GeoPackage opened read-only as a vector dataset.
///
/// Layers are the `data_type = 'features'` rows of `gpkg_contents`. The
/// association engine reads normalized tables back through this adapter, so
/// it depends only on the normalized schema contract, never on the original
/// source format.
pub struct GpkgSource {
    conn: Connection,
    path: PathBuf,
}

impl GpkgSource {
    /// Opens the GeoPackage at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or lacks GeoPackage
    /// catalog tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open GeoPackage '{}'", path.display()))?;

        let has_contents: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'gpkg_contents'",
                [],
                |r| r.get(0),
            )
            .with_context(|| format!("failed to inspect '{}'", path.display()))?;
        if has_contents == 0 {
            return Err(anyhow!("'{}' is not a GeoPackage", path.display()));
        }
        Ok(Self { conn, path })
    }

    fn geometry_column(&self, table: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1")?;
        let mut rows = stmt.query([table])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn require_layer(&self, name: &str) -> Result<()> {
        let known: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM gpkg_contents \
                 WHERE data_type = 'features' AND table_name = ?1",
                [name],
                |r| r.get(0),
            )
            .context("failed to query gpkg_contents")?;
        if known == 0 {
            return Err(anyhow!(
                "layer '{name}' not found in GeoPackage '{}'",
                self.path.display()
            ));
        }
        Ok(())
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        // Non-geometry blobs have no place in the normalized schema.
        ValueRef::Blob(_) => Value::Null,
    }
}

impl VectorSource for GpkgSource {
    fn layer_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT table_name FROM gpkg_contents \
                 WHERE data_type = 'features' ORDER BY table_name",
            )
            .context("failed to query gpkg_contents")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list GeoPackage layers")?;
        Ok(names)
    }

    fn read_layer(&self, name: &str) -> Result<FeatureStream<'_>> {
        self.require_layer(name)?;
        let geom_column = self.geometry_column(name)?;

        // Rows are materialized up front: rusqlite statements cannot outlive
        // their borrow, and layer order must be stable for reruns anyway.
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {quoted} ORDER BY rowid"))
            .with_context(|| format!("failed to read layer '{name}'"))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        let mut features: Vec<Result<Feature>> = Vec::new();
        let mut rows = stmt
            .query([])
            .with_context(|| format!("failed to read layer '{name}'"))?;
        while let Some(row) = rows.next().context("failed to step over layer rows")? {
            let mut fid = None;
            let mut geometry = None;
            let mut geometry_error = None;
            let mut attributes = Vec::with_capacity(column_names.len());

            for (idx, column) in column_names.iter().enumerate() {
                let raw = row.get_ref(idx).context("failed to read column value")?;
                if column.eq_ignore_ascii_case("fid") {
                    if let ValueRef::Integer(i) = raw {
                        fid = Some(i);
                    }
                    continue;
                }
                if geom_column
                    .as_deref()
                    .is_some_and(|g| g.eq_ignore_ascii_case(column))
                {
                    match raw {
                        ValueRef::Blob(blob) => match crate::geom::decode_gpkg_geometry(blob) {
                            Ok(geom) => geometry = Some(geom),
                            Err(e) => geometry_error = Some(e),
                        },
                        _ => geometry = None,
                    }
                    continue;
                }
                attributes.push((column.clone(), column_value(raw)));
            }

            features.push(match geometry_error {
                Some(e) => Err(e),
                None => Ok(Feature {
                    fid,
                    attributes,
                    geometry,
                }),
            });
        }

        debug!("read {} row(s) from layer '{name}'", features.len());
        Ok(Box::new(features.into_iter()))
    }

    fn declared_epsg(&self, name: &str) -> Result<Option<u32>> {
        self.require_layer(name)?;
        let srs: Option<i64> = self
            .conn
            .query_row(
                "SELECT srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
                [name],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("failed to query gpkg_geometry_columns")?;
        // srs_id 0 and -1 are the "undefined" placeholders
        Ok(srs.and_then(|s| u32::try_from(s).ok()).filter(|&s| s > 0))
    }
}
