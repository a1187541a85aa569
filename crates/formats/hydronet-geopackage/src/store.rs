//! Writable GeoPackage target store.

use std::path::Path;

use anyhow::{Context, Result};
use hydronet_core_common::{ColumnType, NormalizedRecord, RecordSink, TableSchema, Value};
use log::{debug, info};
use rusqlite::Connection;

/// OGC WKT definition of WGS 84, required in every GeoPackage.
const WGS84_DEFINITION: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

/// OGC WKT definition of OSGB36 / British National Grid, the default
/// storage CRS of the water-network tables.
const BNG_DEFINITION: &str = r#"PROJCS["OSGB36 / British National Grid",GEOGCS["OSGB36",DATUM["Ordnance_Survey_of_Great_Britain_1936",SPHEROID["Airy 1830",6377563.396,299.3249646,AUTHORITY["EPSG","7001"]],AUTHORITY["EPSG","6277"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4277"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",49],PARAMETER["central_meridian",-2],PARAMETER["scale_factor",0.9996012717],PARAMETER["false_easting",400000],PARAMETER["false_northing",-100000],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","27700"]]"#;

/// A GeoPackage file opened for writing normalized tables.
///
/// Table replacement is transactional per call: `replace_table` refreshes
/// the catalog rows and DDL, `append` writes one batch per transaction in
/// caller order, which keeps reruns byte-stable.
pub struct GpkgStore {
    conn: Connection,
}

impl GpkgStore {
    /// Opens (or creates) a GeoPackage at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the GeoPackage
    /// catalog tables cannot be created. Callers treat this as fatal: no
    /// pipeline output is trustworthy without a writable store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open target store '{}'", path.display()))?;
        let store = Self { conn };
        store.init_catalog()?;
        info!("opened target store '{}'", path.display());
        Ok(store)
    }

    /// Opens a transient in-memory store (tests, dry runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog tables cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        let store = Self { conn };
        store.init_catalog()?;
        Ok(store)
    }

    /// Borrows the underlying connection (report queries, tests).
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn init_catalog(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "PRAGMA application_id = 1196444487;\n\
                 PRAGMA user_version = 10300;\n\
                 CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (\n\
                   srs_name TEXT NOT NULL,\n\
                   srs_id INTEGER PRIMARY KEY,\n\
                   organization TEXT NOT NULL,\n\
                   organization_coordsys_id INTEGER NOT NULL,\n\
                   definition TEXT NOT NULL,\n\
                   description TEXT\n\
                 );\n\
                 CREATE TABLE IF NOT EXISTS gpkg_contents (\n\
                   table_name TEXT NOT NULL PRIMARY KEY,\n\
                   data_type TEXT NOT NULL,\n\
                   identifier TEXT UNIQUE,\n\
                   description TEXT DEFAULT '',\n\
                   last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),\n\
                   min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,\n\
                   srs_id INTEGER,\n\
                   CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)\n\
                 );\n\
                 CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (\n\
                   table_name TEXT NOT NULL,\n\
                   column_name TEXT NOT NULL,\n\
                   geometry_type_name TEXT NOT NULL,\n\
                   srs_id INTEGER NOT NULL,\n\
                   z TINYINT NOT NULL,\n\
                   m TINYINT NOT NULL,\n\
                   CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),\n\
                   CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),\n\
                   CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)\n\
                 );",
            )
            .context("failed to create GeoPackage catalog tables")?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO gpkg_spatial_ref_sys \
                 (srs_name, srs_id, organization, organization_coordsys_id, definition) \
                 VALUES ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined'),\n\
                        ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined'),\n\
                        ('WGS 84', 4326, 'EPSG', 4326, ?1)",
                [WGS84_DEFINITION],
            )
            .context("failed to seed gpkg_spatial_ref_sys")?;
        Ok(())
    }

    fn ensure_srs(&self, epsg: u32) -> Result<()> {
        let (name, definition) = match epsg {
            4326 => ("WGS 84", WGS84_DEFINITION),
            27700 => ("OSGB36 / British National Grid", BNG_DEFINITION),
            // Definition text is unknown for arbitrary codes; readers
            // resolve by organization id.
            _ => ("unnamed", "undefined"),
        };
        self.conn
            .execute(
                "INSERT OR IGNORE INTO gpkg_spatial_ref_sys \
                 (srs_name, srs_id, organization, organization_coordsys_id, definition) \
                 VALUES (?1, ?2, 'EPSG', ?2, ?3)",
                rusqlite::params![name, epsg, definition],
            )
            .with_context(|| format!("failed to register EPSG:{epsg}"))?;
        Ok(())
    }
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Text => "TEXT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Bool => "BOOLEAN",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl RecordSink for GpkgStore {
    fn replace_table(&mut self, schema: &TableSchema) -> Result<()> {
        self.ensure_srs(schema.storage_epsg)?;

        let table = quote_ident(&schema.table);
        let tx = self
            .conn
            .transaction()
            .context("failed to begin replace transaction")?;

        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
            .with_context(|| format!("failed to drop existing table '{}'", schema.table))?;
        tx.execute(
            "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1",
            [&schema.table],
        )?;
        tx.execute(
            "DELETE FROM gpkg_contents WHERE table_name = ?1",
            [&schema.table],
        )?;

        let mut ddl = format!("CREATE TABLE {table} (fid INTEGER PRIMARY KEY, geom BLOB");
        for column in &schema.columns {
            ddl.push_str(", ");
            ddl.push_str(&quote_ident(&column.name));
            ddl.push(' ');
            ddl.push_str(sql_type(column.column_type));
        }
        ddl.push(')');
        tx.execute_batch(&ddl)
            .with_context(|| format!("failed to create table '{}'", schema.table))?;

        tx.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) \
             VALUES (?1, 'features', ?1, ?2)",
            rusqlite::params![schema.table, schema.storage_epsg],
        )?;
        tx.execute(
            "INSERT INTO gpkg_geometry_columns \
             (table_name, column_name, geometry_type_name, srs_id, z, m) \
             VALUES (?1, 'geom', ?2, ?3, 0, 0)",
            rusqlite::params![
                schema.table,
                schema.geometry_type.ogc_name(),
                schema.storage_epsg
            ],
        )?;

        tx.commit().context("failed to commit table replacement")?;
        debug!("replaced table '{}'", schema.table);
        Ok(())
    }

    fn append(&mut self, schema: &TableSchema, records: &[NormalizedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let placeholders: Vec<String> = (1..=schema.columns.len() + 2)
            .map(|i| format!("?{i}"))
            .collect();
        let column_names: Vec<String> = schema
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect();
        let insert_sql = format!(
            "INSERT INTO {} (fid, geom{}{}) VALUES ({})",
            quote_ident(&schema.table),
            if column_names.is_empty() { "" } else { ", " },
            column_names.join(", "),
            placeholders.join(", "),
        );

        let srs_id = i32::try_from(schema.storage_epsg)
            .with_context(|| format!("EPSG code {} out of range", schema.storage_epsg))?;

        let tx = self
            .conn
            .transaction()
            .context("failed to begin append transaction")?;
        {
            let mut stmt = tx
                .prepare_cached(&insert_sql)
                .with_context(|| format!("failed to prepare insert for '{}'", schema.table))?;

            for record in records {
                let mut bindings: Vec<rusqlite::types::Value> =
                    Vec::with_capacity(schema.columns.len() + 2);
                bindings.push(rusqlite::types::Value::Integer(record.fid));
                bindings.push(match &record.geometry {
                    Some(geometry) => rusqlite::types::Value::Blob(
                        crate::geom::encode_gpkg_geometry(geometry, srs_id)?,
                    ),
                    None => rusqlite::types::Value::Null,
                });
                for value in &record.values {
                    bindings.push(match value {
                        Value::Null => rusqlite::types::Value::Null,
                        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
                        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
                        Value::Real(r) => rusqlite::types::Value::Real(*r),
                        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
                    });
                }
                stmt.execute(rusqlite::params_from_iter(bindings))
                    .with_context(|| {
                        format!("failed to insert fid {} into '{}'", record.fid, schema.table)
                    })?;
            }
        }
        tx.commit()
            .with_context(|| format!("failed to commit batch into '{}'", schema.table))?;
        debug!("wrote {} record(s) into '{}'", records.len(), schema.table);
        Ok(())
    }
}
