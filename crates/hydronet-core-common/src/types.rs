//! Data types shared between the pipeline core and the format adapters.
//!
//! These model one read record ([`Feature`]), one transformed record
//! ([`NormalizedRecord`]), and the schema of a normalized target table
//! ([`TableSchema`]).

use geo_types::Geometry;

/// A single attribute value read from (or written to) a dataset.
///
/// Source schemas are heterogeneous (the same column may be numeric in one
/// utility's export and text in another), so the pipeline normalizes every
/// retained attribute to its text form via [`Value::as_text`].
///
/// # Examples
///
/// ```
/// use hydronet_core_common::Value;
///
/// assert_eq!(Value::Integer(4017).as_text(), Some("4017".to_string()));
/// assert_eq!(Value::Bool(true).as_text(), Some("true".to_string()));
/// assert_eq!(Value::Null.as_text(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent or SQL NULL.
    Null,
    /// Text value.
    Text(String),
    /// 64-bit integer value.
    Integer(i64),
    /// Double-precision floating point value.
    Real(f64),
    /// Boolean value.
    Bool(bool),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Casts the value to its text representation, or `None` for NULL.
    ///
    /// Integers and reals use their shortest decimal form; booleans become
    /// `"true"`/`"false"`.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            Value::Bool(b) => Some(b.to_string()),
        }
    }

    /// Interprets the value as a 64-bit integer if it losslessly is one.
    ///
    /// Text is trimmed and parsed; reals qualify only when they are whole
    /// numbers. Used for source-provided primary keys (numeric GIS ids that
    /// some exports serialize as text).
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 && r.is_finite() => Some(*r as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Interprets the value as a boolean.
    ///
    /// Accepts native booleans, 0/1 integers, and the usual text spellings
    /// (`true`/`false`, `t`/`f`, `yes`/`no`, `0`/`1`, case-insensitive).
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(true),
                "false" | "f" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One record read from a source dataset: an ordered attribute mapping plus
/// at most one geometry in the source CRS. Immutable once read.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Source-assigned feature id, when the format provides one.
    pub fid: Option<i64>,
    /// Attribute columns in source order.
    pub attributes: Vec<(String, Value)>,
    /// Geometry in the source CRS; `None` when the source row has no shape.
    pub geometry: Option<Geometry<f64>>,
}

impl Feature {
    /// Creates a feature with no fid.
    #[must_use]
    pub fn new(attributes: Vec<(String, Value)>, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            fid: None,
            attributes,
            geometry,
        }
    }

    /// Looks up an attribute by name, case-insensitively.
    ///
    /// Source schemas disagree on column casing (`GISID` vs `gisid`), so
    /// all lookups in the pipeline go through this method.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Storage type of one normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Free text (the default for retained source attributes).
    Text,
    /// 64-bit integer.
    Integer,
    /// Double-precision real.
    Real,
    /// Boolean (stored as 0/1 where the backend has no native boolean).
    Bool,
}

/// Name and type of one column in a normalized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Lower-cased column name.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
}

impl ColumnSpec {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Geometry class of a normalized table's `geom` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    /// Mixed or promoted geometry; the catalog declares the generic class.
    Geometry,
}

impl GeometryType {
    /// OGC name, as recorded in GeoPackage metadata.
    #[must_use]
    pub fn ogc_name(&self) -> &'static str {
        match self {
            GeometryType::Point => "POINT",
            GeometryType::LineString => "LINESTRING",
            GeometryType::Polygon => "POLYGON",
            GeometryType::MultiPoint => "MULTIPOINT",
            GeometryType::MultiLineString => "MULTILINESTRING",
            GeometryType::MultiPolygon => "MULTIPOLYGON",
            GeometryType::Geometry => "GEOMETRY",
        }
    }
}

/// Schema of one normalized target table.
///
/// Every [`NormalizedRecord`] written under this schema carries exactly
/// `columns.len()` values, in column order, plus the `geom` column handled
/// separately by the store.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Target table name (lower-cased layer name).
    pub table: String,
    /// Attribute columns, in output order.
    pub columns: Vec<ColumnSpec>,
    /// Geometry class of the `geom` column.
    pub geometry_type: GeometryType,
    /// EPSG code of the storage CRS.
    pub storage_epsg: u32,
}

impl TableSchema {
    /// Index of a column by name, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Output of the transform stage: one row of a normalized table.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// Integer feature id (source-provided or synthesized sequential).
    pub fid: i64,
    /// Column values aligned with [`TableSchema::columns`].
    pub values: Vec<Value>,
    /// Geometry in the storage CRS; `None` only under a nullable-geometry
    /// layer policy.
    pub geometry: Option<Geometry<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, Point};

    #[test]
    fn value_text_casts() {
        assert_eq!(Value::Text("ac".into()).as_text(), Some("ac".to_string()));
        assert_eq!(Value::Integer(-3).as_text(), Some("-3".to_string()));
        assert_eq!(Value::Real(2.5).as_text(), Some("2.5".to_string()));
        assert_eq!(Value::Bool(false).as_text(), Some("false".to_string()));
        assert_eq!(Value::Null.as_text(), None);
    }

    #[test]
    fn value_integer_casts() {
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::Text(" 42 ".into()).as_integer(), Some(42));
        assert_eq!(Value::Real(9.0).as_integer(), Some(9));
        assert_eq!(Value::Real(9.5).as_integer(), None);
        assert_eq!(Value::Text("abc".into()).as_integer(), None);
        assert_eq!(Value::Null.as_integer(), None);
    }

    #[test]
    fn value_bool_casts() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(0).as_bool(), Some(false));
        assert_eq!(Value::Text("Yes".into()).as_bool(), Some(true));
        assert_eq!(Value::Text("F".into()).as_bool(), Some(false));
        assert_eq!(Value::Text("maybe".into()).as_bool(), None);
    }

    #[test]
    fn feature_lookup_is_case_insensitive() {
        let feature = Feature::new(
            vec![("GISID".to_string(), Value::Integer(12))],
            Some(Geometry::Point(Point::new(0.0, 0.0))),
        );
        assert_eq!(feature.get("gisid"), Some(&Value::Integer(12)));
        assert_eq!(feature.get("GisId"), Some(&Value::Integer(12)));
        assert_eq!(feature.get("tag"), None);
    }

    #[test]
    fn schema_column_index() {
        let schema = TableSchema {
            table: "hydrant".to_string(),
            columns: vec![
                ColumnSpec::new("gisid", ColumnType::Text),
                ColumnSpec::new("ref_wkt", ColumnType::Text),
            ],
            geometry_type: GeometryType::Point,
            storage_epsg: 27700,
        };
        assert_eq!(schema.column_index("ref_wkt"), Some(1));
        assert_eq!(schema.column_index("geom"), None);
    }
}
