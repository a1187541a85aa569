//! Declarative layer specifications.
//!
//! A [`LayerSpec`] says everything the pipeline needs to know about one
//! asset type: which source layer to read, which columns to retain, the
//! expected geometry class, how primary keys are assigned, and which
//! derived columns to add. Specs are data, not code: the engine has no
//! per-asset branches, and a new asset type is a configuration entry.
//!
//! Specs come from a YAML file ([`PipelineConfig::from_yaml_path`]) or from
//! the builtin water-utility registry ([`PipelineConfig::builtin`]), which
//! covers the trunk-main network, the standard point assets, and district
//! metered area boundaries.
//!
//! # Examples
//!
//! ```
//! use hydronet_core::spec::PipelineConfig;
//!
//! let config = PipelineConfig::builtin();
//! config.validate().expect("builtin registry is valid");
//!
//! let mains = config.layer("trunk_main").expect("registry has mains");
//! assert_eq!(mains.source_layer(), "wTrunkMain");
//!
//! // Tolerances are tuned per asset type, in storage-CRS units.
//! assert_eq!(config.layer("operational_site").unwrap().tolerance, Some(1.0));
//! assert_eq!(config.layer("chamber").unwrap().tolerance, Some(0.5));
//! ```

use crate::error::ConfigError;
use hydronet_core_common::{ColumnSpec, ColumnType, GeometryType, TableSchema};
use serde::Deserialize;
use std::path::Path;

/// Name of the derived text column holding WKT in the reference CRS.
pub const REF_WKT_COLUMN: &str = "ref_wkt";

/// Geometry class expected of a layer, including the promotion rule for
/// layers that mix single- and multi-part shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Plain point geometry.
    Point,
    /// Single-part line geometry.
    LineString,
    /// Single-part polygon geometry.
    Polygon,
    /// Line or polygon geometry, promoted to its multi-part equivalent so
    /// the stored table has one uniform type.
    PromoteToMulti,
}

impl GeometryKind {
    /// `true` for kinds stored as point geometry.
    #[must_use]
    pub fn is_point(&self) -> bool {
        matches!(self, GeometryKind::Point)
    }

    /// Geometry class recorded in the target-store catalog.
    ///
    /// Promoted layers are declared generic: the promotion fixes the
    /// part-arity but the base class (line vs polygon) follows the data.
    #[must_use]
    pub fn stored_geometry_type(&self) -> GeometryType {
        match self {
            GeometryKind::Point => GeometryType::Point,
            GeometryKind::LineString => GeometryType::LineString,
            GeometryKind::Polygon => GeometryType::Polygon,
            GeometryKind::PromoteToMulti => GeometryType::Geometry,
        }
    }
}

/// What to do with a feature whose geometry is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingGeometry {
    /// Drop the feature and count it (the default).
    #[default]
    Skip,
    /// Keep the feature with a NULL geometry column.
    ForceNullable,
}

/// Primary-key assignment for normalized records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKey {
    /// Synthesize 1-based sequential ids in source order (the default).
    #[default]
    Sequential,
    /// Take ids from a source column holding integer values.
    Column(String),
}

/// Rule deriving one output column that is not a plain retained attribute.
///
/// Retained attributes are implicitly cast to text; the reference-CRS WKT
/// column is always added. Everything else is one of these rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// A boolean flag taken from an optional source column, with a fixed
    /// default when the column is absent or empty. Lets target schemas gain
    /// optional columns (an "instrumented" marker, say) without requiring
    /// every source to supply them.
    Flag {
        /// Source column to read, if the dataset has it.
        #[serde(default)]
        source: Option<String>,
        /// Value used when the source cannot supply one.
        default: bool,
    },
    /// A constant text value, identical for every record of the layer.
    Constant {
        /// The constant.
        value: String,
    },
}

impl Derivation {
    fn column_type(&self) -> ColumnType {
        match self {
            Derivation::Flag { .. } => ColumnType::Bool,
            Derivation::Constant { .. } => ColumnType::Text,
        }
    }
}

/// One derived output column: a name plus its [`Derivation`] rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DerivedColumn {
    /// Output column name (stored lower-cased).
    pub name: String,
    /// How the value is produced.
    pub rule: Derivation,
}

/// Declarative description of one asset type.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    /// Unique layer name; also the default target table name (lower-cased).
    pub name: String,

    /// Name of the layer in the source dataset; defaults to `name`.
    #[serde(default)]
    pub source_layer: Option<String>,

    /// Source columns to retain, in output order.
    #[serde(default)]
    pub source_columns: Vec<String>,

    /// Expected geometry class.
    pub geometry_kind: GeometryKind,

    /// Target table override.
    #[serde(default)]
    pub table: Option<String>,

    /// Derived output columns.
    #[serde(default)]
    pub derived: Vec<DerivedColumn>,

    /// Primary-key strategy.
    #[serde(default)]
    pub primary_key: PrimaryKey,

    /// Buffered-match tolerance in storage-CRS units; only meaningful for
    /// point layers. Absent means no buffered fallback.
    #[serde(default)]
    pub tolerance: Option<f64>,

    /// Policy for features without geometry.
    #[serde(default)]
    pub missing_geometry: MissingGeometry,

    /// Permit an empty `source_columns` list (pure-geometry layers).
    #[serde(default)]
    pub geometry_only: bool,
}

impl LayerSpec {
    /// The source dataset layer this spec reads.
    #[must_use]
    pub fn source_layer(&self) -> &str {
        self.source_layer.as_deref().unwrap_or(&self.name)
    }

    /// The target table this spec writes: the override, or the lower-cased
    /// layer name.
    #[must_use]
    pub fn target_table(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    /// Schema of the normalized table: retained columns (text, lower-cased)
    /// then derived columns then [`REF_WKT_COLUMN`].
    #[must_use]
    pub fn table_schema(&self, storage_epsg: u32) -> TableSchema {
        let mut columns: Vec<ColumnSpec> = self
            .source_columns
            .iter()
            .map(|c| ColumnSpec::new(c.to_lowercase(), ColumnType::Text))
            .collect();
        for derived in &self.derived {
            columns.push(ColumnSpec::new(
                derived.name.to_lowercase(),
                derived.rule.column_type(),
            ));
        }
        columns.push(ColumnSpec::new(REF_WKT_COLUMN, ColumnType::Text));

        TableSchema {
            table: self.target_table(),
            columns,
            geometry_type: self.geometry_kind.stored_geometry_type(),
            storage_epsg,
        }
    }
}

fn default_storage_epsg() -> u32 {
    27700
}

fn default_reference_epsg() -> u32 {
    4326
}

fn default_batch_size() -> usize {
    100_000
}

/// A full pipeline configuration: CRS pair, write batching, and the layer
/// specs of one run.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// EPSG code of the `geom` column (default 27700, British National
    /// Grid).
    #[serde(default = "default_storage_epsg")]
    pub storage_epsg: u32,

    /// EPSG code of the portable [`REF_WKT_COLUMN`] column (default 4326).
    #[serde(default = "default_reference_epsg")]
    pub reference_epsg: u32,

    /// Fallback source EPSG for datasets that declare none; defaults to
    /// the storage CRS.
    #[serde(default)]
    pub source_epsg: Option<u32>,

    /// Rows per write transaction. Bounds memory and transaction-log
    /// growth on multi-million-feature layers.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// The layer specs of this run.
    pub layers: Vec<LayerSpec>,
}

impl PipelineConfig {
    /// The builtin water-utility network registry.
    ///
    /// Line network, the standard point assets with their per-type
    /// tolerances, and DMA boundary polygons. Most deployments use this
    /// as-is; bespoke source schemas supply a YAML file instead.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn builtin() -> Self {
        let point_layer = |name: &str, source_layer: &str, tolerance: Option<f64>| LayerSpec {
            name: name.to_string(),
            source_layer: Some(source_layer.to_string()),
            source_columns: vec!["GISID".to_string(), "tag".to_string()],
            geometry_kind: GeometryKind::Point,
            table: None,
            derived: Vec::new(),
            primary_key: PrimaryKey::Column("GISID".to_string()),
            tolerance,
            missing_geometry: MissingGeometry::Skip,
            geometry_only: false,
        };

        let mut layers = vec![LayerSpec {
            name: "trunk_main".to_string(),
            source_layer: Some("wTrunkMain".to_string()),
            source_columns: vec![
                "GISID".to_string(),
                "MATERIAL".to_string(),
                "DIAMETER_mm".to_string(),
                "type".to_string(),
            ],
            geometry_kind: GeometryKind::PromoteToMulti,
            table: None,
            derived: Vec::new(),
            primary_key: PrimaryKey::Column("GISID".to_string()),
            tolerance: None,
            missing_geometry: MissingGeometry::Skip,
            geometry_only: false,
        }];

        let mut hydrant = point_layer("hydrant", "wHydrant", None);
        hydrant.derived.push(DerivedColumn {
            name: "acoustic_logger".to_string(),
            rule: Derivation::Flag {
                source: Some("acoustic_logger".to_string()),
                default: false,
            },
        });
        layers.push(hydrant);

        layers.push(point_layer("network_meter", "wNetworkMeter", None));
        layers.push(point_layer("chamber", "wChamber", Some(0.5)));
        layers.push(point_layer("network_opt_valve", "wNetworkOptValve", None));
        layers.push(point_layer(
            "operational_site",
            "wOperationalSite",
            Some(1.0),
        ));
        layers.push(point_layer(
            "pressure_control_valve",
            "wPressureContValve",
            None,
        ));
        layers.push(point_layer("pressure_fitting", "wPressureFitting", None));

        layers.push(LayerSpec {
            name: "dma".to_string(),
            source_layer: Some("wDMA".to_string()),
            source_columns: vec!["DMANAME".to_string(), "DMAAREACODE".to_string()],
            geometry_kind: GeometryKind::PromoteToMulti,
            table: None,
            derived: Vec::new(),
            primary_key: PrimaryKey::Sequential,
            tolerance: None,
            missing_geometry: MissingGeometry::Skip,
            geometry_only: false,
        });

        Self {
            storage_epsg: default_storage_epsg(),
            reference_epsg: default_reference_epsg(),
            source_epsg: None,
            batch_size: default_batch_size(),
            layers,
        }
    }

    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] on parse failure, or any validation
    /// error the parsed configuration carries.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| ConfigError::Load {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file is unreadable or
    /// unparsable, or any validation error it carries.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Looks up a layer spec by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Fallback EPSG for sources that declare no CRS.
    #[must_use]
    pub fn fallback_source_epsg(&self) -> u32 {
        self.source_epsg.unwrap_or(self.storage_epsg)
    }

    /// Checks the cross-layer invariants: unique names, unique target
    /// tables, non-empty column lists, sane tolerances.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, layer) in self.layers.iter().enumerate() {
            if self.layers[..i].iter().any(|l| l.name == layer.name) {
                return Err(ConfigError::DuplicateLayer {
                    name: layer.name.clone(),
                });
            }
            if let Some(previous) = self.layers[..i]
                .iter()
                .find(|l| l.target_table() == layer.target_table())
            {
                return Err(ConfigError::DuplicateTable {
                    first: previous.name.clone(),
                    second: layer.name.clone(),
                    table: layer.target_table(),
                });
            }
            if layer.source_columns.is_empty() && !layer.geometry_only {
                return Err(ConfigError::EmptyColumnList {
                    layer: layer.name.clone(),
                });
            }
            if let Some(tolerance) = layer.tolerance {
                if !tolerance.is_finite() || tolerance <= 0.0 {
                    return Err(ConfigError::InvalidTolerance {
                        layer: layer.name.clone(),
                        value: tolerance,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_valid() {
        let config = PipelineConfig::builtin();
        config.validate().unwrap();
        assert_eq!(config.storage_epsg, 27700);
        assert_eq!(config.reference_epsg, 4326);
        assert_eq!(config.batch_size, 100_000);
        assert!(config.layers.len() >= 9);
    }

    #[test]
    fn schema_is_sources_then_derived_then_ref_wkt() {
        let config = PipelineConfig::builtin();
        let hydrant = config.layer("hydrant").unwrap();
        let schema = hydrant.table_schema(27700);

        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["gisid", "tag", "acoustic_logger", "ref_wkt"]);
        assert_eq!(schema.columns[2].column_type, ColumnType::Bool);
        assert_eq!(schema.table, "hydrant");
        assert_eq!(schema.geometry_type, GeometryType::Point);
    }

    #[test]
    fn yaml_roundtrip_with_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "layers:\n\
             - name: trunk_main\n\
             \x20 source_layer: wTrunkMain\n\
             \x20 source_columns: [GISID, MATERIAL]\n\
             \x20 geometry_kind: promote_to_multi\n\
             \x20 primary_key:\n\
             \x20   column: GISID\n\
             - name: chamber\n\
             \x20 source_columns: [tag]\n\
             \x20 geometry_kind: point\n\
             \x20 tolerance: 0.5\n\
             \x20 derived:\n\
             \x20 - name: surveyed\n\
             \x20   rule:\n\
             \x20     flag:\n\
             \x20       default: false\n",
        )
        .unwrap();

        assert_eq!(config.storage_epsg, 27700);
        let chamber = config.layer("chamber").unwrap();
        assert_eq!(chamber.source_layer(), "chamber");
        assert_eq!(chamber.primary_key, PrimaryKey::Sequential);
        assert_eq!(chamber.tolerance, Some(0.5));
        assert_eq!(
            chamber.derived[0].rule,
            Derivation::Flag {
                source: None,
                default: false
            }
        );
        let mains = config.layer("trunk_main").unwrap();
        assert_eq!(mains.primary_key, PrimaryKey::Column("GISID".to_string()));
    }

    #[test]
    fn duplicate_table_is_rejected() {
        let err = PipelineConfig::from_yaml_str(
            "layers:\n\
             - name: Hydrant\n\
             \x20 source_columns: [tag]\n\
             \x20 geometry_kind: point\n\
             - name: hydrant\n\
             \x20 source_columns: [tag]\n\
             \x20 geometry_kind: point\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTable { .. }));
    }

    #[test]
    fn empty_columns_require_geometry_only() {
        let err = PipelineConfig::from_yaml_str(
            "layers:\n\
             - name: sketch\n\
             \x20 geometry_kind: line_string\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyColumnList { .. }));

        PipelineConfig::from_yaml_str(
            "layers:\n\
             - name: sketch\n\
             \x20 geometry_kind: line_string\n\
             \x20 geometry_only: true\n",
        )
        .unwrap();
    }

    #[test]
    fn bad_tolerance_is_rejected() {
        let err = PipelineConfig::from_yaml_str(
            "layers:\n\
             - name: chamber\n\
             \x20 source_columns: [tag]\n\
             \x20 geometry_kind: point\n\
             \x20 tolerance: -1.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTolerance { .. }));
    }
}
