//! Schema mapping: source features to normalized records.
//!
//! The mapper is the per-feature half of the layer contract. It retains the
//! spec's columns (case-insensitive lookup, lower-cased output, text cast),
//! evaluates derived columns, resolves the primary key, and normalizes
//! geometry (kind check, multi-part promotion, ring-closure repair).
//!
//! A missing *column* is a layer-level failure; the layer description no longer
//! describes the source, so the whole layer aborts. A bad *value* (invalid
//! geometry, unparsable id) is local to one feature: the feature is dropped
//! and counted, never written corrupted.

use crate::error::LayerError;
use crate::spec::{Derivation, GeometryKind, LayerSpec, MissingGeometry, PrimaryKey};
use geo::{CoordsIter, Validation};
use geo_types::{Geometry, MultiLineString, MultiPolygon, Polygon};
use hydronet_core_common::{Feature, NormalizedRecord, TableSchema, Value};

/// Why a feature was dropped rather than mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No geometry and the layer policy is `skip`.
    MissingGeometry,
    /// Geometry class contradicts the spec's `geometry_kind`.
    KindMismatch,
    /// Geometry failed validation and no safe repair applied.
    InvalidGeometry,
    /// Primary-key column value is not an integer.
    BadId,
}

/// Result of mapping one feature.
#[derive(Debug)]
pub enum MapOutcome {
    /// The feature mapped cleanly.
    Mapped(NormalizedRecord),
    /// The feature was dropped; the reason is counted in the summary.
    Dropped(DropReason),
}

/// Maps one source feature under a layer spec.
///
/// `sequence` is the 1-based position of the feature in source order, used
/// by the [`PrimaryKey::Sequential`] strategy.
///
/// # Errors
///
/// Returns [`LayerError::SchemaMismatch`] when a required source column is
/// absent; the caller aborts the layer but not the run.
pub fn map_feature(
    spec: &LayerSpec,
    schema: &TableSchema,
    feature: &Feature,
    sequence: i64,
) -> Result<MapOutcome, LayerError> {
    let fid = match resolve_fid(spec, feature, sequence)? {
        Ok(fid) => fid,
        Err(reason) => return Ok(MapOutcome::Dropped(reason)),
    };

    let geometry = match &feature.geometry {
        Some(geometry) => match normalize_geometry(spec.geometry_kind, geometry) {
            Ok(geometry) => Some(geometry),
            Err(reason) => return Ok(MapOutcome::Dropped(reason)),
        },
        None => match spec.missing_geometry {
            MissingGeometry::Skip => return Ok(MapOutcome::Dropped(DropReason::MissingGeometry)),
            MissingGeometry::ForceNullable => None,
        },
    };

    let mut values = Vec::with_capacity(schema.columns.len());
    for column in &spec.source_columns {
        let value = feature
            .get(column)
            .ok_or_else(|| LayerError::SchemaMismatch {
                layer: spec.source_layer().to_string(),
                column: column.clone(),
            })?;
        values.push(value.as_text().map_or(Value::Null, Value::Text));
    }
    for derived in &spec.derived {
        values.push(derive_value(&derived.rule, feature));
    }
    // ref_wkt slot; the reprojection stage fills it in
    values.push(Value::Null);

    debug_assert_eq!(values.len(), schema.columns.len());
    Ok(MapOutcome::Mapped(NormalizedRecord {
        fid,
        values,
        geometry,
    }))
}

fn resolve_fid(
    spec: &LayerSpec,
    feature: &Feature,
    sequence: i64,
) -> Result<Result<i64, DropReason>, LayerError> {
    match &spec.primary_key {
        PrimaryKey::Sequential => Ok(Ok(sequence)),
        PrimaryKey::Column(column) => {
            let value = feature
                .get(column)
                .ok_or_else(|| LayerError::SchemaMismatch {
                    layer: spec.source_layer().to_string(),
                    column: column.clone(),
                })?;
            Ok(value.as_integer().ok_or(DropReason::BadId))
        },
    }
}

fn derive_value(rule: &Derivation, feature: &Feature) -> Value {
    match rule {
        Derivation::Flag { source, default } => {
            let provided = source
                .as_deref()
                .and_then(|column| feature.get(column))
                .and_then(Value::as_bool);
            Value::Bool(provided.unwrap_or(*default))
        },
        Derivation::Constant { value } => Value::Text(value.clone()),
    }
}

/// Checks the geometry class against the spec, promotes single parts when
/// asked, repairs unclosed rings, and validates the result.
fn normalize_geometry(
    kind: GeometryKind,
    geometry: &Geometry<f64>,
) -> Result<Geometry<f64>, DropReason> {
    if !geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
    {
        return Err(DropReason::InvalidGeometry);
    }

    let shaped = match (kind, geometry) {
        (GeometryKind::Point, Geometry::Point(p)) => Geometry::Point(*p),
        (GeometryKind::LineString, Geometry::LineString(ls)) => Geometry::LineString(ls.clone()),
        (GeometryKind::Polygon, Geometry::Polygon(p)) => Geometry::Polygon(close_rings(p.clone())),
        (GeometryKind::PromoteToMulti, g) => promote_to_multi(g)?,
        _ => return Err(DropReason::KindMismatch),
    };

    if shaped.is_valid() {
        Ok(shaped)
    } else {
        Err(DropReason::InvalidGeometry)
    }
}

fn promote_to_multi(geometry: &Geometry<f64>) -> Result<Geometry<f64>, DropReason> {
    match geometry {
        Geometry::LineString(ls) => Ok(Geometry::MultiLineString(MultiLineString(vec![
            ls.clone(),
        ]))),
        Geometry::MultiLineString(mls) => Ok(Geometry::MultiLineString(mls.clone())),
        Geometry::Polygon(p) => Ok(Geometry::MultiPolygon(MultiPolygon(vec![close_rings(
            p.clone(),
        )]))),
        Geometry::MultiPolygon(mp) => Ok(Geometry::MultiPolygon(MultiPolygon(
            mp.0.iter().map(|p| close_rings(p.clone())).collect(),
        ))),
        // points never mix part-arity in the sources this serves
        _ => Err(DropReason::KindMismatch),
    }
}

/// Closes unclosed rings. The only repair considered safe: digitizing
/// artifacts leave the last vertex a hair short of the first, and closing
/// is lossless.
fn close_rings(polygon: Polygon<f64>) -> Polygon<f64> {
    let (mut exterior, mut interiors) = polygon.into_inner();
    exterior.close();
    for ring in &mut interiors {
        ring.close();
    }
    Polygon::new(exterior, interiors)
}
