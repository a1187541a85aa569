//! Normalization pipeline orchestration.
//!
//! [`run`] walks the configured layer specs over one source dataset,
//! applying the schema mapper and the reprojection stage per feature and
//! writing each layer into the target store under overwrite semantics.
//!
//! Layers are isolated units of work: a schema mismatch or unreadable
//! source layer aborts that layer alone, is recorded in its
//! [`LayerOutcome`], and the run moves on. The run as a whole fails only
//! before it starts, on invalid configuration (the caller already holds
//! an open store, which is the other fatal precondition).

use std::collections::HashSet;
use std::path::Path;

use crate::error::{HydronetError, LayerError, StoreError};
use crate::mapper::{self, DropReason, MapOutcome};
use crate::report::{DropCounts, LayerOutcome, RunSummary};
use crate::reproject::{Reprojector, reference_wkt};
use crate::spec::{LayerSpec, PipelineConfig, PrimaryKey, REF_WKT_COLUMN};
use hydronet_core_common::{RecordSink, Value, VectorSource};
use hydronet_geopackage::GpkgStore;
use log::{debug, info, warn};

/// Opens the GeoPackage target store.
///
/// # Errors
///
/// Returns [`StoreError::Open`], the one fatal condition of a run: without
/// a writable store no output is trustworthy, so callers abort immediately
/// instead of limping through layers.
pub fn open_store(path: &Path) -> Result<GpkgStore, HydronetError> {
    GpkgStore::open(path).map_err(|e| {
        HydronetError::Store(StoreError::Open {
            path: path.to_path_buf(),
            source: e,
        })
    })
}

/// Runs the normalization pipeline for every configured layer.
///
/// `layer_filter` restricts the run to the named specs; `None` runs all of
/// them. Filtered names that match no spec are warned about, not errors;
/// operators routinely rerun a single failed layer by name.
///
/// # Errors
///
/// Returns an error only for invalid configuration. Per-layer failures are
/// reported in the [`RunSummary`], never propagated.
pub fn run(
    source: &dyn VectorSource,
    config: &PipelineConfig,
    store: &mut dyn RecordSink,
    layer_filter: Option<&[String]>,
) -> Result<RunSummary, HydronetError> {
    config.validate()?;

    if let Some(filter) = layer_filter {
        for name in filter {
            if config.layer(name).is_none() {
                warn!("--layers names unknown layer '{name}'; ignoring");
            }
        }
    }

    let selected: Vec<&LayerSpec> = config
        .layers
        .iter()
        .filter(|spec| layer_filter.is_none_or(|f| f.iter().any(|n| n == &spec.name)))
        .collect();
    info!("normalizing {} layer(s)", selected.len());

    let mut summary = RunSummary::default();
    for spec in selected {
        let outcome = match run_layer(source, config, spec, store) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("layer '{}' failed: {e}", spec.name);
                let mut outcome = LayerOutcome::new(&spec.name, spec.target_table());
                outcome.error = Some(e.to_string());
                outcome
            },
        };
        summary.layers.push(outcome);
    }

    info!(
        "run complete: {} record(s) written, {} layer failure(s)",
        summary.total_written(),
        summary.failures().len()
    );
    Ok(summary)
}

fn run_layer(
    source: &dyn VectorSource,
    config: &PipelineConfig,
    spec: &LayerSpec,
    store: &mut dyn RecordSink,
) -> Result<LayerOutcome, LayerError> {
    let source_layer = spec.source_layer();
    let mut outcome = LayerOutcome::new(&spec.name, spec.target_table());

    let source_epsg = source
        .declared_epsg(source_layer)
        .map_err(|e| LayerError::SourceRead {
            layer: source_layer.to_string(),
            source: e,
        })?
        .unwrap_or_else(|| config.fallback_source_epsg());
    debug!(
        "layer '{}': source EPSG:{source_epsg}, storage EPSG:{}",
        spec.name, config.storage_epsg
    );

    let to_storage =
        Reprojector::new(source_epsg, config.storage_epsg).map_err(|e| LayerError::SourceRead {
            layer: source_layer.to_string(),
            source: e.into(),
        })?;
    let to_reference = Reprojector::new(config.storage_epsg, config.reference_epsg).map_err(|e| {
        LayerError::SourceRead {
            layer: source_layer.to_string(),
            source: e.into(),
        }
    })?;

    let schema = spec.table_schema(config.storage_epsg);
    let ref_index = schema
        .column_index(REF_WKT_COLUMN)
        .unwrap_or(schema.columns.len() - 1);

    // Overwrite semantics: the table is replaced up front, so a rerun after
    // a killed or aborted layer always starts clean.
    store
        .replace_table(&schema)
        .map_err(|e| LayerError::Write {
            layer: spec.name.clone(),
            table: schema.table.clone(),
            source: e,
        })?;

    let stream = source
        .read_layer(source_layer)
        .map_err(|e| LayerError::SourceRead {
            layer: source_layer.to_string(),
            source: e,
        })?;

    let track_ids = matches!(spec.primary_key, PrimaryKey::Column(_));
    let mut seen_ids: HashSet<i64> = HashSet::new();
    let mut batch = Vec::new();
    let mut sequence = 0_i64;

    for feature in stream {
        let feature = feature.map_err(|e| LayerError::SourceRead {
            layer: source_layer.to_string(),
            source: e,
        })?;
        outcome.read += 1;
        sequence += 1;

        let mut record = match mapper::map_feature(spec, &schema, &feature, sequence)? {
            MapOutcome::Mapped(record) => record,
            MapOutcome::Dropped(reason) => {
                count_drop(&mut outcome.drops, reason);
                continue;
            },
        };

        if track_ids && !seen_ids.insert(record.fid) {
            debug!("layer '{}': duplicate id {}", spec.name, record.fid);
            outcome.drops.duplicate_id += 1;
            continue;
        }

        if let Some(geometry) = record.geometry.take() {
            match to_storage.project(&geometry) {
                Ok(stored) => {
                    match reference_wkt(&to_reference, &stored) {
                        Some(wkt) => record.values[ref_index] = Value::Text(wkt),
                        None => outcome.ref_wkt_warnings += 1,
                    }
                    record.geometry = Some(stored);
                },
                Err(e) => {
                    debug!("layer '{}': feature {} outside storage CRS domain: {e}", spec.name, record.fid);
                    outcome.drops.reprojection += 1;
                    continue;
                },
            }
        }

        batch.push(record);
        if batch.len() >= config.batch_size {
            flush(store, &schema, spec, &mut batch, &mut outcome)?;
        }
    }
    flush(store, &schema, spec, &mut batch, &mut outcome)?;

    info!(
        "layer '{}': {} read, {} written, {} dropped, {} reference warning(s)",
        spec.name,
        outcome.read,
        outcome.written,
        outcome.drops.total(),
        outcome.ref_wkt_warnings
    );
    Ok(outcome)
}

fn flush(
    store: &mut dyn RecordSink,
    schema: &hydronet_core_common::TableSchema,
    spec: &LayerSpec,
    batch: &mut Vec<hydronet_core_common::NormalizedRecord>,
    outcome: &mut LayerOutcome,
) -> Result<(), LayerError> {
    if batch.is_empty() {
        return Ok(());
    }
    store.append(schema, batch).map_err(|e| LayerError::Write {
        layer: spec.name.clone(),
        table: schema.table.clone(),
        source: e,
    })?;
    outcome.written += batch.len() as u64;
    batch.clear();
    Ok(())
}

fn count_drop(drops: &mut DropCounts, reason: DropReason) {
    match reason {
        DropReason::MissingGeometry => drops.missing_geometry += 1,
        DropReason::KindMismatch => drops.kind_mismatch += 1,
        DropReason::InvalidGeometry => drops.invalid_geometry += 1,
        DropReason::BadId => drops.bad_id += 1,
    }
}
