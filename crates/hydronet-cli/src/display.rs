//! Table rendering for run summaries, match statistics, and the spec
//! registry.

use hydronet_core::report::{AssociationReport, RunSummary};
use hydronet_core::source::LayerAudit;
use hydronet_core::spec::{GeometryKind, LayerSpec, PipelineConfig, PrimaryKey};
use tabled::{Table, Tabled};

/// Table row for one normalized layer.
#[derive(Tabled)]
struct LayerRow {
    #[tabled(rename = "Layer")]
    layer: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Read")]
    read: u64,
    #[tabled(rename = "Written")]
    written: u64,
    #[tabled(rename = "Dropped")]
    dropped: u64,
    #[tabled(rename = "Ref Warnings")]
    ref_warnings: u64,
    #[tabled(rename = "Status")]
    status: String,
}

/// Renders the end-of-run normalization summary.
#[must_use]
pub fn run_summary_table(summary: &RunSummary) -> String {
    let rows: Vec<LayerRow> = summary
        .layers
        .iter()
        .map(|outcome| LayerRow {
            layer: outcome.layer.clone(),
            table: outcome.table.clone(),
            read: outcome.read,
            written: outcome.written,
            dropped: outcome.drops.total(),
            ref_warnings: outcome.ref_wkt_warnings,
            status: outcome
                .error
                .clone()
                .map_or_else(|| "ok".to_string(), |e| format!("failed: {e}")),
        })
        .collect();
    Table::new(rows).to_string()
}

/// Table row for one point layer's match statistics.
#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Layer")]
    layer: String,
    #[tabled(rename = "Read")]
    read: u64,
    #[tabled(rename = "Exact")]
    exact: u64,
    #[tabled(rename = "Buffered")]
    buffered: u64,
    #[tabled(rename = "Ambiguous")]
    ambiguous: u64,
    #[tabled(rename = "Unmatched")]
    unmatched: u64,
}

/// Renders the association statistics, skipped layers included.
#[must_use]
pub fn association_table(report: &AssociationReport) -> String {
    let mut rows: Vec<MatchRow> = report
        .stats
        .iter()
        .map(|stats| MatchRow {
            layer: stats.layer.clone(),
            read: stats.read,
            exact: stats.exact,
            buffered: stats.buffered,
            ambiguous: stats.ambiguous,
            unmatched: stats.unmatched(),
        })
        .collect();
    for skipped in &report.skipped {
        rows.push(MatchRow {
            layer: format!("{} (skipped: {})", skipped.layer, skipped.reason),
            read: 0,
            exact: 0,
            buffered: 0,
            ambiguous: 0,
            unmatched: 0,
        });
    }
    Table::new(rows).to_string()
}

/// Table row for one audited source layer.
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "Layer")]
    layer: String,
    #[tabled(rename = "Features")]
    features: u64,
    #[tabled(rename = "Geometry")]
    geometry: String,
    #[tabled(rename = "EPSG")]
    epsg: String,
}

/// Renders the source audit listing.
#[must_use]
pub fn audit_table(audits: &[LayerAudit]) -> String {
    let rows: Vec<AuditRow> = audits
        .iter()
        .map(|audit| AuditRow {
            layer: audit.name.clone(),
            features: audit.features,
            geometry: if audit.geometry_types.is_empty() {
                "-".to_string()
            } else {
                audit.geometry_types.join(", ")
            },
            epsg: audit
                .epsg
                .map_or_else(|| "-".to_string(), |e| e.to_string()),
        })
        .collect();
    Table::new(rows).to_string()
}

fn geometry_kind_name(kind: GeometryKind) -> &'static str {
    match kind {
        GeometryKind::Point => "point",
        GeometryKind::LineString => "line_string",
        GeometryKind::Polygon => "polygon",
        GeometryKind::PromoteToMulti => "promote_to_multi",
    }
}

fn primary_key_name(spec: &LayerSpec) -> String {
    match &spec.primary_key {
        PrimaryKey::Sequential => "sequential".to_string(),
        PrimaryKey::Column(column) => format!("column {column}"),
    }
}

/// Table row for one layer spec.
#[derive(Tabled)]
struct SpecRow {
    #[tabled(rename = "Layer")]
    layer: String,
    #[tabled(rename = "Source Layer")]
    source_layer: String,
    #[tabled(rename = "Geometry")]
    geometry: String,
    #[tabled(rename = "Columns")]
    columns: String,
    #[tabled(rename = "Primary Key")]
    primary_key: String,
    #[tabled(rename = "Tolerance")]
    tolerance: String,
}

/// Renders the layer-spec registry.
#[must_use]
pub fn spec_table(config: &PipelineConfig) -> String {
    let rows: Vec<SpecRow> = config
        .layers
        .iter()
        .map(|spec| SpecRow {
            layer: spec.name.clone(),
            source_layer: spec.source_layer().to_string(),
            geometry: geometry_kind_name(spec.geometry_kind).to_string(),
            columns: spec.source_columns.join(", "),
            primary_key: primary_key_name(spec),
            tolerance: spec
                .tolerance
                .map_or_else(|| "-".to_string(), |t| t.to_string()),
        })
        .collect();
    Table::new(rows).to_string()
}
