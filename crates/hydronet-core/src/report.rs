//! Run and association summaries.
//!
//! Everything the operator sees at end of run lives here: per-layer record
//! counts and errors for normalization, per-layer match statistics for
//! association, and the durable point→line CSV artifact consumed by the
//! downstream graph-construction stage.

use crate::associate::Association;
use std::io::Write;
use std::path::Path;

/// Counts of features dropped during normalization, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    /// No geometry under the `skip` policy.
    pub missing_geometry: u64,
    /// Geometry class contradicted the spec.
    pub kind_mismatch: u64,
    /// Geometry invalid beyond safe repair.
    pub invalid_geometry: u64,
    /// Primary-key value not an integer.
    pub bad_id: u64,
    /// Primary-key value seen before in the layer.
    pub duplicate_id: u64,
    /// Geometry outside the storage-CRS domain.
    pub reprojection: u64,
}

impl DropCounts {
    /// Total features dropped.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.missing_geometry
            + self.kind_mismatch
            + self.invalid_geometry
            + self.bad_id
            + self.duplicate_id
            + self.reprojection
    }
}

/// Outcome of normalizing one layer.
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    /// Layer name from the spec.
    pub layer: String,
    /// Target table written (or attempted).
    pub table: String,
    /// Features read from the source.
    pub read: u64,
    /// Records written to the target table.
    pub written: u64,
    /// Dropped features by reason.
    pub drops: DropCounts,
    /// Features kept with a NULL reference-CRS column.
    pub ref_wkt_warnings: u64,
    /// Layer-level failure, when the layer aborted.
    pub error: Option<String>,
}

impl LayerOutcome {
    /// Fresh outcome for a layer about to run.
    #[must_use]
    pub fn new(layer: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            table: table.into(),
            read: 0,
            written: 0,
            drops: DropCounts::default(),
            ref_wkt_warnings: 0,
            error: None,
        }
    }

    /// `true` when the layer ran to completion.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-layer summary of one normalization run. Never all-or-nothing: every
/// layer reports its own success or failure.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// One outcome per configured layer, in run order.
    pub layers: Vec<LayerOutcome>,
}

impl RunSummary {
    /// `true` when every layer succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.layers.iter().all(LayerOutcome::succeeded)
    }

    /// Total records written across layers.
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.layers.iter().map(|l| l.written).sum()
    }

    /// Layers that aborted, with their errors.
    #[must_use]
    pub fn failures(&self) -> Vec<&LayerOutcome> {
        self.layers.iter().filter(|l| !l.succeeded()).collect()
    }
}

/// Match statistics for one point layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMatchStats {
    /// Point-layer name.
    pub layer: String,
    /// Features read from the layer.
    pub read: u64,
    /// Exact intersection matches.
    pub exact: u64,
    /// Buffered fallback matches.
    pub buffered: u64,
    /// Points excluded for matching multiple lines (either pass).
    pub ambiguous: u64,
}

impl LayerMatchStats {
    /// Fresh statistics for a layer.
    #[must_use]
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            read: 0,
            exact: 0,
            buffered: 0,
            ambiguous: 0,
        }
    }

    /// Points with no row in the association output. Ambiguous points
    /// count as unmatched: they were excluded, not assigned.
    #[must_use]
    pub fn unmatched(&self) -> u64 {
        self.read.saturating_sub(self.exact + self.buffered)
    }
}

/// A point layer the association run could not read.
#[derive(Debug, Clone)]
pub struct SkippedLayer {
    /// Layer name.
    pub layer: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of one association run: statistics plus the mapping table.
#[derive(Debug, Clone, Default)]
pub struct AssociationReport {
    /// Line features read for the index.
    pub lines_read: u64,
    /// Per-layer match statistics, in request order.
    pub stats: Vec<LayerMatchStats>,
    /// Layers skipped because they could not be read.
    pub skipped: Vec<SkippedLayer>,
    /// The unioned point→line mapping.
    pub associations: Vec<Association>,
}

impl AssociationReport {
    /// Empty report for a run over `lines_read` line features.
    #[must_use]
    pub fn new(lines_read: u64) -> Self {
        Self {
            lines_read,
            ..Self::default()
        }
    }

    /// Writes the mapping table as CSV: `point_id,line_id,layer,match_kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying writer fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["point_id", "line_id", "layer", "match_kind"])?;
        for association in &self.associations {
            csv_writer.write_record([
                association.point_id.to_string(),
                association.line_id.to_string(),
                association.layer.clone(),
                association.match_kind.as_str().to_string(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Writes the mapping table to a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::associate::MatchKind;

    #[test]
    fn unmatched_includes_ambiguous() {
        let mut stats = LayerMatchStats::new("chamber");
        stats.read = 10;
        stats.exact = 6;
        stats.buffered = 2;
        stats.ambiguous = 1;
        assert_eq!(stats.unmatched(), 2);
    }

    #[test]
    fn csv_artifact_shape() {
        let mut report = AssociationReport::new(3);
        report.associations.push(Association {
            point_id: 11,
            line_id: 4,
            layer: "hydrant".to_string(),
            match_kind: MatchKind::Exact,
        });
        report.associations.push(Association {
            point_id: 12,
            line_id: 4,
            layer: "chamber".to_string(),
            match_kind: MatchKind::Buffered,
        });

        let mut buffer = Vec::new();
        report.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "point_id,line_id,layer,match_kind");
        assert_eq!(lines[1], "11,4,hydrant,exact");
        assert_eq!(lines[2], "12,4,chamber,buffered");
    }

    #[test]
    fn summary_failures() {
        let mut summary = RunSummary::default();
        summary.layers.push(LayerOutcome::new("hydrant", "hydrant"));
        let mut failed = LayerOutcome::new("chamber", "chamber");
        failed.error = Some("missing column".to_string());
        summary.layers.push(failed);

        assert!(!summary.all_succeeded());
        assert_eq!(summary.failures().len(), 1);
        assert_eq!(summary.failures()[0].layer, "chamber");
    }
}
