//! Spatial association of point assets to the line network.
//!
//! Two passes per point layer, both over an R-tree of line envelopes:
//!
//! 1. **Exact**: the point topologically intersects a line. A point
//!    touching more than one line sits on a junction or a digitizing
//!    artifact and is excluded rather than assigned arbitrarily.
//! 2. **Buffered**: only for layers with a configured tolerance, and only
//!    for points the exact pass missed: a line within `tolerance` storage
//!    units matches (equivalently, a circle of that radius around the
//!    point intersects the line). The same multi-match exclusion applies.
//!
//! The union has at most one row per point. Ambiguous and unmatched points
//! are counted, never guessed at.

use crate::error::{HydronetError, LayerError};
use crate::report::{AssociationReport, LayerMatchStats, SkippedLayer};
use geo::{BoundingRect, EuclideanDistance, Intersects};
use geo_types::{Geometry, Point};
use hydronet_core_common::VectorSource;
use log::{info, warn};
use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

/// How a point matched its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Topological intersection, no buffering.
    Exact,
    /// Tolerance-buffer fallback match.
    Buffered,
}

impl MatchKind {
    /// Label used in the report artifact.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Buffered => "buffered",
        }
    }
}

/// One row of the point→line mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Feature id of the point asset.
    pub point_id: i64,
    /// Feature id of the owning line.
    pub line_id: i64,
    /// Normalized point-layer name.
    pub layer: String,
    /// How the match was made.
    pub match_kind: MatchKind,
}

/// A point asset prepared for matching.
#[derive(Debug, Clone)]
pub struct PointRecord {
    /// Feature id.
    pub id: i64,
    /// Location in the storage CRS.
    pub point: Point<f64>,
}

/// A network line prepared for matching.
#[derive(Debug, Clone)]
pub struct LineRecord {
    /// Feature id.
    pub id: i64,
    /// Line geometry in the storage CRS.
    pub geometry: Geometry<f64>,
}

/// A point layer to associate, with its optional tolerance.
#[derive(Debug, Clone)]
pub struct PointLayerRequest {
    /// Normalized layer (table) name.
    pub layer: String,
    /// Buffered-fallback tolerance in storage-CRS units.
    pub tolerance: Option<f64>,
}

/// Immutable envelope index over the line network.
///
/// Built once, then shared read-only across point layers; lookups narrow
/// candidates by bounding box before any exact geometry test runs.
pub struct LineIndex {
    tree: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
    lines: Vec<LineRecord>,
}

impl LineIndex {
    /// Bulk-loads the index from line records.
    ///
    /// Lines with empty geometry cannot match anything and are left out of
    /// the tree (they still count toward [`LineIndex::len`]).
    #[must_use]
    pub fn build(lines: Vec<LineRecord>) -> Self {
        let entries: Vec<GeomWithData<Rectangle<[f64; 2]>, usize>> = lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| {
                line.geometry.bounding_rect().map(|rect| {
                    GeomWithData::new(
                        Rectangle::from_corners(
                            [rect.min().x, rect.min().y],
                            [rect.max().x, rect.max().y],
                        ),
                        idx,
                    )
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            lines,
        }
    }

    /// Number of lines behind the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// `true` when no lines are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn candidates(&self, envelope: AABB<[f64; 2]>) -> impl Iterator<Item = &LineRecord> {
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| &self.lines[entry.data])
    }
}

fn point_to_line_distance(point: &Point<f64>, geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::LineString(ls) => point.euclidean_distance(ls),
        Geometry::MultiLineString(mls) => point.euclidean_distance(mls),
        // The network contract is line geometry; anything else only matches
        // by direct intersection.
        other => {
            if point.intersects(other) {
                0.0
            } else {
                f64::INFINITY
            }
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointFate {
    Exact(i64),
    Buffered(i64),
    Ambiguous,
    Unmatched,
}

fn classify(point: &PointRecord, index: &LineIndex, tolerance: Option<f64>) -> PointFate {
    let at = [point.point.x(), point.point.y()];

    let mut exact = index
        .candidates(AABB::from_corners(at, at))
        .filter(|line| point.point.intersects(&line.geometry));
    match (exact.next(), exact.next()) {
        (Some(line), None) => return PointFate::Exact(line.id),
        (Some(_), Some(_)) => return PointFate::Ambiguous,
        _ => {},
    }

    let Some(tolerance) = tolerance else {
        return PointFate::Unmatched;
    };

    let envelope = AABB::from_corners(
        [at[0] - tolerance, at[1] - tolerance],
        [at[0] + tolerance, at[1] + tolerance],
    );
    let mut buffered = index
        .candidates(envelope)
        .filter(|line| point_to_line_distance(&point.point, &line.geometry) <= tolerance);
    match (buffered.next(), buffered.next()) {
        (Some(line), None) => PointFate::Buffered(line.id),
        (Some(_), Some(_)) => PointFate::Ambiguous,
        _ => PointFate::Unmatched,
    }
}

/// Associates one point layer against the line index.
///
/// Returns the associations in point order plus the layer's match
/// statistics. `read` counts every feature offered, including those that
/// never reached matching (no usable point geometry).
#[must_use]
pub fn associate_points(
    layer: &str,
    points: &[PointRecord],
    index: &LineIndex,
    tolerance: Option<f64>,
) -> (Vec<Association>, LayerMatchStats) {
    let fates: Vec<PointFate> = points
        .par_iter()
        .map(|point| classify(point, index, tolerance))
        .collect();

    let mut stats = LayerMatchStats::new(layer);
    stats.read = points.len() as u64;
    let mut associations = Vec::new();

    for (point, fate) in points.iter().zip(fates) {
        let (line_id, match_kind) = match fate {
            PointFate::Exact(line_id) => (line_id, MatchKind::Exact),
            PointFate::Buffered(line_id) => (line_id, MatchKind::Buffered),
            PointFate::Ambiguous => {
                stats.ambiguous += 1;
                continue;
            },
            PointFate::Unmatched => continue,
        };
        match match_kind {
            MatchKind::Exact => stats.exact += 1,
            MatchKind::Buffered => stats.buffered += 1,
        }
        associations.push(Association {
            point_id: point.id,
            line_id,
            layer: layer.to_string(),
            match_kind,
        });
    }

    (associations, stats)
}

fn line_records(
    source: &dyn VectorSource,
    layer: &str,
) -> Result<(Vec<LineRecord>, u64), LayerError> {
    let stream = source
        .read_layer(layer)
        .map_err(|e| LayerError::SourceRead {
            layer: layer.to_string(),
            source: e,
        })?;

    let mut read = 0_u64;
    let mut lines = Vec::new();
    for feature in stream {
        let feature = feature.map_err(|e| LayerError::SourceRead {
            layer: layer.to_string(),
            source: e,
        })?;
        read += 1;
        let (Some(id), Some(geometry)) = (feature.fid, feature.geometry) else {
            continue;
        };
        lines.push(LineRecord { id, geometry });
    }
    Ok((lines, read))
}

fn point_records(source: &dyn VectorSource, layer: &str) -> anyhow::Result<(Vec<PointRecord>, u64)> {
    let stream = source.read_layer(layer)?;
    let mut read = 0_u64;
    let mut points = Vec::new();
    for feature in stream {
        let feature = feature?;
        read += 1;
        let Some(id) = feature.fid else { continue };
        if let Some(Geometry::Point(point)) = feature.geometry {
            points.push(PointRecord { id, point });
        }
    }
    Ok((points, read))
}

/// Associates every requested point layer of a normalized store against a
/// line layer.
///
/// Partial results are always returned: a point layer that cannot be read
/// is recorded as skipped and the remaining layers proceed. Matching runs
/// in parallel across layers over the shared immutable index.
///
/// # Errors
///
/// Returns an error only when the *line* layer itself is unreadable:
/// there is nothing to associate against without it. An empty line layer
/// is not an error; every point simply ends up unmatched.
pub fn associate_layers(
    source: &dyn VectorSource,
    line_layer: &str,
    point_layers: &[PointLayerRequest],
) -> Result<AssociationReport, HydronetError> {
    let (lines, lines_read) = line_records(source, line_layer)?;
    info!(
        "indexing {} line(s) from '{line_layer}' ({lines_read} read)",
        lines.len()
    );
    let index = LineIndex::build(lines);

    // I/O first (the source is not shareable across threads), matching in
    // parallel afterwards.
    let mut loaded: Vec<(String, Option<f64>, Vec<PointRecord>, u64)> = Vec::new();
    let mut skipped = Vec::new();
    for request in point_layers {
        match point_records(source, &request.layer) {
            Ok((points, read)) => {
                loaded.push((request.layer.clone(), request.tolerance, points, read));
            },
            Err(e) => {
                warn!("skipping point layer '{}': {e}", request.layer);
                skipped.push(SkippedLayer {
                    layer: request.layer.clone(),
                    reason: e.to_string(),
                });
            },
        }
    }

    let mut results: Vec<(Vec<Association>, LayerMatchStats)> = loaded
        .par_iter()
        .map(|(layer, tolerance, points, read)| {
            let (associations, mut stats) = associate_points(layer, points, &index, *tolerance);
            stats.read = *read;
            (associations, stats)
        })
        .collect();

    let mut report = AssociationReport::new(lines_read);
    report.skipped = skipped;
    for (associations, stats) in results.drain(..) {
        info!(
            "layer '{}': {} exact, {} buffered, {} ambiguous, {} unmatched of {}",
            stats.layer,
            stats.exact,
            stats.buffered,
            stats.ambiguous,
            stats.unmatched(),
            stats.read
        );
        report.stats.push(stats);
        report.associations.extend(associations);
    }
    Ok(report)
}
