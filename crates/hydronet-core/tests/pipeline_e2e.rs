//! End-to-end: synthetic source → normalization pipeline → GeoPackage →
//! association engine → report artifact.

use geo_types::{Coord, Geometry, LineString, Point, Polygon};
use hydronet_core::associate::{MatchKind, PointLayerRequest, associate_layers};
use hydronet_core::pipeline;
use hydronet_core::spec::PipelineConfig;
use hydronet_core_common::{Feature, MemorySource, Value, VectorSource};
use hydronet_geopackage::{GpkgSource, GpkgStore};
use tempfile::TempDir;

const CONFIG_YAML: &str = "\
storage_epsg: 27700
reference_epsg: 4326
layers:
- name: trunk_main
  source_layer: wTrunkMain
  source_columns: [GISID, MATERIAL]
  geometry_kind: promote_to_multi
  primary_key:
    column: GISID
- name: hydrant
  source_layer: wHydrant
  source_columns: [GISID, tag]
  geometry_kind: point
  primary_key:
    column: GISID
  derived:
  - name: acoustic_logger
    rule:
      flag:
        source: acoustic_logger
        default: false
- name: chamber
  source_layer: wChamber
  source_columns: [GISID, tag]
  geometry_kind: point
  primary_key:
    column: GISID
  tolerance: 0.5
- name: dma
  source_layer: wDMA
  source_columns: [DMANAME, DMAAREACODE]
  geometry_kind: promote_to_multi
";

fn attr(name: &str, value: Value) -> (String, Value) {
    (name.to_string(), value)
}

fn line_feature(gisid: i64, material: &str, coords: &[(f64, f64)]) -> Feature {
    Feature::new(
        vec![
            attr("GISID", Value::Integer(gisid)),
            attr("MATERIAL", Value::from(material)),
        ],
        Some(Geometry::LineString(LineString(
            coords.iter().map(|&(x, y)| Coord { x, y }).collect(),
        ))),
    )
}

fn point_feature(gisid: i64, tag: &str, x: f64, y: f64) -> Feature {
    Feature::new(
        vec![
            attr("GISID", Value::Integer(gisid)),
            attr("tag", Value::from(tag)),
        ],
        Some(Geometry::Point(Point::new(x, y))),
    )
}

/// A small synthetic network in British National Grid coordinates: one
/// main running east, one hydrant on it, chambers near and far.
fn network_source() -> MemorySource {
    let mut source = MemorySource::new();
    source.push_layer(
        "wTrunkMain",
        Some(27700),
        vec![
            line_feature(100, "Ductile Iron", &[(530000.0, 180000.0), (530200.0, 180000.0)]),
            line_feature(101, "PVC", &[(530000.0, 180500.0), (530200.0, 180500.0)]),
        ],
    );
    source.push_layer(
        "wHydrant",
        Some(27700),
        vec![point_feature(1, "H1", 530050.0, 180000.0)],
    );
    source.push_layer(
        "wChamber",
        Some(27700),
        vec![
            // 0.3 off main 100: buffered match at tolerance 0.5
            point_feature(11, "C1", 530070.0, 180000.3),
            // nowhere near the network
            point_feature(12, "C2", 530070.0, 181000.0),
        ],
    );
    source.push_layer(
        "wDMA",
        Some(27700),
        vec![Feature::new(
            vec![
                attr("DMANAME", Value::from("North")),
                attr("DMAAREACODE", Value::from("N01")),
            ],
            Some(Geometry::Polygon(Polygon::new(
                LineString(vec![
                    Coord { x: 529000.0, y: 179000.0 },
                    Coord { x: 531000.0, y: 179000.0 },
                    Coord { x: 531000.0, y: 181000.0 },
                    Coord { x: 529000.0, y: 181000.0 },
                    Coord { x: 529000.0, y: 179000.0 },
                ]),
                vec![],
            ))),
        )],
    );
    source
}

#[test]
fn normalize_then_associate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("network.gpkg");
    let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
    let source = network_source();

    let summary = {
        let mut store = GpkgStore::open(&path).unwrap();
        pipeline::run(&source, &config, &mut store, None).unwrap()
    };
    assert!(summary.all_succeeded(), "failures: {:?}", summary.failures());
    assert_eq!(summary.total_written(), 6);

    // schema invariant: retained ∪ derived ∪ {ref_wkt}, lower-cased
    let store = GpkgSource::open(&path).unwrap();
    let hydrants: Vec<Feature> = store
        .read_layer("hydrant")
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert_eq!(hydrants.len(), 1);
    let hydrant = &hydrants[0];
    assert_eq!(hydrant.fid, Some(1));
    let columns: Vec<&str> = hydrant.attributes.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(columns, vec!["gisid", "tag", "acoustic_logger", "ref_wkt"]);
    assert_eq!(hydrant.get("gisid"), Some(&Value::Text("1".to_string())));
    assert_eq!(hydrant.get("acoustic_logger"), Some(&Value::Integer(0)));

    // the reference column carries WGS84 WKT (a London longitude/latitude)
    let Some(Value::Text(ref_wkt)) = hydrant.get("ref_wkt") else {
        panic!("expected reference WKT, got {:?}", hydrant.get("ref_wkt"));
    };
    assert!(ref_wkt.starts_with("POINT("), "unexpected WKT: {ref_wkt}");

    // promoted line layer reads back multi-part
    let mains: Vec<Feature> = store
        .read_layer("trunk_main")
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert!(matches!(
        mains[0].geometry,
        Some(Geometry::MultiLineString(_))
    ));

    // association over the normalized store
    let report = associate_layers(
        &store,
        "trunk_main",
        &[
            PointLayerRequest {
                layer: "hydrant".to_string(),
                tolerance: None,
            },
            PointLayerRequest {
                layer: "chamber".to_string(),
                tolerance: Some(0.5),
            },
            PointLayerRequest {
                layer: "valve".to_string(),
                tolerance: None,
            },
        ],
    )
    .unwrap();

    assert_eq!(report.lines_read, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].layer, "valve");

    assert_eq!(report.associations.len(), 2);
    let hydrant_row = report
        .associations
        .iter()
        .find(|a| a.layer == "hydrant")
        .unwrap();
    assert_eq!(hydrant_row.point_id, 1);
    assert_eq!(hydrant_row.line_id, 100);
    assert_eq!(hydrant_row.match_kind, MatchKind::Exact);

    let chamber_row = report
        .associations
        .iter()
        .find(|a| a.layer == "chamber")
        .unwrap();
    assert_eq!(chamber_row.point_id, 11);
    assert_eq!(chamber_row.line_id, 100);
    assert_eq!(chamber_row.match_kind, MatchKind::Buffered);

    let chamber_stats = report.stats.iter().find(|s| s.layer == "chamber").unwrap();
    assert_eq!(chamber_stats.read, 2);
    assert_eq!(chamber_stats.buffered, 1);
    assert_eq!(chamber_stats.unmatched(), 1);

    // the durable artifact
    let csv_path = dir.path().join("associations.csv");
    report.write_csv_path(&csv_path).unwrap();
    let csv_text = std::fs::read_to_string(&csv_path).unwrap();
    assert!(csv_text.starts_with("point_id,line_id,layer,match_kind\n"));
    assert!(csv_text.contains("1,100,hydrant,exact"));
    assert!(csv_text.contains("11,100,chamber,buffered"));
}

#[test]
fn rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("network.gpkg");
    let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
    let source = network_source();

    let rows = |path: &std::path::Path| -> Vec<(Option<i64>, Option<Value>)> {
        let store = GpkgSource::open(path).unwrap();
        let mut rows = Vec::new();
        for layer in store.layer_names().unwrap() {
            for feature in store.read_layer(&layer).unwrap() {
                let feature = feature.unwrap();
                rows.push((feature.fid, feature.get("ref_wkt").cloned()));
            }
        }
        rows
    };

    for _ in 0..2 {
        let mut store = GpkgStore::open(&path).unwrap();
        let summary = pipeline::run(&source, &config, &mut store, None).unwrap();
        assert!(summary.all_succeeded());
    }
    let first = rows(&path);

    let mut store = GpkgStore::open(&path).unwrap();
    pipeline::run(&source, &config, &mut store, None).unwrap();
    drop(store);
    assert_eq!(first, rows(&path));
}

#[test]
fn schema_mismatch_skips_layer_but_not_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("network.gpkg");
    let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();

    let mut source = network_source();
    // rebuild the hydrant layer without the GISID column the spec demands
    source = {
        let mut stripped = MemorySource::new();
        for layer in ["wTrunkMain", "wChamber", "wDMA"] {
            let features: Vec<Feature> = source
                .read_layer(layer)
                .unwrap()
                .map(|f| f.unwrap())
                .collect();
            stripped.push_layer(layer, Some(27700), features);
        }
        stripped.push_layer(
            "wHydrant",
            Some(27700),
            vec![Feature::new(
                vec![attr("tag", Value::from("H1"))],
                Some(Geometry::Point(Point::new(530050.0, 180000.0))),
            )],
        );
        stripped
    };

    let mut store = GpkgStore::open(&path).unwrap();
    let summary = pipeline::run(&source, &config, &mut store, None).unwrap();
    drop(store);

    assert!(!summary.all_succeeded());
    let failures = summary.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].layer, "hydrant");
    assert!(failures[0].error.as_deref().unwrap().contains("GISID"));

    // every other layer still produced output
    let reader = GpkgSource::open(&path).unwrap();
    for layer in ["trunk_main", "chamber", "dma"] {
        assert!(
            reader.read_layer(layer).unwrap().count() > 0,
            "layer '{layer}' should have rows"
        );
    }
}

#[test]
fn missing_source_layer_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("network.gpkg");
    let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();

    let mut source = MemorySource::new();
    source.push_layer(
        "wTrunkMain",
        Some(27700),
        vec![line_feature(1, "PVC", &[(530000.0, 180000.0), (530100.0, 180000.0)])],
    );

    let mut store = GpkgStore::open(&path).unwrap();
    let summary = pipeline::run(&source, &config, &mut store, None).unwrap();

    assert_eq!(summary.layers.len(), 4);
    let mains = summary.layers.iter().find(|l| l.layer == "trunk_main").unwrap();
    assert!(mains.succeeded());
    assert_eq!(mains.written, 1);
    assert_eq!(summary.failures().len(), 3);
}

#[test]
fn layer_filter_limits_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("network.gpkg");
    let config = PipelineConfig::from_yaml_str(CONFIG_YAML).unwrap();
    let source = network_source();

    let mut store = GpkgStore::open(&path).unwrap();
    let summary = pipeline::run(
        &source,
        &config,
        &mut store,
        Some(&["hydrant".to_string()]),
    )
    .unwrap();
    drop(store);

    assert_eq!(summary.layers.len(), 1);
    assert_eq!(summary.layers[0].layer, "hydrant");

    let reader = GpkgSource::open(&path).unwrap();
    assert_eq!(reader.layer_names().unwrap(), vec!["hydrant".to_string()]);
}
