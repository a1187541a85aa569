//! CLI smoke tests: the spec registry listing and a full
//! normalize-then-associate pass over a small GeoPackage fixture.

use assert_cmd::Command;
use geo_types::{Coord, Geometry, LineString, Point};
use hydronet_core_common::{
    ColumnSpec, ColumnType, GeometryType, NormalizedRecord, RecordSink, TableSchema, Value,
};
use hydronet_geopackage::GpkgStore;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn hydronet() -> Command {
    Command::cargo_bin("hydronet").expect("binary builds")
}

/// A source GeoPackage with one main and one hydrant sitting on it.
fn write_fixture(path: &Path) {
    let mut store = GpkgStore::open(path).unwrap();

    let lines = TableSchema {
        table: "wTrunkMain".to_string(),
        columns: vec![ColumnSpec::new("gisid", ColumnType::Text)],
        geometry_type: GeometryType::LineString,
        storage_epsg: 27700,
    };
    store.replace_table(&lines).unwrap();
    store
        .append(
            &lines,
            &[NormalizedRecord {
                fid: 100,
                values: vec![Value::Text("100".to_string())],
                geometry: Some(Geometry::LineString(LineString(vec![
                    Coord { x: 530000.0, y: 180000.0 },
                    Coord { x: 530200.0, y: 180000.0 },
                ]))),
            }],
        )
        .unwrap();

    let points = TableSchema {
        table: "wHydrant".to_string(),
        columns: vec![ColumnSpec::new("gisid", ColumnType::Text)],
        geometry_type: GeometryType::Point,
        storage_epsg: 27700,
    };
    store.replace_table(&points).unwrap();
    store
        .append(
            &points,
            &[NormalizedRecord {
                fid: 7,
                values: vec![Value::Text("7".to_string())],
                geometry: Some(Geometry::Point(Point::new(530050.0, 180000.0))),
            }],
        )
        .unwrap();
}

const CONFIG_YAML: &str = "\
storage_epsg: 27700
reference_epsg: 4326
layers:
- name: trunk_main
  source_layer: wTrunkMain
  source_columns: [gisid]
  geometry_kind: promote_to_multi
  primary_key:
    column: gisid
- name: hydrant
  source_layer: wHydrant
  source_columns: [gisid]
  geometry_kind: point
  primary_key:
    column: gisid
";

#[test]
fn specs_lists_builtin_registry() {
    hydronet()
        .arg("specs")
        .assert()
        .success()
        .stdout(predicate::str::contains("trunk_main"))
        .stdout(predicate::str::contains("operational_site"))
        .stdout(predicate::str::contains("wChamber"))
        .stdout(predicate::str::contains("0.5"));
}

#[test]
fn layers_audits_a_geopackage() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.gpkg");
    write_fixture(&source);

    hydronet()
        .args(["layers", "-s"])
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("wTrunkMain"))
        .stdout(predicate::str::contains("wHydrant"))
        .stdout(predicate::str::contains("27700"));
}

#[test]
fn normalize_then_associate_end_to_end() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.gpkg");
    let target = dir.path().join("normalized.gpkg");
    let config = dir.path().join("specs.yml");
    let artifact = dir.path().join("associations.csv");
    write_fixture(&source);
    std::fs::write(&config, CONFIG_YAML).unwrap();

    hydronet()
        .args(["normalize", "-s"])
        .arg(&source)
        .arg("-o")
        .arg(&target)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("trunk_main"))
        .stdout(predicate::str::contains("hydrant"))
        .stdout(predicate::str::contains("ok"));

    hydronet()
        .args(["associate", "-s"])
        .arg(&target)
        .args(["--lines", "trunk_main", "--points", "hydrant"])
        .arg("--config")
        .arg(&config)
        .arg("-o")
        .arg(&artifact)
        .assert()
        .success()
        .stdout(predicate::str::contains("hydrant"));

    let csv = std::fs::read_to_string(&artifact).unwrap();
    assert!(csv.starts_with("point_id,line_id,layer,match_kind\n"));
    assert!(csv.contains("7,100,hydrant,exact"));
}

#[test]
fn unknown_format_is_an_error() {
    hydronet()
        .args(["layers", "-s", "somewhere", "--format", "gdb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown source format"));
}

#[test]
fn missing_store_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    hydronet()
        .args(["associate", "-s"])
        .arg(dir.path().join("absent.gpkg"))
        .args(["--points", "hydrant", "-o"])
        .arg(dir.path().join("out.csv"))
        .assert()
        .failure();
}
