use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const ASAP_SAMPLE: &str = r##"<?xml version="1.0"?>
<ASAP_Annotations>
  <Annotations>
    <Annotation Name="Annotation 0" Type="Polygon" PartOfGroup="Tumor" Color="#F4FA58">
      <Coordinates>
        <Coordinate Order="0" X="0" Y="0" />
        <Coordinate Order="1" X="10" Y="0" />
        <Coordinate Order="2" X="10" Y="20" />
      </Coordinates>
    </Annotation>
    <Annotation Name="Box" Type="Rectangle" PartOfGroup="Stroma" Color="#00FF00">
      <Coordinates>
        <Coordinate Order="0" X="10" Y="10" />
        <Coordinate Order="1" X="50" Y="10" />
        <Coordinate Order="2" X="50" Y="50" />
        <Coordinate Order="3" X="10" Y="50" />
      </Coordinates>
    </Annotation>
  </Annotations>
  <AnnotationGroups>
    <Group Name="Tumor" PartOfGroup="None" Color="#F4FA58"><Attributes /></Group>
    <Group Name="Stroma" PartOfGroup="None" Color="#00FF00"><Attributes /></Group>
  </AnnotationGroups>
</ASAP_Annotations>"##;

fn write_fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("fixture should be written");
    path
}

fn json_stdout(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

#[test]
fn formats_lists_builtin_convertors() {
    let output = cargo_bin_cmd!("wsi-annotations").arg("formats").assert().success().get_output().stdout.clone();

    insta::assert_json_snapshot!(json_stdout(&output), @r#"
    [
      {
        "format": "native",
        "suffix": ".json"
      },
      {
        "format": "asap-xml",
        "suffix": ".xml"
      },
      {
        "format": "csv",
        "suffix": ".csv"
      }
    ]
    "#);
}

#[test]
fn info_detects_format_by_fallback() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_fixture(temp.path(), "slide.xml", ASAP_SAMPLE);

    let output = cargo_bin_cmd!("wsi-annotations").arg("info").arg(&file).assert().success().get_output().stdout.clone();

    let value = json_stdout(&output);
    assert_eq!(value["format"], "asap-xml");
    assert_eq!(value["annotations"], 2);
    assert_eq!(value["factories"]["rect"], 1);
    assert_eq!(value["factories"]["polygon"], 1);
}

#[test]
fn convert_writes_native_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_fixture(temp.path(), "slide.xml", ASAP_SAMPLE);
    let output_path = temp.path().join("out").join("slide.json");

    cargo_bin_cmd!("wsi-annotations")
        .arg("convert")
        .arg(&file)
        .arg("--to")
        .arg("native")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    assert!(output_path.exists(), "converted file should exist");

    let output = cargo_bin_cmd!("wsi-annotations")
        .arg("info")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = json_stdout(&output);
    assert_eq!(value["format"], "native");
    assert_eq!(value["annotations"], 2);
}

#[test]
fn convert_rejects_unknown_format() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_fixture(temp.path(), "slide.xml", ASAP_SAMPLE);

    cargo_bin_cmd!("wsi-annotations")
        .arg("convert")
        .arg(&file)
        .arg("--to")
        .arg("geojson")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format 'geojson'"));
}

#[test]
fn info_fails_for_missing_file() {
    cargo_bin_cmd!("wsi-annotations")
        .arg("info")
        .arg("does-not-exist.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_unreadable_annotations() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_fixture(temp.path(), "notes.txt", "just some notes");

    cargo_bin_cmd!("wsi-annotations")
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to import annotations"));
}

#[test]
fn store_push_then_list() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_fixture(temp.path(), "slide.xml", ASAP_SAMPLE);
    let root = temp.path().join("store");

    cargo_bin_cmd!("wsi-annotations")
        .arg("store")
        .arg("--root")
        .arg(&root)
        .arg("push")
        .arg(&file)
        .arg("--tissue")
        .arg("slide-1")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());

    let output = cargo_bin_cmd!("wsi-annotations")
        .arg("store")
        .arg("--root")
        .arg(&root)
        .arg("list")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_stdout(&output), serde_json::json!(["slide-1"]));

    let output = cargo_bin_cmd!("wsi-annotations")
        .arg("store")
        .arg("--root")
        .arg(&root)
        .arg("list")
        .arg("--tissue")
        .arg("slide-1")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let records = json_stdout(&output);
    assert_eq!(records.as_array().map(Vec::len), Some(1));
    assert_eq!(records[0]["metadata"]["format"], "asap-xml");
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("wsi-annotations")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
