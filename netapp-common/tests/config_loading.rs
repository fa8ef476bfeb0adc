use netapp_common::config::{Credentials, FileSource, FilerSource};
use netapp_common::config::load_filers_from_file;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_filers_from_file() {
    let file = write_config(
        r#"
- name: filer-a
  host: filer-a.example.com
  availability_zone: qa-de-1a
  username: monitor
  password: secret
  version: "1.15"
- name: filer-b
  host: filer-b.example.com
  availability_zone: qa-de-1b
  aggregate_pattern: "^aggr_(ssd|hdd)_"
"#,
    );

    let fallback = Credentials {
        username: "fallback".to_string(),
        password: "fallback-pass".to_string(),
    };
    let filers = load_filers_from_file(file.path(), &fallback).unwrap();
    assert_eq!(filers.len(), 2);

    let a = &filers[0];
    assert_eq!(a.availability_zone, "qa-de-1a");
    assert_eq!(a.username, "monitor");
    assert_eq!(a.api_version, "1.15");

    let b = &filers[1];
    assert_eq!(b.username, "fallback");
    assert_eq!(b.api_version, "1.7");
    assert!(b.aggregate_matches("aggr_ssd_01"));
    assert!(!b.aggregate_matches("root_aggr"));
}

#[test]
fn test_file_source_rereads_on_every_load() {
    let file = write_config("- name: filer-a\n  host: filer-a.example.com\n");
    let source = FileSource::new(file.path());
    assert_eq!(source.load().unwrap().len(), 1);

    std::fs::write(
        file.path(),
        "- name: filer-a\n  host: filer-a.example.com\n- name: filer-b\n  host: filer-b.example.com\n",
    )
    .unwrap();
    assert_eq!(source.load().unwrap().len(), 2);
}

#[test]
fn test_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileSource::new(dir.path().join("netapp_filers.yaml"));
    assert!(source.load().is_err());
    assert!(source.describe().contains("netapp_filers.yaml"));
}
