//! Tests for the file sink

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use export_config::{CodecConfig, OutputFormat, SinkConfig};
use export_pipeline::run_block;
use export_protocol::{
    AdvertisedDataSource, ColumnInfo, ColumnType, EXPORT_FORMAT_VERSION, ExportRow,
    NO_PARTITION_COLUMN, TableSchema, Value,
};
use tempfile::TempDir;

use super::*;

fn schema() -> Arc<TableSchema> {
    Arc::new(TableSchema::new(
        "ORDERS",
        7,
        NO_PARTITION_COLUMN,
        vec![
            ColumnInfo::new("ID", ColumnType::BigInt, 8),
            ColumnInfo::new("NAME", ColumnType::String, 32),
        ],
    ))
}

fn source() -> AdvertisedDataSource {
    AdvertisedDataSource::from_schema(1, "orders-sig", EXPORT_FORMAT_VERSION, &schema())
}

fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<ExportRow> {
    let schema = schema();
    ids.into_iter()
        .map(|id| ExportRow {
            schema: Arc::clone(&schema),
            values: vec![Value::BigInt(id), Value::from(format!("order-{id}"))],
            partition_id: 1,
            partition_value: Value::Integer(1),
        })
        .collect()
}

fn sink_config(dir: &Path) -> SinkConfig {
    SinkConfig {
        path: dir.to_string_lossy().into_owned(),
        nonce: "exp".into(),
        ..SinkConfig::default()
    }
}

fn open(dir: &Path) -> FileSink {
    FileSink::open(&sink_config(dir), &CodecConfig::default()).unwrap()
}

fn data_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".csv") || n.ends_with(".tsv"))
        .collect();
    names.sort();
    names
}

fn read_only_file(dir: &Path) -> String {
    let files = data_files(dir);
    assert_eq!(files.len(), 1, "expected one data file, got {files:?}");
    fs::read_to_string(dir.join(&files[0])).unwrap()
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_open_rejects_bad_nonce() {
    let temp = TempDir::new().unwrap();
    for nonce in ["", "a-b", "a/b"] {
        let config = SinkConfig {
            nonce: nonce.into(),
            ..sink_config(temp.path())
        };
        assert!(matches!(
            FileSink::open(&config, &CodecConfig::default()),
            Err(SinkError::Config(_))
        ));
    }
}

#[test]
fn test_open_creates_directory() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("nested").join("out");

    let _sink = open(&dir);

    assert!(dir.is_dir());
}

// ============================================================================
// Block Tests
// ============================================================================

#[test]
fn test_block_written_at_completion() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());

    run_block(decoder.as_mut(), &rows([1, 2])).unwrap();

    assert_eq!(read_only_file(temp.path()), "1,order-1\n2,order-2\n");
    let snapshot = sink.metrics().snapshot();
    assert_eq!(snapshot.blocks_completed, 1);
    assert_eq!(snapshot.rows_written, 2);
    assert_eq!(snapshot.bytes_written, 20);
}

#[test]
fn test_nothing_written_before_completion() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());
    let rows = rows([1]);

    decoder.on_block_start(&rows[0]).unwrap();
    decoder.process_row(&rows[0]).unwrap();

    assert!(data_files(temp.path()).is_empty());

    decoder.on_block_completion(&rows[0]).unwrap();
    assert_eq!(read_only_file(temp.path()), "1,order-1\n");
}

#[test]
fn test_replayed_block_written_once() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());
    let rows = rows([1, 2]);

    // First attempt abandoned after one row, second attempt completes
    decoder.on_block_start(&rows[0]).unwrap();
    decoder.process_row(&rows[0]).unwrap();
    run_block(decoder.as_mut(), &rows).unwrap();

    assert_eq!(read_only_file(temp.path()), "1,order-1\n2,order-2\n");
}

#[test]
fn test_consecutive_blocks_append() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());

    run_block(decoder.as_mut(), &rows([1])).unwrap();
    run_block(decoder.as_mut(), &rows([2])).unwrap();

    assert_eq!(read_only_file(temp.path()), "1,order-1\n2,order-2\n");
    assert_eq!(sink.metrics().snapshot().blocks_completed, 2);
}

#[test]
fn test_partitions_share_table_file() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut first = sink.construct_export_decoder(&source());
    let mut other = source();
    other.partition_id = 2;
    let mut second = sink.construct_export_decoder(&other);

    run_block(first.as_mut(), &rows([1])).unwrap();
    run_block(second.as_mut(), &rows([2])).unwrap();

    assert_eq!(read_only_file(temp.path()), "1,order-1\n2,order-2\n");
}

#[test]
fn test_schema_sidecar_written() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());

    run_block(decoder.as_mut(), &rows([1])).unwrap();

    let text = fs::read_to_string(temp.path().join("ORDERS-7-schema.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["table name"], "ORDERS");
    assert_eq!(parsed["generation id"], 7);
    assert_eq!(parsed["columns"][1]["type"], "VARCHAR");
}

#[test]
fn test_tsv_format() {
    let temp = TempDir::new().unwrap();
    let config = SinkConfig {
        format: OutputFormat::Tsv,
        ..sink_config(temp.path())
    };
    let sink = FileSink::open(&config, &CodecConfig::default()).unwrap();
    let mut decoder = sink.construct_export_decoder(&source());

    run_block(decoder.as_mut(), &rows([1])).unwrap();

    let files = data_files(temp.path());
    assert!(files[0].ends_with(".tsv"));
    assert_eq!(read_only_file(temp.path()), "1\torder-1\n");
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_write_failure_requests_backoff_restart() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());
    sink.close();

    let restart = run_block(decoder.as_mut(), &rows([1])).unwrap_err();

    assert!(restart.request_backoff);
    let snapshot = sink.metrics().snapshot();
    assert_eq!(snapshot.block_restarts, 1);
    assert_eq!(snapshot.write_errors, 1);
    assert_eq!(snapshot.blocks_completed, 0);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_retire_closes_output() {
    let temp = TempDir::new().unwrap();
    let sink = open(temp.path());
    let mut decoder = sink.construct_export_decoder(&source());

    run_block(decoder.as_mut(), &rows([1])).unwrap();
    decoder.source_no_longer_advertised(&source());

    let files = data_files(temp.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("exp-0000000000000000007-ORDERS-"));
    assert_eq!(sink.output().active_units(), 0);
}

#[test]
fn test_roll_if_due() {
    let temp = TempDir::new().unwrap();
    let config = SinkConfig {
        period: Duration::ZERO,
        ..sink_config(temp.path())
    };
    let sink = FileSink::open(&config, &CodecConfig::default()).unwrap();
    let mut decoder = sink.construct_export_decoder(&source());

    run_block(decoder.as_mut(), &rows([1])).unwrap();

    assert_eq!(sink.roll_if_due(), 1);
    assert!(!data_files(temp.path())[0].starts_with("active-"));
}
