//! Tests for delimited row rendering

use std::sync::Arc;

use bytes::Bytes;
use export_protocol::{ColumnInfo, ColumnType, Decimal, NO_PARTITION_COLUMN, TableSchema};

use super::*;

fn row(values: Vec<Value>) -> ExportRow {
    let columns = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            ColumnInfo::new(
                format!("C{i}"),
                v.column_type().unwrap_or(ColumnType::String),
                0,
            )
        })
        .collect();
    ExportRow {
        schema: Arc::new(TableSchema::new("T", 1, NO_PARTITION_COLUMN, columns)),
        values,
        partition_id: 0,
        partition_value: Value::Integer(0),
    }
}

fn csv() -> RowFormatter {
    RowFormatter::new(OutputFormat::Csv, false)
}

fn tsv() -> RowFormatter {
    RowFormatter::new(OutputFormat::Tsv, false)
}

fn render(value: Value) -> String {
    let mut out = String::new();
    render_value(&value, &mut out);
    out
}

// ============================================================================
// Value Rendering Tests
// ============================================================================

#[test]
fn test_render_integers() {
    assert_eq!(render(Value::TinyInt(-8)), "-8");
    assert_eq!(render(Value::SmallInt(300)), "300");
    assert_eq!(render(Value::Integer(70_000)), "70000");
    assert_eq!(render(Value::BigInt(i64::MAX)), "9223372036854775807");
}

#[test]
fn test_render_float() {
    assert_eq!(render(Value::Float(1.5)), "1.5");
}

#[test]
fn test_render_timestamp_utc_micros() {
    // 2024-03-09 12:00:00.000123 UTC
    let micros = 1_709_985_600_000_123;
    assert_eq!(render(Value::Timestamp(micros)), "2024-03-09 12:00:00.000123");
}

#[test]
fn test_render_timestamp_epoch() {
    assert_eq!(render(Value::Timestamp(0)), "1970-01-01 00:00:00.000000");
}

#[test]
fn test_render_decimal_at_scale() {
    assert_eq!(render(Value::Decimal(Decimal::new(-12_345, 2))), "-123.45");
}

#[test]
fn test_render_varbinary_hex() {
    assert_eq!(
        render(Value::VarBinary(Bytes::from_static(&[0xde, 0xad, 0x01]))),
        "dead01"
    );
}

#[test]
fn test_render_point() {
    let point = Value::GeographyPoint {
        longitude: -71.5,
        latitude: 42.25,
    };
    assert_eq!(render(point), "POINT (-71.5 42.25)");
}

// ============================================================================
// CSV Tests
// ============================================================================

#[test]
fn test_csv_plain_row() {
    let line = csv().format_row(&row(vec![Value::BigInt(1), Value::from("abc".to_string())]));
    assert_eq!(line, "1,abc\n");
}

#[test]
fn test_csv_null_unquoted() {
    let line = csv().format_row(&row(vec![Value::Null, Value::BigInt(2)]));
    assert_eq!(line, "NULL,2\n");
}

#[test]
fn test_csv_quotes_special_characters() {
    let line = csv().format_row(&row(vec![
        Value::from("a,b".to_string()),
        Value::from("say \"hi\"".to_string()),
        Value::from("two\nlines".to_string()),
    ]));
    assert_eq!(line, "\"a,b\",\"say \"\"hi\"\"\",\"two\nlines\"\n");
}

#[test]
fn test_csv_empty_row() {
    assert_eq!(csv().format_row(&row(vec![])), "\n");
}

// ============================================================================
// TSV Tests
// ============================================================================

#[test]
fn test_tsv_plain_row() {
    let line = tsv().format_row(&row(vec![Value::BigInt(1), Value::from("a,b".to_string())]));
    assert_eq!(line, "1\ta,b\n");
}

#[test]
fn test_tsv_escapes() {
    let line = tsv().format_row(&row(vec![Value::from("a\tb\\c\nd".to_string())]));
    assert_eq!(line, "a\\tb\\\\c\\nd\n");
}

// ============================================================================
// Internal Column Tests
// ============================================================================

#[test]
fn test_skip_internals() {
    let mut values: Vec<Value> = (0..INTERNAL_COLUMN_COUNT as i64).map(Value::BigInt).collect();
    values.push(Value::from("user".to_string()));

    let formatter = RowFormatter::new(OutputFormat::Csv, true);
    assert_eq!(formatter.first_column(), INTERNAL_COLUMN_COUNT);
    assert_eq!(formatter.format_row(&row(values.clone())), "user\n");

    assert_eq!(csv().format_row(&row(values)), "0,1,2,3,4,5,user\n");
}

#[test]
fn test_skip_internals_short_row() {
    let formatter = RowFormatter::new(OutputFormat::Csv, true);
    assert_eq!(formatter.format_row(&row(vec![Value::BigInt(1)])), "\n");
}

#[test]
fn test_write_row_appends() {
    let mut out = String::from("0,x\n");
    csv().write_row(&row(vec![Value::BigInt(1), Value::from("y".to_string())]), &mut out);
    assert_eq!(out, "0,x\n1,y\n");
}
