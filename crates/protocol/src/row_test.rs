//! Tests for row decoding

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::encode::{encode_null_flags, encode_row};
use crate::error::DecodeError;
use crate::row::{ExportRow, decode_row, extract_null_flags};
use crate::schema::{CodecOptions, ColumnInfo, DecodeFlags, TableSchema};
use crate::types::{ColumnType, Decimal, Value};

fn schema(partition_column: i32) -> Arc<TableSchema> {
    Arc::new(TableSchema::new(
        "EVENTS",
        32,
        partition_column,
        vec![
            ColumnInfo::new("TINY", ColumnType::TinyInt, 1),
            ColumnInfo::new("SMALL", ColumnType::SmallInt, 2),
            ColumnInfo::new("NUM", ColumnType::Integer, 4),
            ColumnInfo::new("BIG", ColumnType::BigInt, 8),
            ColumnInfo::new("RATIO", ColumnType::Float, 8),
            ColumnInfo::new("AT", ColumnType::Timestamp, 8),
            ColumnInfo::new("NAME", ColumnType::String, 64),
            ColumnInfo::new("AMOUNT", ColumnType::Decimal, 16),
            ColumnInfo::new("BLOB", ColumnType::VarBinary, 32),
            ColumnInfo::new("WHERE", ColumnType::GeographyPoint, 16),
        ],
    ))
}

fn sample_values() -> Vec<Value> {
    vec![
        Value::TinyInt(-1),
        Value::SmallInt(7),
        Value::Integer(42),
        Value::BigInt(1 << 40),
        Value::Float(2.5),
        Value::Timestamp(1_700_000_000_123_456),
        Value::from("hello"),
        Value::Decimal(Decimal::new(88, 0)),
        Value::VarBinary(Bytes::from_static(&[0xDE, 0xAD])),
        Value::GeographyPoint {
            longitude: -122.4,
            latitude: 37.7,
        },
    ]
}

fn encode(schema: &TableSchema, values: &[Value]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_row(schema, values, &CodecOptions::default(), &mut buf).unwrap();
    buf.freeze()
}

// ============================================================================
// Null flags
// ============================================================================

#[test]
fn test_null_bit_round_trip_every_position() {
    for column_count in 1..=33 {
        for i in 0..column_count {
            let mut nulls = vec![false; column_count];
            nulls[i] = true;
            let bitmap = encode_null_flags(&nulls);
            assert_eq!(bitmap.len(), column_count.div_ceil(8));

            let decoded = extract_null_flags(&bitmap, column_count).unwrap();
            assert_eq!(decoded, nulls, "columns={column_count} index={i}");
        }
    }
}

#[test]
fn test_null_bits_are_msb_first() {
    let flags = extract_null_flags(&[0b1000_0001, 0b0100_0000], 10).unwrap();
    let set: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter(|(_, null)| **null)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(set, vec![0, 7, 9]);
}

#[test]
fn test_null_flags_truncated() {
    assert_eq!(
        extract_null_flags(&[0], 9),
        Err(DecodeError::truncated("null bitmap", 2, 1))
    );
}

#[test]
fn test_null_flags_zero_columns() {
    assert!(extract_null_flags(&[], 0).unwrap().is_empty());
}

// ============================================================================
// decode_row
// ============================================================================

#[test]
fn test_decode_row_all_types() {
    let schema = schema(2);
    let values = sample_values();
    let row = decode_row(
        &schema,
        5,
        &CodecOptions::default(),
        DecodeFlags::NONE,
        encode(&schema, &values),
    )
    .unwrap();

    assert_eq!(row.values, values);
    assert_eq!(row.partition_id, 5);
    assert_eq!(row.table_name(), "EVENTS");
    assert_eq!(row.generation(), 32);
}

#[test]
fn test_decode_row_nulls() {
    let schema = schema(2);
    let mut values = sample_values();
    values[0] = Value::Null;
    values[6] = Value::Null;
    values[9] = Value::Null;

    let row = decode_row(
        &schema,
        0,
        &CodecOptions::default(),
        DecodeFlags::NONE,
        encode(&schema, &values),
    )
    .unwrap();
    assert_eq!(row.values, values);
    assert_eq!(row.values.len(), schema.column_count());
}

#[test]
fn test_decode_row_decimal_uses_configured_scale() {
    let schema = schema(-1);
    let options = CodecOptions { decimal_scale: 4 };
    let mut buf = BytesMut::new();
    encode_row(&schema, &sample_values(), &options, &mut buf).unwrap();

    let row = decode_row(&schema, 0, &options, DecodeFlags::NONE, buf.freeze()).unwrap();
    match &row.values[7] {
        Value::Decimal(d) => {
            assert_eq!(d.scale(), 4);
            assert_eq!(d.unscaled(), 880_000);
            assert_eq!(*d, Decimal::new(88, 0));
        }
        other => panic!("expected decimal, got {other:?}"),
    }
}

#[test]
fn test_partition_value_from_column() {
    let schema = schema(2);
    let row = decode_row(
        &schema,
        9,
        &CodecOptions::default(),
        DecodeFlags::NONE,
        encode(&schema, &sample_values()),
    )
    .unwrap();
    assert_eq!(row.partition_value, Value::Integer(42));
}

#[test]
fn test_partition_value_falls_back_to_partition_id() {
    for partition_column in [-1, 10, 99] {
        let schema = schema(partition_column);
        let row = decode_row(
            &schema,
            9,
            &CodecOptions::default(),
            DecodeFlags::NONE,
            encode(&schema, &sample_values()),
        )
        .unwrap();
        assert_eq!(row.partition_value, Value::Integer(9));
    }
}

#[test]
fn test_partition_value_null_column() {
    let schema = schema(2);
    let mut values = sample_values();
    values[2] = Value::Null;
    let row = decode_row(
        &schema,
        9,
        &CodecOptions::default(),
        DecodeFlags::NONE,
        encode(&schema, &values),
    )
    .unwrap();
    assert_eq!(row.partition_value, Value::Null);
}

#[test]
fn test_decode_row_truncated_value() {
    let schema = schema(2);
    let bytes = encode(&schema, &sample_values());
    let short = bytes.slice(..bytes.len() - 1);
    assert!(matches!(
        decode_row(
            &schema,
            0,
            &CodecOptions::default(),
            DecodeFlags::NONE,
            short
        ),
        Err(DecodeError::Truncated { .. })
    ));
}

#[test]
fn test_decode_row_trailing_bytes() {
    let schema = schema(2);
    let mut buf = BytesMut::from(&encode(&schema, &sample_values())[..]);
    buf.put_u16(0);
    assert_eq!(
        decode_row(
            &schema,
            0,
            &CodecOptions::default(),
            DecodeFlags::NONE,
            buf.freeze()
        ),
        Err(DecodeError::trailing("row", 2))
    );
}

#[test]
fn test_decode_row_negative_string_length() {
    let schema = Arc::new(TableSchema::new(
        "T",
        1,
        -1,
        vec![ColumnInfo::new("S", ColumnType::String, 8)],
    ));
    let mut buf = BytesMut::new();
    buf.put_u8(0);
    buf.put_i32_le(-2);
    assert_eq!(
        decode_row(
            &schema,
            0,
            &CodecOptions::default(),
            DecodeFlags::NONE,
            buf.freeze()
        ),
        Err(DecodeError::invalid_length("string value", -2))
    );
}

#[test]
fn test_decode_next_reuses_schema() {
    let schema = schema(-1);
    let options = CodecOptions::default();
    let first = ExportRow::decode(
        &schema,
        3,
        &options,
        DecodeFlags::NONE,
        encode(&schema, &sample_values()),
    )
    .unwrap();

    let mut values = sample_values();
    values[2] = Value::Integer(43);
    let second = first
        .decode_next(&options, DecodeFlags::NONE, encode(&schema, &values))
        .unwrap();

    assert!(Arc::ptr_eq(&first.schema, &second.schema));
    assert_eq!(second.partition_id, 3);
    assert_eq!(second.values[2], Value::Integer(43));
}

#[test]
fn test_values_from() {
    let schema = schema(-1);
    let row = decode_row(
        &schema,
        0,
        &CodecOptions::default(),
        DecodeFlags::NONE,
        encode(&schema, &sample_values()),
    )
    .unwrap();
    assert_eq!(row.values_from(8).len(), 2);
    assert!(row.values_from(10).is_empty());
    assert!(row.values_from(50).is_empty());
}
