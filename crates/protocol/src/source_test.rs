//! Tests for advertised data sources

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::schema::{ColumnInfo, EXPORT_FORMAT_VERSION, TableSchema};
use crate::source::{AdvertisedDataSource, OpenResponse, StreamKey};
use crate::types::ColumnType;

fn source(partition_id: i32) -> AdvertisedDataSource {
    let schema = TableSchema::new(
        "ORDERS",
        5,
        0,
        vec![
            ColumnInfo::new("ID", ColumnType::BigInt, 8),
            ColumnInfo::new("NOTE", ColumnType::String, 128),
        ],
    );
    AdvertisedDataSource::from_schema(partition_id, "sig-orders", EXPORT_FORMAT_VERSION, &schema)
}

#[test]
fn test_stream_key() {
    let key = source(3).stream_key();
    assert_eq!(key, StreamKey::new(3, "sig-orders"));
    assert_eq!(key.to_string(), "sig-orders:3");
}

#[test]
fn test_column_lists() {
    let s = source(0);
    assert_eq!(s.column_names().collect::<Vec<_>>(), vec!["ID", "NOTE"]);
    assert_eq!(
        s.column_types().collect::<Vec<_>>(),
        vec![ColumnType::BigInt, ColumnType::String]
    );
    assert_eq!(s.column_lengths().collect::<Vec<_>>(), vec![8, 128]);
}

#[test]
fn test_schema_matches_advertisement() {
    let schema = source(0).schema();
    assert_eq!(schema.table_name, "ORDERS");
    assert_eq!(schema.generation, 5);
    assert_eq!(schema.partition_column_index(), Some(0));
}

#[test]
fn test_open_response_round_trip() {
    let response = OpenResponse {
        sources: vec![source(0), source(1), source(2)],
        hosts: vec!["10.0.0.1:21212".into(), "10.0.0.2:21212".into()],
    };
    let decoded = OpenResponse::decode(response.encode()).unwrap();
    assert_eq!(decoded, response);
}

#[test]
fn test_open_response_empty() {
    let decoded = OpenResponse::decode(OpenResponse::default().encode()).unwrap();
    assert!(decoded.sources.is_empty());
    assert!(decoded.hosts.is_empty());
}

#[test]
fn test_open_response_truncated() {
    let encoded = OpenResponse {
        sources: vec![source(0)],
        hosts: vec![],
    }
    .encode();
    let short = encoded.slice(..encoded.len() - 6);
    assert!(OpenResponse::decode(short).is_err());
}

#[test]
fn test_open_response_unknown_column_type() {
    let mut buf = BytesMut::new();
    buf.put_u32(1);
    buf.put_i32(0);
    buf.put_u32(1);
    buf.put_slice(b"s");
    buf.put_u32(1);
    buf.put_slice(b"t");
    buf.put_i64(1);
    buf.put_i32(-1);
    buf.put_u8(EXPORT_FORMAT_VERSION);
    buf.put_u32(1);
    buf.put_u32(1);
    buf.put_slice(b"c");
    buf.put_u8(200);
    buf.put_i32(0);
    buf.put_u32(0);
    assert!(matches!(
        OpenResponse::decode(buf.freeze()),
        Err(ProtocolError::Decode(_))
    ));
}
