//! Tests for protocol error types

use crate::error::{DecodeError, EncodeError, ProtocolError};
use crate::message::MessageKind;
use crate::types::ColumnType;

#[test]
fn test_truncated_display() {
    let err = DecodeError::truncated("row value", 8, 3);
    assert_eq!(
        err.to_string(),
        "truncated row value: expected 8 bytes, got 3"
    );
}

#[test]
fn test_invalid_length_display() {
    let err = DecodeError::invalid_length("string", -5);
    assert_eq!(err.to_string(), "invalid string length: -5");
}

#[test]
fn test_unknown_column_type_display() {
    let err = DecodeError::UnknownColumnType(99);
    assert_eq!(err.to_string(), "unknown column type: 99");
}

#[test]
fn test_trailing_bytes_display() {
    let err = DecodeError::trailing("row", 4);
    assert_eq!(err.to_string(), "4 trailing bytes after row");
}

#[test]
fn test_unsupported_flags_display() {
    let err = DecodeError::UnsupportedFlags(0x80);
    assert_eq!(err.to_string(), "unsupported decode flags: 0x80");
}

#[test]
fn test_encode_type_mismatch_display() {
    let err = EncodeError::TypeMismatch {
        column: "amount".into(),
        expected: ColumnType::BigInt,
    };
    assert_eq!(
        err.to_string(),
        "value for column 'amount' does not match type BIGINT"
    );
}

#[test]
fn test_protocol_error_from_decode() {
    let err: ProtocolError = DecodeError::MissingSchema.into();
    assert!(matches!(err, ProtocolError::Decode(DecodeError::MissingSchema)));
    assert!(err.to_string().contains("no schema"));
}

#[test]
fn test_payload_already_set_is_violation() {
    let err = ProtocolError::PayloadAlreadySet {
        existing: MessageKind::Poll,
        attempted: MessageKind::Ack,
    };
    assert!(err.is_violation());
    assert_eq!(
        err.to_string(),
        "message payload already set to POLL, cannot set ACK"
    );
}

#[test]
fn test_missing_payload_is_violation() {
    assert!(ProtocolError::MissingPayload.is_violation());
}

#[test]
fn test_wire_errors_are_not_violations() {
    assert!(!ProtocolError::Truncated("header").is_violation());
    assert!(!ProtocolError::UnknownMessageKind(42).is_violation());
    assert!(
        !ProtocolError::FrameTooLarge {
            size: 100,
            max: 10
        }
        .is_violation()
    );
}
