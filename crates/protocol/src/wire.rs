//! Byte-level read/write helpers
//!
//! Row blocks are little-endian and use `i32` length prefixes. Protocol
//! frames are big-endian and use `u32` length prefixes, like the tap
//! protocol. Every read checks `remaining()` first so a short buffer
//! surfaces as an error instead of a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, ProtocolError};

/// Largest accepted protocol frame (64 MiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// ============================================================================
// Little-endian block helpers
// ============================================================================

/// Fail unless `n` bytes remain
#[inline]
pub(crate) fn ensure(buf: &Bytes, n: usize, what: &'static str) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        return Err(DecodeError::truncated(what, n, buf.remaining()));
    }
    Ok(())
}

/// Read an `i32` length prefix, rejecting negative values
pub(crate) fn get_len_le(buf: &mut Bytes, what: &'static str) -> Result<usize, DecodeError> {
    ensure(buf, 4, what)?;
    let len = buf.get_i32_le();
    if len < 0 {
        return Err(DecodeError::invalid_length(what, len));
    }
    Ok(len as usize)
}

/// Read an `i32`-prefixed byte run without copying
pub(crate) fn get_prefixed_le(buf: &mut Bytes, what: &'static str) -> Result<Bytes, DecodeError> {
    let len = get_len_le(buf, what)?;
    if buf.remaining() < len {
        return Err(DecodeError::invalid_length(what, len as i64));
    }
    Ok(buf.split_to(len))
}

/// Read an `i32`-prefixed UTF-8 string
pub(crate) fn get_string_le(
    buf: &mut Bytes,
    what: &'static str,
    lenient: bool,
) -> Result<String, DecodeError> {
    let bytes = get_prefixed_le(buf, what)?;
    if lenient {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(what))
}

/// Write an `i32`-prefixed byte run
pub(crate) fn put_prefixed_le(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_i32_le(bytes.len() as i32);
    buf.put_slice(bytes);
}

// ============================================================================
// Big-endian frame helpers
// ============================================================================

pub(crate) fn encode_string(s: &str, buf: &mut BytesMut) {
    encode_bytes(s.as_bytes(), buf);
}

pub(crate) fn encode_bytes(bytes: &[u8], buf: &mut BytesMut) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn decode_bytes(buf: &mut Bytes, what: &'static str) -> Result<Bytes, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated(what));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(buf.split_to(len))
}

pub(crate) fn decode_string(buf: &mut Bytes, what: &'static str) -> Result<String, ProtocolError> {
    let bytes = decode_bytes(buf, what)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(what))
}

pub(crate) fn decode_i64(buf: &mut Bytes, what: &'static str) -> Result<i64, ProtocolError> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(buf.get_i64())
}

pub(crate) fn decode_i32(buf: &mut Bytes, what: &'static str) -> Result<i32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(buf.get_i32())
}

pub(crate) fn decode_u32(buf: &mut Bytes, what: &'static str) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(buf.get_u32())
}

pub(crate) fn decode_u8(buf: &mut Bytes, what: &'static str) -> Result<u8, ProtocolError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(buf.get_u8())
}

/// Read the 4-byte big-endian frame length prefix
pub fn read_length_prefix(buf: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Validate a frame length read off the wire
pub fn check_frame_size(size: usize) -> Result<usize, ProtocolError> {
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(size)
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;
