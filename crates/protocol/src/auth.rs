//! Authentication handshake frames
//!
//! The first frame on a new connection is an [`AuthRequest`]; the engine
//! answers with an [`AuthResponse`] before any protocol message flows.
//! Both use the same `[u32 len][body]` framing as protocol messages.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::error::{DecodeError, ProtocolError};
use crate::wire::{decode_bytes, decode_string, decode_u8, encode_bytes, encode_string};

/// Status byte of a successful handshake
pub const AUTH_OK: u8 = 0;

/// Client credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub service: String,
    pub username: String,
    /// SHA-256 of the password, never the password itself
    pub credential: Bytes,
}

impl AuthRequest {
    /// Build a request, hashing `password`
    pub fn new(service: impl Into<String>, username: impl Into<String>, password: &str) -> Self {
        Self {
            service: service.into(),
            username: username.into(),
            credential: hash_password(password),
        }
    }

    /// Encode with length prefix
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32(0);
        encode_string(&self.service, &mut buf);
        encode_string(&self.username, &mut buf);
        encode_bytes(&self.credential, &mut buf);
        let len = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());
        buf.freeze()
    }

    /// Decode a frame body
    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let service = decode_string(&mut buf, "service")?;
        let username = decode_string(&mut buf, "username")?;
        let credential = decode_bytes(&mut buf, "credential")?;
        if buf.has_remaining() {
            return Err(DecodeError::trailing("auth request", buf.remaining()).into());
        }
        Ok(Self {
            service,
            username,
            credential,
        })
    }

    /// Check the credential against a known password
    pub fn verify(&self, password: &str) -> bool {
        self.credential == hash_password(password)
    }
}

/// Engine reply to an [`AuthRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub status: u8,
    pub message: String,
}

impl AuthResponse {
    pub fn ok() -> Self {
        Self {
            status: AUTH_OK,
            message: String::new(),
        }
    }

    pub fn rejected(status: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == AUTH_OK
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16 + self.message.len());
        buf.put_u32(0);
        buf.put_u8(self.status);
        encode_string(&self.message, &mut buf);
        let len = (buf.len() - 4) as u32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let status = decode_u8(&mut buf, "auth status")?;
        let message = decode_string(&mut buf, "auth message")?;
        Ok(Self { status, message })
    }
}

fn hash_password(password: &str) -> Bytes {
    Bytes::copy_from_slice(&Sha256::digest(password.as_bytes()))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;
