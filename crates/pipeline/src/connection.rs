//! Engine connection
//!
//! Frames on the socket are `[u32 BE length][body]`. The handshake is a
//! single AuthRequest/AuthResponse exchange followed by OPEN, after which
//! the connection carries export protocol messages in both directions.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use export_protocol::{
    AuthRequest, AuthResponse, ExportProtoMessage, MessageKind, OpenResponse, ProtocolError,
    check_frame_size, read_length_prefix,
};

use crate::error::{PipelineError, Result};

/// Credentials presented during the handshake
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub service: String,
    pub username: String,
    pub password: String,
}

/// Read one length-prefixed frame
///
/// Returns `Ok(None)` if the peer closed the stream at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Bytes>> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = read_length_prefix(&prefix).ok_or(ProtocolError::Truncated("frame length"))?;
    let len = check_frame_size(len as usize)?;

    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await?;
    Ok(Some(body.freeze()))
}

/// Read and decode one export protocol message
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<ExportProtoMessage>> {
    match read_frame(reader).await? {
        Some(frame) => Ok(Some(ExportProtoMessage::decode(frame)?)),
        None => Ok(None),
    }
}

/// Encode and write one export protocol message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &ExportProtoMessage,
) -> Result<()> {
    let frame = message.encode()?;
    writer.write_all(&frame).await?;
    Ok(())
}

/// An authenticated connection to one engine server
#[derive(Debug)]
pub struct EngineConnection {
    name: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl EngineConnection {
    /// Connect and authenticate within `timeout`
    pub async fn connect(server: &str, credentials: &Credentials, timeout: Duration) -> Result<Self> {
        tokio::time::timeout(timeout, Self::handshake(server, credentials))
            .await
            .map_err(|_| PipelineError::ConnectTimeout {
                server: server.to_string(),
            })?
    }

    async fn handshake(server: &str, credentials: &Credentials) -> Result<Self> {
        let stream = TcpStream::connect(server).await?;
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = AuthRequest::new(
            credentials.service.as_str(),
            credentials.username.as_str(),
            &credentials.password,
        );
        writer.write_all(&request.encode()).await?;

        let frame = read_frame(&mut reader)
            .await?
            .ok_or_else(|| PipelineError::connection_lost(server, "closed during handshake"))?;
        let response = AuthResponse::decode(frame)?;
        if !response.is_ok() {
            return Err(PipelineError::AuthenticationFailed {
                server: server.to_string(),
                status: response.status,
                message: response.message,
            });
        }

        debug!(connection = %server, service = %credentials.service, "authenticated");

        Ok(Self {
            name: server.to_string(),
            reader,
            writer,
        })
    }

    /// Connection name (the server address)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send OPEN and wait for the advertised sources
    pub async fn open(&mut self) -> Result<OpenResponse> {
        let open = ExportProtoMessage::new(0, -1, "").open()?;
        write_message(&mut self.writer, &open).await?;

        let reply = read_message(&mut self.reader)
            .await?
            .ok_or_else(|| PipelineError::connection_lost(&self.name, "closed before OPEN_RESPONSE"))?;

        match reply.open_response_payload() {
            Some(payload) => Ok(OpenResponse::decode(payload.clone())?),
            None => Err(PipelineError::UnexpectedMessage {
                stream: export_protocol::StreamKey::new(reply.partition_id(), reply.signature()),
                connection: self.name.clone(),
                kind: reply.kind().unwrap_or(MessageKind::Error),
            }),
        }
    }

    /// Split into name, reader and writer
    pub fn into_parts(self) -> (String, BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.name, self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Framing
    // =========================================================================

    #[tokio::test]
    async fn test_message_round_trip_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let sent = ExportProtoMessage::new(7, 3, "sig").poll(42).unwrap();
        write_message(&mut client, &sent).await.unwrap();

        let received = read_message(&mut server).await.unwrap().unwrap();
        assert!(received.is_poll());
        assert_eq!(received.ack_offset(), Some(42));
        assert_eq!(received.partition_id(), 3);
        assert_eq!(received.signature(), "sig");
    }

    #[tokio::test]
    async fn test_eof_at_frame_boundary() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        assert!(read_message(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Protocol(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server).await,
            Err(PipelineError::Io(_))
        ));
    }
}
