//! End-to-end session against an in-process engine
//!
//! The mock engine authenticates the client, advertises one source and
//! then scripts the poll exchange: data, stalls, dropped sockets, corrupt
//! blocks and CLOSE.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use export_pipeline::{
    AdvertisedDataSource, BackoffPolicy, ClientOptions, Credentials, ExportClient, ExportDecoder,
    ExportRow, PipelineError, RestartBlock, read_frame, read_message, write_message,
};
use export_protocol::{
    AuthRequest, AuthResponse, BlockBuilder, Bytes, CodecOptions, ColumnInfo, ColumnType,
    EXPORT_FORMAT_VERSION, ExportProtoMessage, NO_ACK, OpenResponse, TableSchema, Value,
};

const PASSWORD: &str = "secret";

fn source() -> AdvertisedDataSource {
    let schema = TableSchema::new(
        "EVENTS",
        9,
        0,
        vec![
            ColumnInfo::new("ID", ColumnType::Integer, 4),
            ColumnInfo::new("NAME", ColumnType::String, 32),
        ],
    );
    AdvertisedDataSource::from_schema(2, "events-sig", EXPORT_FORMAT_VERSION, &schema)
}

fn data_block(ids: &[i32]) -> Bytes {
    let mut builder = BlockBuilder::new(Arc::new(source().schema()), CodecOptions::default());
    for id in ids {
        builder
            .push_row(&[Value::Integer(*id), Value::from(format!("event-{id}"))])
            .unwrap();
    }
    builder.finish()
}

fn reply() -> ExportProtoMessage {
    let source = source();
    ExportProtoMessage::new(source.generation, source.partition_id, source.signature)
}

async fn handshake(socket: &mut TcpStream, accept: bool) -> bool {
    let frame = read_frame(socket).await.unwrap().unwrap();
    let request = AuthRequest::decode(frame).unwrap();
    assert_eq!(request.service, "export");
    assert_eq!(request.username, "exporter");

    let response = if accept && request.verify(PASSWORD) {
        AuthResponse::ok()
    } else {
        AuthResponse::rejected(1, "invalid credentials")
    };
    socket.write_all(&response.encode()).await.unwrap();
    response.is_ok()
}

/// Accept a connection, authenticate it and answer OPEN
async fn accept_session(listener: &TcpListener) -> TcpStream {
    let (mut socket, _) = listener.accept().await.unwrap();
    assert!(handshake(&mut socket, true).await);

    let open = read_message(&mut socket).await.unwrap().unwrap();
    assert!(open.is_open());
    let advertised = OpenResponse {
        sources: vec![source()],
        hosts: vec!["127.0.0.1:21212".into()],
    };
    let response = ExportProtoMessage::new(0, -1, "")
        .open_response(advertised.encode())
        .unwrap();
    write_message(&mut socket, &response).await.unwrap();
    socket
}

/// Next message from the client, which must belong to the advertised stream
async fn next_message(socket: &mut TcpStream) -> Option<ExportProtoMessage> {
    let msg = read_message(socket).await.ok()??;
    assert_eq!(msg.partition_id(), 2);
    assert_eq!(msg.signature(), "events-sig");
    Some(msg)
}

/// Ack offset of the next POLL, skipping ACKs
async fn next_poll(socket: &mut TcpStream) -> i64 {
    loop {
        let msg = next_message(socket).await.expect("client closed the session");
        if msg.is_ack() {
            continue;
        }
        assert!(msg.is_poll(), "unexpected {:?}", msg.kind());
        return msg.ack_offset().unwrap();
    }
}

/// Serve one session and return the ack offsets carried by each POLL
async fn serve_session(listener: TcpListener, block: Bytes) -> Vec<i64> {
    let mut socket = accept_session(&listener).await;

    let mut polls = Vec::new();
    loop {
        let ack = next_poll(&mut socket).await;
        polls.push(ack);

        let answer = match polls.len() {
            1 => reply().poll_response(0, block.clone()).unwrap(),
            2 => reply().poll_response(ack, Bytes::new()).unwrap(),
            _ => reply().close().unwrap(),
        };
        write_message(&mut socket, &answer).await.unwrap();
        if answer.is_close() {
            break;
        }
    }
    polls
}

#[derive(Default)]
struct Collected {
    ids: Mutex<Vec<i32>>,
    retired: AtomicBool,
}

struct CollectingDecoder {
    collected: Arc<Collected>,
    pending: Vec<i32>,
}

impl ExportDecoder for CollectingDecoder {
    fn on_block_start(&mut self, _row: &ExportRow) -> Result<(), RestartBlock> {
        self.pending.clear();
        Ok(())
    }

    fn process_row(&mut self, row: &ExportRow) -> Result<bool, RestartBlock> {
        match row.values[0] {
            Value::Integer(id) => self.pending.push(id),
            ref other => panic!("unexpected value {other:?}"),
        }
        Ok(true)
    }

    fn on_block_completion(&mut self, _row: &ExportRow) -> Result<(), RestartBlock> {
        self.collected.ids.lock().append(&mut self.pending);
        Ok(())
    }

    fn source_no_longer_advertised(&mut self, _source: &AdvertisedDataSource) {
        self.collected.retired.store(true, Ordering::SeqCst);
    }
}

fn collecting_factory(
    collected: &Arc<Collected>,
) -> impl Fn(&AdvertisedDataSource) -> Box<dyn ExportDecoder> + Send + Sync + 'static {
    let collected = Arc::clone(collected);
    move |_source: &AdvertisedDataSource| -> Box<dyn ExportDecoder> {
        Box::new(CollectingDecoder {
            collected: Arc::clone(&collected),
            pending: Vec::new(),
        })
    }
}

async fn wait_retired(collected: &Collected) {
    for _ in 0..100 {
        if collected.retired.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("stream was never retired");
}

fn options(server: String) -> ClientOptions {
    ClientOptions {
        servers: vec![server],
        credentials: Credentials {
            service: "export".into(),
            username: "exporter".into(),
            password: PASSWORD.into(),
        },
        connect_timeout: Duration::from_secs(2),
        reconnect: BackoffPolicy::new(Duration::from_millis(20), Duration::from_millis(100), 2),
        ..Default::default()
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_block_stall_close_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();
    let block = data_block(&[1, 2, 3]);
    let block_len = block.len() as i64;
    let engine = tokio::spawn(serve_session(listener, block));

    let collected = Arc::new(Collected::default());
    let factory = collecting_factory(&collected);

    let client = Arc::new(ExportClient::new(options(server), Arc::new(factory)));
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.run(cancel).await }
    });

    let polls = tokio::time::timeout(Duration::from_secs(5), engine)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(polls, vec![NO_ACK, block_len, block_len]);

    wait_retired(&collected).await;
    assert_eq!(*collected.ids.lock(), vec![1, 2, 3]);

    cancel.cancel();
    run.await.unwrap().unwrap();

    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.blocks_acked, 1);
    assert_eq!(metrics.rows_acked, 3);
    assert_eq!(metrics.stalls, 1);
    assert!(metrics.connections_opened >= 1);
    assert!(client.registry().is_empty());
}

// =============================================================================
// Reconnect
// =============================================================================

/// Ack offsets seen by the engine across two sessions
#[derive(Debug)]
struct Reconnected {
    first_session: Vec<i64>,
    /// ACKs then the first POLL of the second session
    second_session: Vec<(bool, i64)>,
}

#[tokio::test]
async fn test_reconnect_resumes_from_watermark() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();
    let block = data_block(&[1, 2, 3]);
    let block_len = block.len() as i64;

    let engine = tokio::spawn(async move {
        let mut socket = accept_session(&listener).await;
        let first = next_poll(&mut socket).await;
        write_message(&mut socket, &reply().poll_response(0, block).unwrap())
            .await
            .unwrap();
        let second = next_poll(&mut socket).await;
        // Engine goes away after the block was acked
        drop(socket);

        let mut socket = accept_session(&listener).await;
        let mut seen = Vec::new();
        loop {
            let msg = next_message(&mut socket).await.unwrap();
            seen.push((msg.is_ack(), msg.ack_offset().unwrap()));
            if msg.is_poll() {
                break;
            }
        }
        write_message(&mut socket, &reply().close().unwrap())
            .await
            .unwrap();
        let _ = next_message(&mut socket).await;
        Reconnected {
            first_session: vec![first, second],
            second_session: seen,
        }
    });

    let collected = Arc::new(Collected::default());
    let client = Arc::new(ExportClient::new(
        options(server),
        Arc::new(collecting_factory(&collected)),
    ));
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.run(cancel).await }
    });

    wait_retired(&collected).await;
    cancel.cancel();
    run.await.unwrap().unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(5), engine)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(seen.first_session, vec![NO_ACK, block_len]);
    assert_eq!(seen.second_session, vec![(true, block_len), (false, block_len)]);
    assert_eq!(*collected.ids.lock(), vec![1, 2, 3]);

    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.blocks_acked, 1);
    assert_eq!(metrics.connections_opened, 2);
    assert_eq!(metrics.connections_lost, 1);
}

#[tokio::test]
async fn test_corrupt_block_reconnects_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();
    let block = data_block(&[7, 8]);
    let block_len = block.len() as i64;

    let engine = tokio::spawn(async move {
        let mut socket = accept_session(&listener).await;
        assert_eq!(next_poll(&mut socket).await, NO_ACK);
        let corrupt = Bytes::from_static(&[0xff, 0xff, 0xff, 0x7f, 0x01, 0x02, 0x03]);
        write_message(&mut socket, &reply().poll_response(0, corrupt).unwrap())
            .await
            .unwrap();
        // The client gives up on this session instead of polling again
        let after_corrupt = next_message(&mut socket).await.map(|m| m.kind());

        let mut socket = accept_session(&listener).await;
        let resumed = next_poll(&mut socket).await;
        write_message(&mut socket, &reply().poll_response(0, block).unwrap())
            .await
            .unwrap();
        let acked = next_poll(&mut socket).await;
        write_message(&mut socket, &reply().close().unwrap())
            .await
            .unwrap();
        let _ = next_message(&mut socket).await;
        (after_corrupt, resumed, acked)
    });

    let collected = Arc::new(Collected::default());
    let client = Arc::new(ExportClient::new(
        options(server),
        Arc::new(collecting_factory(&collected)),
    ));
    let cancel = CancellationToken::new();
    let run = tokio::spawn({
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        async move { client.run(cancel).await }
    });

    wait_retired(&collected).await;
    cancel.cancel();
    run.await.unwrap().unwrap();
    let (after_corrupt, resumed, acked) = tokio::time::timeout(Duration::from_secs(5), engine)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after_corrupt, None);
    assert_eq!(resumed, NO_ACK);
    assert_eq!(acked, block_len);
    assert_eq!(*collected.ids.lock(), vec![7, 8]);

    let metrics = client.metrics().snapshot();
    assert_eq!(metrics.decode_errors, 1);
    assert_eq!(metrics.connections_opened, 2);
    assert_eq!(metrics.connections_lost, 1);
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_rejected_credentials_stop_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = listener.local_addr().unwrap().to_string();
    let engine = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        handshake(&mut socket, false).await
    });

    let factory = |_source: &AdvertisedDataSource| -> Box<dyn ExportDecoder> {
        unreachable!("no source is advertised")
    };
    let client = ExportClient::new(options(server), Arc::new(factory));

    let result = tokio::time::timeout(Duration::from_secs(5), client.run(CancellationToken::new()))
        .await
        .unwrap();

    assert!(!engine.await.unwrap());
    assert!(matches!(
        result,
        Err(PipelineError::AuthenticationFailed { status: 1, .. })
    ));
}
