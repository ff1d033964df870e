//! End-to-end transfer tests over real TCP connections.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use byteflow::framing::{FrameError, FrameSink, ReceiverConfig, SenderConfig, StreamSender};
use byteflow::server::{Acceptor, AcceptorConfig, SinkFactory};

const WAIT: Duration = Duration::from_secs(5);

/// Sink that reports everything it consumed when its session ends.
struct CollectingSink {
    buf: Vec<u8>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl FrameSink for CollectingSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(&mut self) -> io::Result<()> {
        let _ = self.tx.send(std::mem::take(&mut self.buf));
        Ok(())
    }
}

struct CollectingFactory {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl SinkFactory for CollectingFactory {
    async fn make_sink(&self, _peer: SocketAddr) -> io::Result<Box<dyn FrameSink>> {
        Ok(Box::new(CollectingSink {
            buf: Vec::new(),
            tx: self.tx.clone(),
        }))
    }
}

struct TestServer {
    addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<Result<(), FrameError>>,
}

impl TestServer {
    async fn start(chunk_size: usize) -> Self {
        let config = AcceptorConfig {
            receiver: ReceiverConfig { chunk_size },
            max_connections: 64,
        };
        let acceptor = Acceptor::bind("127.0.0.1:0", config).await.unwrap();
        let addr = acceptor.local_addr();

        let (tx, sessions) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(acceptor.run(Arc::new(CollectingFactory { tx }), shutdown_rx));

        Self {
            addr,
            sessions,
            shutdown,
            handle,
        }
    }

    /// Bytes collected by the next session to finish, in any order.
    async fn next_session(&mut self) -> Vec<u8> {
        timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for a session to finish")
            .expect("server dropped the session channel")
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

async fn connect_and_send(addr: SocketAddr, payloads: &[Vec<u8>]) {
    let mut conn = TcpStream::connect(addr).await.unwrap();
    let sender = StreamSender::new(SenderConfig::default());
    for payload in payloads {
        sender.send_bytes(&mut conn, payload).await.unwrap();
    }
    conn.shutdown().await.unwrap();
}

#[tokio::test]
async fn single_frame_round_trip() {
    let mut server = TestServer::start(4096).await;

    connect_and_send(server.addr, &[b"hello over tcp".to_vec()]).await;

    assert_eq!(server.next_session().await, b"hello over tcp");
    server.stop().await;
}

#[tokio::test]
async fn multiple_frames_share_one_connection() {
    let mut server = TestServer::start(4096).await;

    let frames = vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()];
    connect_and_send(server.addr, &frames).await;

    assert_eq!(server.next_session().await, b"firstsecondthird");
    server.stop().await;
}

#[tokio::test]
async fn large_frame_streams_through_small_chunks() {
    // A 1 MiB frame against a 256-byte working buffer exercises the
    // bounded-chunk path hard; the sink must still see every byte in order.
    let mut server = TestServer::start(256).await;

    let payload: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    connect_and_send(server.addr, std::slice::from_ref(&payload)).await;

    assert_eq!(server.next_session().await, payload);
    server.stop().await;
}

#[tokio::test]
async fn concurrent_senders_stay_isolated() {
    let mut server = TestServer::start(1024).await;

    let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 1000 + i as usize * 17]).collect();

    let mut clients = Vec::new();
    for payload in payloads.clone() {
        let addr = server.addr;
        clients.push(tokio::spawn(async move {
            connect_and_send(addr, &[payload]).await;
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..payloads.len() {
        received.push(server.next_session().await);
    }

    // Sessions finish in no particular order; every payload must arrive
    // intact and unmixed in exactly one session.
    received.sort();
    let mut expected = payloads;
    expected.sort();
    assert_eq!(received, expected);

    server.stop().await;
}

#[tokio::test]
async fn acceptor_survives_an_aborted_client() {
    let mut server = TestServer::start(4096).await;

    // A client that declares 1000 bytes, sends 10, and walks away.
    {
        let mut conn = TcpStream::connect(server.addr).await.unwrap();
        conn.write_all(&1000u64.to_le_bytes()).await.unwrap();
        conn.write_all(&[0xEE; 10]).await.unwrap();
    }

    // The truncated session still hands its partial bytes to the sink.
    assert_eq!(server.next_session().await, vec![0xEE; 10]);

    // A well-behaved client right after must be served normally.
    connect_and_send(server.addr, &[b"still serving".to_vec()]).await;
    assert_eq!(server.next_session().await, b"still serving");

    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_the_listener() {
    let server = TestServer::start(4096).await;
    let addr = server.addr;

    server.stop().await;

    let refused = TcpStream::connect(addr).await;
    assert!(refused.is_err(), "listener should be gone after shutdown");
}
