//! TCP acceptor for the framed stream protocol.
//!
//! Binds a listener and runs a sequential accept loop. Every accepted
//! connection gets its own tokio task running a [`StreamReceiver`] against
//! a fresh sink, so a failing session never disturbs the acceptor or its
//! sibling sessions. Accept errors are split into transient kinds (logged,
//! loop continues) and fatal kinds (loop stops and reports to the caller).

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::framing::{DiscardSink, FileSink, FrameError, FrameSink, ReceiverConfig, StreamReceiver};

/// Pause before retrying accept when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Acceptor configuration.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Receive-side settings applied to every session.
    pub receiver: ReceiverConfig,

    /// Maximum number of concurrent sessions.
    pub max_connections: usize,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            receiver: ReceiverConfig::default(),
            max_connections: 1024,
        }
    }
}

/// Creates the sink each new session streams into.
///
/// Invoked once per accepted connection; every session owns its sink
/// exclusively, so a factory is the only place state could be shared
/// across connections.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn make_sink(&self, peer: SocketAddr) -> io::Result<Box<dyn FrameSink>>;
}

/// Factory for sessions that only count bytes.
pub struct DiscardFactory;

#[async_trait]
impl SinkFactory for DiscardFactory {
    async fn make_sink(&self, _peer: SocketAddr) -> io::Result<Box<dyn FrameSink>> {
        Ok(Box::new(DiscardSink::new()))
    }
}

/// Factory writing each session to its own file under a directory.
pub struct DirectorySinkFactory {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl DirectorySinkFactory {
    /// The directory must already exist.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            next_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl SinkFactory for DirectorySinkFactory {
    async fn make_sink(&self, peer: SocketAddr) -> io::Result<Box<dyn FrameSink>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("conn-{id}.bin"));
        debug!(%peer, path = %path.display(), "session sink created");
        Ok(Box::new(FileSink::create(&path).await?))
    }
}

/// Listening acceptor, ready to serve sessions.
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: AcceptorConfig,
}

impl Acceptor {
    /// Bind the listener.
    pub async fn bind(addr: &str, config: AcceptorConfig) -> Result<Self, FrameError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| FrameError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| FrameError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        info!(%local_addr, "listening");

        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Address the listener is bound to.
    ///
    /// Differs from the requested address when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires or a fatal accept error.
    ///
    /// Each accepted connection runs as its own task; a session failing is
    /// logged and never stops the loop. On shutdown the listener is closed
    /// and in-flight sessions are aborted, dropping their connections.
    pub async fn run(
        self,
        factory: Arc<dyn SinkFactory>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), FrameError> {
        let limit = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let mut sessions: JoinSet<()> = JoinSet::new();

        let result = loop {
            // Reap finished sessions; their panics must not go unnoticed.
            while let Some(joined) = sessions.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "session task failed");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                permit = limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(error = %e, "transient accept error");
                        if is_resource_exhaustion(&e) {
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                        continue;
                    }
                    Err(e) => break Err(FrameError::Accept(e)),
                },
            };

            debug!(%peer, "connection accepted");
            let factory = Arc::clone(&factory);
            let receiver_config = self.config.receiver.clone();
            sessions.spawn(async move {
                run_session(stream, peer, receiver_config, factory).await;
                drop(permit);
            });
        };

        drop(self.listener);
        sessions.shutdown().await;

        result
    }
}

/// Drive one connection's receive session to completion.
async fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: ReceiverConfig,
    factory: Arc<dyn SinkFactory>,
) {
    let sink = match factory.make_sink(peer).await {
        Ok(sink) => sink,
        Err(e) => {
            warn!(%peer, error = %e, "failed to create sink, dropping connection");
            return;
        }
    };

    let mut receiver = StreamReceiver::new(config, sink);
    match receiver.run(&mut stream).await {
        Ok(stats) => {
            info!(%peer, frames = stats.frames, bytes = stats.bytes, "session complete");
        }
        Err(e) => match e.delivered() {
            Some(delivered) => {
                warn!(%peer, error = %e, delivered, "session terminated mid-frame");
            }
            None => {
                warn!(%peer, error = %e, "session terminated");
            }
        },
    }

    let mut sink = receiver.into_sink();
    if let Err(e) = sink.finish().await {
        warn!(%peer, error = %e, "sink finish failed");
    }
}

/// Accept errors that indicate a problem with one incoming connection or a
/// temporary resource shortage, not a broken listener.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    ) || is_resource_exhaustion(e)
}

/// Out of file descriptors (EMFILE/ENFILE). Accepting again immediately
/// would spin, so the loop backs off first.
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{SenderConfig, StreamSender};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn bind_error_is_reported() {
        let first = Acceptor::bind("127.0.0.1:0", AcceptorConfig::default())
            .await
            .unwrap();
        let addr = first.local_addr().to_string();

        let err = Acceptor::bind(&addr, AcceptorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Bind { .. }));
    }

    #[test]
    fn transient_accept_errors_are_classified() {
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(is_transient_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionAborted
        )));
        assert!(is_transient_accept_error(&io::Error::from_raw_os_error(
            libc::EMFILE
        )));
        assert!(!is_transient_accept_error(&io::Error::from(
            io::ErrorKind::InvalidInput
        )));
        assert!(!is_transient_accept_error(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }

    #[tokio::test]
    async fn serves_a_session_and_stops_on_shutdown() {
        let acceptor = Acceptor::bind("127.0.0.1:0", AcceptorConfig::default())
            .await
            .unwrap();
        let addr = acceptor.local_addr();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(acceptor.run(Arc::new(DiscardFactory), shutdown_rx));

        let mut conn = TcpStream::connect(addr).await.unwrap();
        let sender = StreamSender::new(SenderConfig::default());
        sender.send_bytes(&mut conn, b"one frame").await.unwrap();
        conn.shutdown().await.unwrap();
        drop(conn);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
