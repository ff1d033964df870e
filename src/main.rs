//! byteflow CLI: `serve` runs the receiving server, `send` dials a server
//! and streams one or more frames to it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use byteflow::config::{Config, OutputMode, ServeArgs};
use byteflow::framing::{ReceiverConfig, SenderConfig, StreamSender, DEFAULT_CHUNK_SIZE};
use byteflow::server::{Acceptor, AcceptorConfig, DirectorySinkFactory, DiscardFactory, SinkFactory};

/// Fill byte for generated payloads.
const PATTERN_BYTE: u8 = 0xB5;

#[derive(Parser)]
#[command(name = "byteflow", version)]
#[command(about = "Length-prefixed framed byte streaming over TCP", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the receiving server
    Serve(ServeArgs),
    /// Send frames to a running server
    Send(SendArgs),
}

#[derive(Args)]
struct SendArgs {
    /// Server address (host:port)
    addr: String,

    /// Send the contents of this file
    #[arg(short, long, conflicts_with = "size")]
    file: Option<PathBuf>,

    /// Send this many generated pattern bytes instead of a file
    #[arg(short, long)]
    size: Option<u64>,

    /// Number of frames to send over the one connection
    #[arg(short, long, default_value_t = 1)]
    repeat: u32,

    /// Working buffer size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Send(args) => send(args).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = Config::load(&args)?;

    let factory: Arc<dyn SinkFactory> = match &config.output {
        OutputMode::Discard => Arc::new(DiscardFactory),
        OutputMode::Directory(dir) => {
            tokio::fs::create_dir_all(dir).await.with_context(|| {
                format!("failed to create output directory {}", dir.display())
            })?;
            Arc::new(DirectorySinkFactory::new(dir.clone()))
        }
    };

    let acceptor = Acceptor::bind(
        &config.listen,
        AcceptorConfig {
            receiver: ReceiverConfig {
                chunk_size: config.chunk_size,
            },
            max_connections: config.max_connections,
        },
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for shutdown signal");
                // Keep the shutdown sender alive so the acceptor runs on.
                std::future::pending::<()>().await;
            }
        }
    });

    acceptor.run(factory, shutdown_rx).await?;
    info!("server stopped");
    Ok(())
}

async fn send(args: SendArgs) -> Result<()> {
    let mut conn = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    let sender = StreamSender::new(SenderConfig {
        chunk_size: args.chunk_size,
    });

    for _ in 0..args.repeat {
        let sent = match (&args.file, args.size) {
            (Some(path), _) => {
                let mut file = File::open(path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let length = file.metadata().await?.len();
                sender.send(&mut conn, length, &mut file).await?
            }
            (None, Some(size)) => {
                let mut source = tokio::io::repeat(PATTERN_BYTE).take(size);
                sender.send(&mut conn, size, &mut source).await?
            }
            (None, None) => {
                // Stdin has no length up front; spool it to learn one.
                let mut payload = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut payload)
                    .await
                    .context("failed to read stdin")?;
                sender.send_bytes(&mut conn, &payload).await?
            }
        };
        info!(bytes = sent, "frame sent");
    }

    conn.shutdown().await.context("failed to close connection")?;
    Ok(())
}
