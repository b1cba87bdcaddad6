//! # QueueKV Server
//!
//! Serve the in-memory store over TCP until Ctrl-C.
//!
//! ## Design Principles
//!
//! 1. **Single Responsibility**: Parsing, queueing and dispatch live in the
//!    library; this binary only reads flags and owns the process lifetime.
//! 2. **Fail Fast at Startup**: A bad flag or an unbindable address exits
//!    before anything is served.
//! 3. **Clean Exit**: Ctrl-C stops the acceptor and joins every worker.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use qkv_engine::MemoryEngine;
use qkv_server::config::{
    DEFAULT_BACKLOG, DEFAULT_PORT, DEFAULT_READ_BUFFER, DEFAULT_WORKERS,
};
use qkv_server::{FramingMode, Server, ServerConfig, SessionSettings};

#[derive(Parser)]
#[command(name = "qkv-server", about = "QueueKV in-memory key/value server")]
struct Args {
    /// port to listen on
    #[arg(env = "QKV_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// address to listen on
    #[arg(long, env = "QKV_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// number of workers serving connections
    #[arg(long, env = "QKV_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// listen backlog
    #[arg(long, env = "QKV_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    backlog: u32,

    /// how the end of a client message is detected
    #[arg(long, env = "QKV_FRAMING", value_enum, default_value_t = FramingMode::Token)]
    framing: FramingMode,

    /// bytes reserved for each socket read
    #[arg(long, env = "QKV_READ_BUFFER", default_value_t = DEFAULT_READ_BUFFER)]
    read_buffer: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::new(self.host, self.port),
            workers: self.workers,
            backlog: self.backlog,
            session: SessionSettings {
                framing: self.framing,
                read_buffer: self.read_buffer,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qkv=info".into()),
        )
        .init();

    let config = Args::parse().into_config();
    let addr = config.addr;

    let engine = Arc::new(MemoryEngine::new());
    let server = Server::bind(config, engine)
        .with_context(|| format!("cannot serve on {addr}"))?;
    let handle = server.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown signal received");
    handle.shutdown().await;

    Ok(())
}
