//! # Acceptor
//!
//! Owns the listening socket. Every accepted connection is pushed onto the
//! shared queue; accept failures are logged and retried with a capped
//! backoff, never propagated.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use qkv_common::{QkvError, QkvResult};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::pool::{QueuedConnection, SharedQueue};
use crate::shutdown::Shutdown;

const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(1);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Creates, binds and listens on a TCP socket with `SO_REUSEADDR`.
///
/// Must be called from within a tokio runtime.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> QkvResult<TcpListener> {
    let bind_err = |source| QkvError::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
    socket.listen(backlog).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

/// Source of inbound connections.
pub trait Incoming: Send + 'static {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Incoming for TcpListener {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Accept loop feeding the connection queue.
pub struct Acceptor<L = TcpListener> {
    listener: L,
    queue: SharedQueue,
    metrics: Arc<Metrics>,
    shutdown: Shutdown,
}

impl<L: Incoming> Acceptor<L> {
    pub fn new(
        listener: L,
        queue: SharedQueue,
        metrics: Arc<Metrics>,
        shutdown: Shutdown,
    ) -> Self {
        Acceptor {
            listener,
            queue,
            metrics,
            shutdown,
        }
    }

    /// Accepts until shutdown. The listener is closed when this returns.
    pub async fn run(mut self) {
        let mut backoff = ACCEPT_BACKOFF_START;
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    backoff = ACCEPT_BACKOFF_START;
                    debug!(%peer, queued = self.queue.len(), "connection accepted");
                    self.metrics.record_accept();
                    self.queue.push(QueuedConnection::new(stream, peer));
                }
                Err(source) => {
                    let err = QkvError::Accept(source);
                    warn!(%err, retry_in = ?backoff, "accept failed");
                    self.metrics.record_accept_error();
                    tokio::select! {
                        biased;
                        _ = self.shutdown.recv() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                }
            }
        }
        info!("acceptor stopped");
    }
}
