//! # Server Assembly
//!
//! Wires the listener, the connection queue, the worker pool and the shutdown
//! signal together. The store and the queue are created once here and handed
//! to every component as `Arc` handles.

use std::net::SocketAddr;
use std::sync::Arc;

use qkv_common::{QkvError, QkvResult};
use qkv_engine::KvEngine;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::acceptor::{bind_listener, Acceptor};
use crate::config::ServerConfig;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pool::{SharedQueue, WorkerContext, WorkerPool};
use crate::queue::ConnectionQueue;
use crate::shutdown::{self, ShutdownTrigger};

/// A bound but not yet serving server.
pub struct Server<E: ?Sized> {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    engine: Arc<E>,
}

impl<E> Server<E>
where
    E: KvEngine + ?Sized + 'static,
{
    /// Validates `config` and binds the listening socket.
    ///
    /// This is the only fallible step; errors here are fatal.
    pub fn bind(config: ServerConfig, engine: Arc<E>) -> QkvResult<Self> {
        config.validate()?;
        let listener = bind_listener(config.addr, config.backlog)?;
        let local_addr = listener.local_addr().map_err(|source| QkvError::Bind {
            addr: config.addr,
            source,
        })?;
        Ok(Server {
            config,
            listener,
            local_addr,
            engine,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the acceptor and the worker pool.
    pub fn start(self) -> ServerHandle {
        let Server {
            config,
            listener,
            local_addr,
            engine,
        } = self;

        let queue: SharedQueue = Arc::new(ConnectionQueue::new());
        let metrics = Arc::new(Metrics::new());
        let (trigger, shutdown) = shutdown::channel();

        let context = WorkerContext {
            queue: Arc::clone(&queue),
            engine,
            metrics: Arc::clone(&metrics),
            settings: config.session,
        };
        let pool = WorkerPool::spawn(config.workers, context, &shutdown);
        let acceptor = tokio::spawn(
            Acceptor::new(
                listener,
                Arc::clone(&queue),
                Arc::clone(&metrics),
                trigger.subscribe(),
            )
            .run(),
        );

        info!(
            addr = %local_addr,
            workers = config.workers,
            framing = ?config.session.framing,
            "server listening"
        );

        ServerHandle {
            local_addr,
            trigger,
            acceptor,
            pool,
            queue,
            metrics,
        }
    }
}

/// Running server. Dropping it without calling `shutdown` stops the tasks
/// without waiting for them.
pub struct ServerHandle {
    local_addr: SocketAddr,
    trigger: ShutdownTrigger,
    acceptor: JoinHandle<()>,
    pool: WorkerPool,
    queue: SharedQueue,
    metrics: Arc<Metrics>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops accepting, cancels in-flight sessions and waits for every task.
    ///
    /// Connections still queued are closed without being served.
    pub async fn shutdown(self) -> MetricsSnapshot {
        info!("shutting down");
        self.trigger.trigger();

        if let Err(err) = self.acceptor.await {
            warn!(%err, "acceptor task ended abnormally");
        }
        self.pool.join().await;

        let dropped = self.queue.drain().len();
        if dropped > 0 {
            warn!(dropped, "closed queued connections that were never served");
        }

        let snapshot = self.metrics.snapshot();
        info!(
            sessions = snapshot.sessions_total,
            replies = snapshot.replies_total,
            commands = snapshot.commands_total,
            "server stopped"
        );
        snapshot
    }
}
