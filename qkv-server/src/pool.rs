//! # Worker Pool
//!
//! A fixed number of long-lived workers. Each one takes a connection from the
//! shared queue, runs its session to completion, then asks for the next one.
//! A connection is owned by exactly one worker from dequeue to close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use qkv_engine::KvEngine;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use crate::config::SessionSettings;
use crate::metrics::{Metrics, SessionEnd};
use crate::queue::ConnectionQueue;
use crate::session;
use crate::shutdown::Shutdown;

/// An accepted connection waiting for a worker.
#[derive(Debug)]
pub struct QueuedConnection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub accepted_at: Instant,
}

impl QueuedConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        QueuedConnection {
            stream,
            peer,
            accepted_at: Instant::now(),
        }
    }
}

/// Queue type shared between the acceptor and the pool.
pub type SharedQueue = Arc<ConnectionQueue<QueuedConnection>>;

/// State every worker needs; cloned once per worker.
pub struct WorkerContext<E: ?Sized> {
    pub queue: SharedQueue,
    pub engine: Arc<E>,
    pub metrics: Arc<Metrics>,
    pub settings: SessionSettings,
}

impl<E: ?Sized> Clone for WorkerContext<E> {
    fn clone(&self) -> Self {
        WorkerContext {
            queue: Arc::clone(&self.queue),
            engine: Arc::clone(&self.engine),
            metrics: Arc::clone(&self.metrics),
            settings: self.settings,
        }
    }
}

/// Handles to the spawned workers.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime.
    pub fn spawn<E>(size: usize, context: WorkerContext<E>, shutdown: &Shutdown) -> Self
    where
        E: KvEngine + ?Sized + 'static,
    {
        let workers = (0..size)
            .map(|id| {
                let span = info_span!("worker", id);
                tokio::spawn(worker_loop(context.clone(), shutdown.clone()).instrument(span))
            })
            .collect();
        WorkerPool { workers }
    }

    /// Number of workers in the pool.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to exit. Workers exit only on shutdown.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(%err, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop<E>(context: WorkerContext<E>, mut shutdown: Shutdown)
where
    E: KvEngine + ?Sized,
{
    debug!("worker started");
    loop {
        let connection = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            connection = context.queue.pop() => connection,
        };
        serve(&context, connection, &mut shutdown).await;
    }
    debug!("worker stopped");
}

async fn serve<E>(context: &WorkerContext<E>, connection: QueuedConnection, shutdown: &mut Shutdown)
where
    E: KvEngine + ?Sized,
{
    let QueuedConnection {
        stream,
        peer,
        accepted_at,
    } = connection;
    let started = Instant::now();
    debug!(%peer, queued_for = ?started.duration_since(accepted_at), "session started");
    context.metrics.record_session_start();

    let end = match session::run(stream, context.engine.as_ref(), context.settings, shutdown).await {
        Ok(report) => {
            context
                .metrics
                .record_commands(report.executed, report.malformed_writes);
            debug!(%peer, end = ?report.end, commands = report.executed, "session finished");
            report.end
        }
        Err(err) => {
            warn!(%peer, %err, "session aborted");
            SessionEnd::Failed
        }
    };
    context.metrics.record_session_end(end, started.elapsed());
}
