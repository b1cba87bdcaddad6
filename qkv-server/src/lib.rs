//! # QueueKV Server
//!
//! An in-memory key/value store served over a line-oriented TCP protocol by a
//! fixed pool of workers fed from a shared connection queue.
//!
//! ```text
//! Acceptor --push--> ConnectionQueue --pop--> WorkerPool --> Session --> KvEngine
//! ```

pub mod acceptor;
pub mod config;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::{FramingMode, ServerConfig, SessionSettings};
pub use server::{Server, ServerHandle};
