//! # Server Configuration
//!
//! Holds every startup-time knob of the server. Values are fixed once the
//! server is bound; nothing here is resized at runtime.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::ValueEnum;
use qkv_common::{QkvError, QkvResult};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5555;
/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 5;
/// Default listen backlog handed to `listen(2)`.
pub const DEFAULT_BACKLOG: u32 = 128;
/// Default number of bytes reserved for each socket read.
pub const DEFAULT_READ_BUFFER: usize = 4096;

/// Rule deciding when an accumulated client message is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum FramingMode {
    /// Complete once an `END` token is parsed in command position.
    ///
    /// Values or keys containing the letters `END` do not end the message.
    #[default]
    Token,
    /// Complete as soon as the bytes `END` appear anywhere in the buffer.
    Substring,
}

/// Per-session settings copied into every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub framing: FramingMode,
    pub read_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            framing: FramingMode::default(),
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the acceptor listens on.
    pub addr: SocketAddr,
    /// Number of workers in the pool.
    pub workers: usize,
    /// Listen backlog.
    pub backlog: u32,
    /// Session framing and buffering.
    pub session: SessionSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            workers: DEFAULT_WORKERS,
            backlog: DEFAULT_BACKLOG,
            session: SessionSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Creates the default configuration listening on `addr`.
    pub fn with_addr(addr: SocketAddr) -> Self {
        ServerConfig {
            addr,
            ..ServerConfig::default()
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> QkvResult<()> {
        if self.workers == 0 {
            return Err(QkvError::InvalidConfig(
                "worker pool needs at least one worker".into(),
            ));
        }
        if self.backlog == 0 || self.backlog > i32::MAX as u32 {
            return Err(QkvError::InvalidConfig(format!(
                "backlog {} out of range",
                self.backlog
            )));
        }
        if self.session.read_buffer == 0 {
            return Err(QkvError::InvalidConfig(
                "read buffer must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
