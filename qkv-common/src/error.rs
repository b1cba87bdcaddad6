//! # QueueKV Error Types
//!
//! ## Design Principles
//!
//! 1. **Categorized Failures**: Every variant maps to a category that tells the
//!    caller how far the failure reaches (one session, one accept, the server).
//! 2. **Source Preservation**: I/O errors keep their `std::io::Error` source.
//! 3. **Recoverability Hints**: Only fatal errors stop the server; everything
//!    else is handled locally and logged.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type used across QueueKV components.
pub type QkvResult<T> = Result<T, QkvError>;

/// High-level category for grouping errors by blast radius.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum QkvErrorCategory {
    /// The listening socket could not be set up; the server cannot serve.
    Fatal,
    /// A single accept attempt failed; the acceptor retries.
    Transient,
    /// I/O on one connection failed; only that session ends.
    Session,
    /// Startup configuration was rejected before anything was bound.
    Config,
}

impl QkvErrorCategory {
    /// Returns true if the category must stop the whole server.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal | Self::Config)
    }
}

/// Errors surfaced by the server components.
#[derive(Debug, Error)]
pub enum QkvError {
    /// Creating, binding or listening on the server socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// `accept()` failed for one inbound connection.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    /// Reading from or writing to a client connection failed.
    #[error("connection i/o failed: {0}")]
    Io(#[from] io::Error),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QkvError {
    /// Returns the coarse category of the error.
    pub const fn category(&self) -> QkvErrorCategory {
        match self {
            Self::Bind { .. } => QkvErrorCategory::Fatal,
            Self::Accept(_) => QkvErrorCategory::Transient,
            Self::Io(_) => QkvErrorCategory::Session,
            Self::InvalidConfig(_) => QkvErrorCategory::Config,
        }
    }

    /// Returns true if the server cannot continue after this error.
    pub const fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::{QkvError, QkvErrorCategory};
    use std::io;

    #[test]
    fn maps_error_categories() {
        let bind = QkvError::Bind {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(bind.category(), QkvErrorCategory::Fatal);
        assert_eq!(
            QkvError::Accept(io::Error::from(io::ErrorKind::Interrupted)).category(),
            QkvErrorCategory::Transient
        );
        assert_eq!(
            QkvError::from(io::Error::from(io::ErrorKind::ConnectionReset)).category(),
            QkvErrorCategory::Session
        );
    }

    #[test]
    fn only_setup_failures_are_fatal() {
        assert!(QkvError::InvalidConfig("workers".into()).is_fatal());
        assert!(!QkvError::Accept(io::Error::from(io::ErrorKind::WouldBlock)).is_fatal());
        assert!(!QkvError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());
    }

    #[test]
    fn bind_error_names_the_address() {
        let err = QkvError::Bind {
            addr: "127.0.0.1:5555".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().contains("127.0.0.1:5555"));
    }
}
