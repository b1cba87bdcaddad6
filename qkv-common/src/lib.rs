// qkv-common - Shared types and protocol definitions for QueueKV
//
// This crate defines the line-oriented wire protocol and the error taxonomy

pub mod error;
pub mod protocol;

// Re-export for convenience
pub use error::*;
pub use protocol::*;
