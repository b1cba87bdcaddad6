//! # Wire Protocol Definitions
//!
//! Purpose: Define the command words, reply literals and typed commands shared
//! by the server parser and the client encoder.
//!
//! ## Message Layout
//!
//! ```text
//! client -> server:  WRITE alpha :one\nREAD alpha\nCOUNT\nEND\n
//! server -> client:  FIN\none\n1\n\n
//!                    ^ one line per command, then a blank terminator line
//! ```
//!
//! Tokens are separated by any ASCII whitespace. Replies are only sent once the
//! `END` command is seen, as a single consolidated write.

use bytes::{BufMut, Bytes, BytesMut};

/// Command word for a lookup.
pub const CMD_READ: &[u8] = b"READ";
/// Command word for an insert or overwrite.
pub const CMD_WRITE: &[u8] = b"WRITE";
/// Command word for the entry count.
pub const CMD_COUNT: &[u8] = b"COUNT";
/// Command word for a removal.
pub const CMD_DELETE: &[u8] = b"DELETE";
/// Command word (and framing marker) that ends a message.
pub const CMD_END: &[u8] = b"END";

/// Leading byte required on the value token of a `WRITE`.
pub const VALUE_SENTINEL: u8 = b':';

/// Reply line acknowledging a write or a successful delete.
pub const REPLY_FIN: &[u8] = b"FIN";
/// Reply line for a missing key.
pub const REPLY_NULL: &[u8] = b"NULL";

/// Returns true for bytes that separate tokens.
///
/// Matches the C `isspace` set, which includes vertical tab.
pub const fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

/// Recognized command words. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    Write,
    Count,
    Delete,
    End,
}

impl Verb {
    /// Maps a whole token to a verb; anything else is not a command.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            CMD_READ => Some(Self::Read),
            CMD_WRITE => Some(Self::Write),
            CMD_COUNT => Some(Self::Count),
            CMD_DELETE => Some(Self::Delete),
            CMD_END => Some(Self::End),
            _ => None,
        }
    }

    /// Returns the literal command word.
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Read => CMD_READ,
            Self::Write => CMD_WRITE,
            Self::Count => CMD_COUNT,
            Self::Delete => CMD_DELETE,
            Self::End => CMD_END,
        }
    }
}

/// A fully parsed command.
///
/// `Write::value` holds the value with the sentinel already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read { key: Bytes },
    Write { key: Bytes, value: Bytes },
    Count,
    Delete { key: Bytes },
    End,
}

impl Command {
    /// Returns the command word of this command.
    pub fn verb(&self) -> Verb {
        match self {
            Self::Read { .. } => Verb::Read,
            Self::Write { .. } => Verb::Write,
            Self::Count => Verb::Count,
            Self::Delete { .. } => Verb::Delete,
            Self::End => Verb::End,
        }
    }

    /// Appends the request form of the command, newline terminated.
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_slice(self.verb().as_bytes());
        match self {
            Self::Read { key } | Self::Delete { key } => {
                out.put_u8(b' ');
                out.put_slice(key);
            }
            Self::Write { key, value } => {
                out.put_u8(b' ');
                out.put_slice(key);
                out.put_u8(b' ');
                out.put_u8(VALUE_SENTINEL);
                out.put_slice(value);
            }
            Self::Count | Self::End => {}
        }
        out.put_u8(b'\n');
    }
}

/// One line of a consolidated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Value found by `READ` (may be empty).
    Value(Bytes),
    /// `NULL`: missing key on `READ`, or nothing removed on `DELETE`.
    Null,
    /// `FIN`: write stored, or key removed.
    Fin,
    /// Entry count from `COUNT`.
    Count(usize),
}

impl Reply {
    /// Appends the reply line, newline terminated.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::Value(value) => out.put_slice(value),
            Self::Null => out.put_slice(REPLY_NULL),
            Self::Fin => out.put_slice(REPLY_FIN),
            Self::Count(count) => out.put_slice(count.to_string().as_bytes()),
        }
        out.put_u8(b'\n');
    }

    /// Interprets a reply line in the context of the command that produced it.
    ///
    /// Returns `None` if the line is not a valid answer to `verb`.
    pub fn decode(verb: Verb, line: &[u8]) -> Option<Self> {
        match verb {
            Verb::Read if line == REPLY_NULL => Some(Self::Null),
            Verb::Read => Some(Self::Value(Bytes::copy_from_slice(line))),
            Verb::Write if line == REPLY_FIN => Some(Self::Fin),
            Verb::Delete if line == REPLY_FIN => Some(Self::Fin),
            Verb::Delete if line == REPLY_NULL => Some(Self::Null),
            Verb::Count => std::str::from_utf8(line).ok()?.parse().ok().map(Self::Count),
            _ => None,
        }
    }
}
