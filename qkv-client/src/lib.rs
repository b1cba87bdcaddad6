//! # QueueKV Client
//!
//! Async client for the QueueKV line protocol.
//!
//! ## Design Principles
//!
//! 1. **One Message per Connection**: The server answers once per connection
//!    and then closes it, so every `execute` opens a fresh connection.
//! 2. **Typed Batches**: Requests are built through `Batch`, which validates
//!    tokens up front; the server would silently drop malformed ones.
//! 3. **Positional Replies**: Reply lines are matched to commands by position,
//!    so a value spelling `NULL` or `FIN` is still decoded correctly.

use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use qkv_common::{is_delimiter, Command, Reply, Verb};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// A key or value cannot be expressed as a single protocol token.
    #[error("invalid token {0:?}: must be non-empty and free of whitespace")]
    InvalidToken(String),
    /// A reply line did not match the command it answers.
    #[error("malformed reply line {line:?} for {verb:?}")]
    MalformedReply { verb: Verb, line: String },
    /// The server closed before sending every expected line.
    #[error("reply ended after {received} of {expected} lines")]
    Incomplete { expected: usize, received: usize },
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Ordered list of commands sent as one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, key: impl AsRef<[u8]>) -> ClientResult<Self> {
        let key = token(key.as_ref(), false)?;
        self.commands.push(Command::Read { key });
        Ok(self)
    }

    /// Adds a write. `value` may be empty.
    pub fn write(mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> ClientResult<Self> {
        let key = token(key.as_ref(), false)?;
        let value = token(value.as_ref(), true)?;
        self.commands.push(Command::Write { key, value });
        Ok(self)
    }

    pub fn count(mut self) -> Self {
        self.commands.push(Command::Count);
        self
    }

    pub fn delete(mut self, key: impl AsRef<[u8]>) -> ClientResult<Self> {
        let key = token(key.as_ref(), false)?;
        self.commands.push(Command::Delete { key });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Encodes the batch followed by `END`.
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        for command in &self.commands {
            command.encode(&mut out);
        }
        Command::End.encode(&mut out);
        out
    }

    /// Decodes a consolidated reply into one `Reply` per command.
    pub fn decode(&self, raw: &[u8]) -> ClientResult<Vec<Reply>> {
        // The text after the last newline is not a complete line.
        let complete = raw.iter().filter(|&&b| b == b'\n').count();
        let mut lines = raw.split(|&b| b == b'\n').take(complete);
        let mut replies = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            let verb = command.verb();
            let line = match lines.next() {
                Some(line) => line,
                None => {
                    return Err(ClientError::Incomplete {
                        expected: self.commands.len(),
                        received: replies.len(),
                    });
                }
            };
            let reply = Reply::decode(verb, line).ok_or_else(|| ClientError::MalformedReply {
                verb,
                line: String::from_utf8_lossy(line).into_owned(),
            })?;
            replies.push(reply);
        }
        Ok(replies)
    }
}

fn token(raw: &[u8], allow_empty: bool) -> ClientResult<Bytes> {
    if (raw.is_empty() && !allow_empty) || raw.iter().any(|&b| is_delimiter(b)) {
        return Err(ClientError::InvalidToken(
            String::from_utf8_lossy(raw).into_owned(),
        ));
    }
    Ok(Bytes::copy_from_slice(raw))
}

/// Connection factory for one server address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Client {
    addr: SocketAddr,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Client { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends `batch` on a new connection and decodes the reply.
    pub async fn execute(&self, batch: &Batch) -> ClientResult<Vec<Reply>> {
        let raw = self.send_raw(&batch.encode()).await?;
        batch.decode(&raw)
    }

    /// Sends raw bytes on a new connection and returns everything the server
    /// writes before closing.
    pub async fn send_raw(&self, message: &[u8]) -> ClientResult<Vec<u8>> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(message).await?;
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn batch_encodes_commands_then_end() {
        let batch = Batch::new()
            .write("alpha", "one")
            .unwrap()
            .read("alpha")
            .unwrap()
            .count()
            .delete("alpha")
            .unwrap();
        assert_eq!(
            &batch.encode()[..],
            b"WRITE alpha :one\nREAD alpha\nCOUNT\nDELETE alpha\nEND\n"
        );
    }

    #[test]
    fn rejects_tokens_with_whitespace() {
        assert!(matches!(
            Batch::new().write("k", "two words"),
            Err(ClientError::InvalidToken(_))
        ));
        assert!(Batch::new().read("").is_err());
        assert!(Batch::new().write("k", "").is_ok());
    }

    #[test]
    fn decodes_replies_positionally() {
        let batch = Batch::new()
            .read("a")
            .unwrap()
            .read("b")
            .unwrap()
            .count()
            .delete("a")
            .unwrap();
        let replies = batch.decode(b"NULL\nFIN\n3\nNULL\n\n").unwrap();
        assert_eq!(
            replies,
            vec![
                Reply::Null,
                Reply::Value(Bytes::from_static(b"FIN")),
                Reply::Count(3),
                Reply::Null,
            ]
        );
    }

    #[test]
    fn short_reply_is_incomplete() {
        let batch = Batch::new().count().count();
        assert!(matches!(
            batch.decode(b"1\n"),
            Err(ClientError::Incomplete {
                expected: 2,
                received: 1
            })
        ));
        assert!(matches!(
            batch.decode(b""),
            Err(ClientError::Incomplete { received: 0, .. })
        ));
    }

    #[test]
    fn count_reply_must_be_numeric() {
        let batch = Batch::new().count();
        assert!(matches!(
            batch.decode(b"abc\n\n"),
            Err(ClientError::MalformedReply { verb: Verb::Count, .. })
        ));
    }

    #[tokio::test]
    async fn execute_round_trips_against_a_scripted_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = Client::new(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            while !request.ends_with(b"END\n") {
                let mut chunk = [0u8; 64];
                let n = stream.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(b"FIN\none\n\n").await.unwrap();
            request
        });

        let batch = Batch::new().write("k", "one").unwrap().read("k").unwrap();
        let replies = client.execute(&batch).await.unwrap();
        assert_eq!(replies, vec![Reply::Fin, Reply::Value(Bytes::from_static(b"one"))]);
        assert_eq!(server.await.unwrap(), b"WRITE k :one\nREAD k\nEND\n");
    }

    #[tokio::test]
    async fn execute_keeps_non_utf8_values_intact() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = Client::new(listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            while !request.ends_with(b"END\n") {
                let mut chunk = [0u8; 64];
                let n = stream.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(b"\xff\xfe\x80\n\n").await.unwrap();
        });

        let batch = Batch::new().read("bin").unwrap();
        let replies = client.execute(&batch).await.unwrap();
        assert_eq!(
            replies,
            vec![Reply::Value(Bytes::from_static(b"\xff\xfe\x80"))]
        );
        server.await.unwrap();
    }
}
