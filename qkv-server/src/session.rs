//! # Client Session
//!
//! Runs the per-connection protocol state machine:
//!
//! ```text
//! Accumulating --(framing complete)--> Dispatching --(END)--> Terminated
//!      |                                    |
//!      +--(EOF / error / shutdown)----------+--(no END)------> Terminated
//! ```
//!
//! Replies are buffered and written once, when `END` is dispatched. The
//! stream is dropped (closed) when the session returns.

use bytes::{BufMut, Bytes, BytesMut};
use qkv_common::{Command, QkvResult, Reply};
use qkv_engine::KvEngine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::SessionSettings;
use crate::metrics::SessionEnd;
use crate::protocol::MessageFramer;
use crate::shutdown::Shutdown;

/// Result of a session that did not fail on I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,
    /// Commands executed against the store (excluding `END`).
    pub executed: usize,
    /// Writes dropped for a missing value sentinel.
    pub malformed_writes: usize,
}

impl SessionReport {
    fn idle(end: SessionEnd) -> Self {
        SessionReport {
            end,
            executed: 0,
            malformed_writes: 0,
        }
    }
}

/// Executes `commands` in order, appending one reply line per command.
///
/// Stops at the first `End`, appending the blank terminator line. Returns
/// the number of commands executed and whether `End` was reached.
pub fn dispatch<E>(engine: &E, commands: &[Command], reply: &mut BytesMut) -> (usize, bool)
where
    E: KvEngine + ?Sized,
{
    let mut executed = 0;
    for command in commands {
        let line = match command {
            Command::Read { key } => match engine.get(key) {
                Some(value) => Reply::Value(value),
                None => Reply::Null,
            },
            Command::Write { key, value } => {
                // Copy out of the session buffer so the store does not pin it.
                engine.set(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value));
                Reply::Fin
            }
            Command::Count => Reply::Count(engine.count()),
            Command::Delete { key } => {
                if engine.delete(key) {
                    Reply::Fin
                } else {
                    Reply::Null
                }
            }
            Command::End => {
                reply.put_u8(b'\n');
                return (executed, true);
            }
        };
        line.encode(reply);
        executed += 1;
    }
    (executed, false)
}

/// Runs one session to completion on `stream`.
///
/// Returns `Err` only for connection I/O failures; those end this session and
/// nothing else.
pub async fn run<S, E>(
    mut stream: S,
    engine: &E,
    settings: SessionSettings,
    shutdown: &mut Shutdown,
) -> QkvResult<SessionReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: KvEngine + ?Sized,
{
    let mut buf = BytesMut::with_capacity(settings.read_buffer);
    let mut framer = MessageFramer::new(settings.framing);

    // Accumulating
    loop {
        buf.reserve(settings.read_buffer);
        let read = tokio::select! {
            biased;
            _ = shutdown.recv() => return Ok(SessionReport::idle(SessionEnd::Cancelled)),
            read = stream.read_buf(&mut buf) => read?,
        };
        if read == 0 {
            return Ok(SessionReport::idle(SessionEnd::PeerClosed));
        }
        if framer.advance(&mut buf) {
            break;
        }
    }

    // Dispatching
    let mut reply = BytesMut::new();
    let (executed, ended) = dispatch(engine, framer.commands(), &mut reply);
    let mut report = SessionReport {
        end: SessionEnd::Unterminated,
        executed,
        malformed_writes: framer.malformed_writes(),
    };
    if ended {
        stream.write_all(&reply).await?;
        stream.shutdown().await?;
        report.end = SessionEnd::Replied;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use qkv_engine::MemoryEngine;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::config::FramingMode;
    use crate::shutdown;

    fn settings(framing: FramingMode) -> SessionSettings {
        SessionSettings {
            framing,
            read_buffer: 16,
        }
    }

    async fn round_trip(engine: &MemoryEngine, framing: FramingMode, input: &[u8]) -> (SessionReport, String) {
        let (mut client, server) = duplex(1024);
        let (_trigger, mut shutdown) = shutdown::channel();
        client.write_all(input).await.unwrap();

        let report = run(server, engine, settings(framing), &mut shutdown)
            .await
            .unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        (report, out)
    }

    #[tokio::test]
    async fn end_to_end_reply_is_consolidated() {
        let engine = MemoryEngine::new();
        let (report, out) = round_trip(
            &engine,
            FramingMode::Token,
            b"WRITE alpha :one\nREAD alpha\nCOUNT\nDELETE alpha\nDELETE alpha\nEND\n",
        )
        .await;
        assert_eq!(out, "FIN\none\n1\nFIN\nNULL\n\n");
        assert_eq!(report.end, SessionEnd::Replied);
        assert_eq!(report.executed, 5);
        assert_eq!(engine.count(), 0);
    }

    #[tokio::test]
    async fn malformed_write_produces_no_line() {
        let engine = MemoryEngine::new();
        let (report, out) =
            round_trip(&engine, FramingMode::Token, b"WRITE k v\nREAD k\nCOUNT\nEND\n").await;
        assert_eq!(out, "NULL\n0\n\n");
        assert_eq!(report.malformed_writes, 1);
    }

    #[tokio::test]
    async fn missing_key_reads_null_and_keeps_count() {
        let engine = MemoryEngine::new();
        let (_, out) = round_trip(
            &engine,
            FramingMode::Token,
            b"READ ghost READ ghost READ ghost COUNT END\n",
        )
        .await;
        assert_eq!(out, "NULL\nNULL\nNULL\n0\n\n");
    }

    #[tokio::test]
    async fn empty_value_reads_back_as_empty_line() {
        let engine = MemoryEngine::new();
        let (_, out) = round_trip(&engine, FramingMode::Token, b"WRITE k : READ k END\n").await;
        assert_eq!(out, "FIN\n\n\n");
    }

    #[tokio::test]
    async fn substring_framing_without_end_command_sends_nothing() {
        let engine = MemoryEngine::new();
        let (report, out) =
            round_trip(&engine, FramingMode::Substring, b"WRITE day :WEEKEND\n").await;
        assert_eq!(report.end, SessionEnd::Unterminated);
        assert_eq!(out, "");
        // The write itself was applied before the message turned out unterminated.
        assert_eq!(engine.get(b"day"), Some(Bytes::from_static(b"WEEKEND")));
    }

    #[tokio::test]
    async fn peer_close_before_end_sends_nothing() {
        let engine = MemoryEngine::new();
        let (mut client, server) = duplex(1024);
        let (_trigger, mut shutdown) = shutdown::channel();
        client.write_all(b"WRITE k :v\n").await.unwrap();
        client.shutdown().await.unwrap();

        let report = run(server, &engine, settings(FramingMode::Token), &mut shutdown)
            .await
            .unwrap();
        assert_eq!(report.end, SessionEnd::PeerClosed);
        assert_eq!(engine.count(), 0);
    }

    #[tokio::test]
    async fn trailing_end_before_half_close_is_answered() {
        let engine = MemoryEngine::new();
        let (mut client, server) = duplex(1024);
        let (_trigger, mut shutdown) = shutdown::channel();
        client.write_all(b"WRITE a :1 COUNT END").await.unwrap();
        client.shutdown().await.unwrap();

        let report = run(server, &engine, settings(FramingMode::Token), &mut shutdown)
            .await
            .unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(report.end, SessionEnd::Replied);
        assert_eq!(out, "FIN\n1\n\n");
    }

    #[tokio::test]
    async fn shutdown_cancels_a_waiting_session() {
        let engine = MemoryEngine::new();
        let (_client, server) = duplex(1024);
        let (trigger, mut shutdown) = shutdown::channel();

        let session = run(server, &engine, settings(FramingMode::Token), &mut shutdown);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        };
        let (report, ()) = tokio::join!(session, cancel);
        assert_eq!(report.unwrap().end, SessionEnd::Cancelled);
    }

    #[test]
    fn dispatch_stops_at_end() {
        let engine = MemoryEngine::new();
        let mut reply = BytesMut::new();
        let commands = [
            Command::Count,
            Command::End,
            Command::Write {
                key: Bytes::from_static(b"late"),
                value: Bytes::from_static(b"x"),
            },
        ];
        let (executed, ended) = dispatch(&engine, &commands, &mut reply);
        assert!(ended);
        assert_eq!(executed, 1);
        assert_eq!(&reply[..], b"0\n\n");
        assert_eq!(engine.count(), 0);
    }
}
