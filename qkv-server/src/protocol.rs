//! # Command Stream Parser
//!
//! Split a streaming TCP buffer into whitespace-delimited tokens and fold the
//! tokens into commands.
//!
//! ## Design Principles
//!
//! 1. **State Machine Pattern**: The parser remembers which operand it is
//!    waiting for, so tokens can arrive one at a time across reads.
//! 2. **Streaming Friendly**: The tokenizer consumes from a mutable buffer and
//!    returns `None` when more data is needed.
//! 3. **Ignore and Continue**: Unknown words and malformed writes are dropped
//!    silently; they never produce an error.
//! 4. **Framing is Pluggable**: `MessageFramer` decides when a message is
//!    complete according to the configured `FramingMode`.

use bytes::{Buf, Bytes, BytesMut};
use qkv_common::{is_delimiter, Command, Verb, CMD_END, VALUE_SENTINEL};
use tracing::trace;

use crate::config::FramingMode;

/// Splits the next complete token off the front of `buf`.
///
/// A token is complete once a delimiter follows it. With `at_end` set, the
/// trailing bytes count as a token even without a delimiter. Leading
/// delimiters are consumed.
pub fn next_token(buf: &mut BytesMut, at_end: bool) -> Option<Bytes> {
    let Some(start) = buf.iter().position(|&b| !is_delimiter(b)) else {
        buf.clear();
        return None;
    };
    buf.advance(start);

    match buf.iter().position(|&b| is_delimiter(b)) {
        Some(len) => Some(buf.split_to(len).freeze()),
        None if at_end => Some(buf.split().freeze()),
        None => None,
    }
}

/// Command words that take a key operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyed {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseState {
    Verb,
    Key(Keyed),
    Value { key: Bytes },
}

/// Folds tokens into commands.
#[derive(Debug)]
pub struct CommandParser {
    state: ParseState,
    malformed_writes: usize,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandParser {
    /// Creates a new parser in the initial state.
    pub fn new() -> Self {
        CommandParser {
            state: ParseState::Verb,
            malformed_writes: 0,
        }
    }

    /// Feeds one token; returns a command when the token completes one.
    ///
    /// Operands are taken positionally: the token after `READ` is the key even
    /// if it spells a command word.
    pub fn feed(&mut self, token: Bytes) -> Option<Command> {
        match std::mem::replace(&mut self.state, ParseState::Verb) {
            ParseState::Verb => match Verb::from_token(&token) {
                Some(Verb::Read) => self.expect_key(Keyed::Read),
                Some(Verb::Write) => self.expect_key(Keyed::Write),
                Some(Verb::Delete) => self.expect_key(Keyed::Delete),
                Some(Verb::Count) => Some(Command::Count),
                Some(Verb::End) => Some(Command::End),
                None => {
                    trace!(token = ?token, "ignoring unknown token");
                    None
                }
            },
            ParseState::Key(Keyed::Read) => Some(Command::Read { key: token }),
            ParseState::Key(Keyed::Delete) => Some(Command::Delete { key: token }),
            ParseState::Key(Keyed::Write) => {
                self.state = ParseState::Value { key: token };
                None
            }
            ParseState::Value { key } => {
                if token.first() == Some(&VALUE_SENTINEL) {
                    Some(Command::Write {
                        key,
                        value: token.slice(1..),
                    })
                } else {
                    trace!(key = ?key, "discarding write without value sentinel");
                    self.malformed_writes += 1;
                    None
                }
            }
        }
    }

    /// Returns true if the parser is between commands.
    pub fn is_idle(&self) -> bool {
        self.state == ParseState::Verb
    }

    /// Number of writes dropped for a missing sentinel.
    pub fn malformed_writes(&self) -> usize {
        self.malformed_writes
    }

    fn expect_key(&mut self, keyed: Keyed) -> Option<Command> {
        self.state = ParseState::Key(keyed);
        None
    }
}

/// Accumulates commands until the configured framing rule completes a message.
#[derive(Debug)]
pub struct MessageFramer {
    mode: FramingMode,
    parser: CommandParser,
    commands: Vec<Command>,
    scanned: usize,
    complete: bool,
}

impl MessageFramer {
    /// Creates a framer for one message.
    pub fn new(mode: FramingMode) -> Self {
        MessageFramer {
            mode,
            parser: CommandParser::new(),
            commands: Vec::new(),
            scanned: 0,
            complete: false,
        }
    }

    /// Consumes what it can from `buf`; returns true once the message is
    /// complete. Further calls after completion are no-ops.
    pub fn advance(&mut self, buf: &mut BytesMut) -> bool {
        if self.complete {
            return true;
        }
        match self.mode {
            FramingMode::Token => {
                while let Some(token) = next_token(buf, false) {
                    if self.push(token) {
                        self.complete = true;
                        break;
                    }
                }
                // A bare `END` in command position is final even before any
                // delimiter arrives: no command word starts with it.
                if !self.complete && self.parser.is_idle() && &buf[..] == CMD_END {
                    buf.clear();
                    self.commands.push(Command::End);
                    self.complete = true;
                }
            }
            FramingMode::Substring => {
                // The marker may straddle the previous scan boundary.
                let from = self.scanned.saturating_sub(CMD_END.len() - 1);
                if contains_marker(&buf[from..]) {
                    while let Some(token) = next_token(buf, true) {
                        if self.push(token) {
                            break;
                        }
                    }
                    self.complete = true;
                } else {
                    self.scanned = buf.len();
                }
            }
        }
        self.complete
    }

    /// Returns the parsed commands. The last one is `End` if the message
    /// contained an `END` command.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of writes dropped for a missing sentinel.
    pub fn malformed_writes(&self) -> usize {
        self.parser.malformed_writes()
    }

    fn push(&mut self, token: Bytes) -> bool {
        match self.parser.feed(token) {
            Some(Command::End) => {
                self.commands.push(Command::End);
                true
            }
            Some(command) => {
                self.commands.push(command);
                false
            }
            None => false,
        }
    }
}

fn contains_marker(haystack: &[u8]) -> bool {
    haystack.windows(CMD_END.len()).any(|window| window == CMD_END)
}
