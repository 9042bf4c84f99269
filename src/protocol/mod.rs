//! Wire format of the Music Player Daemon protocol.
//!
//! The protocol is line-oriented UTF-8 text over TCP:
//!
//! * On connect, the server greets with `OK MPD <version>`.
//! * The client sends one command per line: `command [arg ...]`.
//! * The server answers with zero or more `Key: Value` lines, terminated
//!   by either `OK` or `ACK [code@index] {command} message`.
//!
//! This module holds the pieces that only depend on the text itself:
//! recognizing terminators, parsing `ACK` lines and the greeting, and
//! building command lines. Turning response bodies into structured data is
//! done by [`response`].
//!
//! # Argument quoting
//!
//! Path-like and free-text arguments are wrapped in double quotes. The
//! server interprets backslashes and quotes inside such arguments, so
//! [`Command::quoted`] refuses arguments containing `"`, `\` or line breaks
//! instead of guessing at an escaping convention.

pub mod response;

use std::{fmt, str::FromStr};

use crate::error::{Error, Result};

/// Prefix of the greeting line sent by the server on connect.
pub const GREETING_PREFIX: &str = "OK MPD ";

/// Line that ends a successful response.
pub const OK: &str = "OK";

/// Prefix of the line that ends a failed response.
pub const ACK_PREFIX: &str = "ACK";

/// Characters never accepted inside a playlist name.
const PLAYLIST_NAME_FORBIDDEN: &[char] = &['"', '\\', '/', '?', '|', '<', '>'];

/// Characters that cannot be sent inside a quoted argument.
const QUOTED_FORBIDDEN: &[char] = &['"', '\\', '\r', '\n'];

/// Terminator of a response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    Ok,
    Ack(Ack),
}

impl Terminator {
    /// Recognizes a terminator line.
    ///
    /// Returns `None` for body lines.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        if line == OK {
            Some(Self::Ok)
        } else if line.starts_with(ACK_PREFIX) {
            Some(Self::Ack(Ack::parse(line)))
        } else {
            None
        }
    }
}

/// A command rejection as reported by the server.
///
/// Parsed from lines of the form `ACK [code@index] {command} message`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{message}")]
pub struct Ack {
    /// Server error code, `0` when the bracket group is missing or garbled.
    pub code: u32,

    /// Position of the failing command in a command list.
    pub index: u32,

    /// Name of the command that failed.
    pub command: String,

    /// Human-readable message following the bracket groups.
    pub message: String,
}

impl Ack {
    /// Parses an `ACK` line leniently.
    ///
    /// The message is whatever follows the first `}` after skipping
    /// whitespace. Without a `}` the message is empty. Missing or garbled
    /// code and index fields default to `0`.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let rest = line.strip_prefix(ACK_PREFIX).unwrap_or(line);

        let (code, index) = rest
            .find('[')
            .zip(rest.find(']'))
            .filter(|(open, close)| open < close)
            .and_then(|(open, close)| rest[open + 1..close].split_once('@'))
            .map(|(code, index)| {
                (
                    code.trim().parse().unwrap_or_default(),
                    index.trim().parse().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        let (command, message) = match (rest.find('{'), rest.find('}')) {
            (open, Some(close)) => {
                let command = open
                    .filter(|&open| open < close)
                    .map(|open| rest[open + 1..close].to_owned())
                    .unwrap_or_default();
                let message = rest[close + 1..].trim_start().to_owned();
                (command, message)
            }
            (_, None) => (String::new(), String::new()),
        };

        Self {
            code,
            index,
            command,
            message,
        }
    }
}

/// Server protocol version announced in the greeting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Greeting {
    pub version: String,
}

impl FromStr for Greeting {
    type Err = Error;

    /// Parses `OK MPD <version>`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Protocol`](crate::error::ErrorKind::Protocol)
    /// for an empty line or a line without the expected prefix.
    fn from_str(line: &str) -> Result<Self> {
        if line.trim().is_empty() {
            return Err(Error::protocol("the server does not respond"));
        }

        let version = line
            .strip_prefix(GREETING_PREFIX)
            .ok_or_else(|| Error::protocol(format!("host is not an MPD server: \"{line}\"")))?;

        Ok(Self {
            version: version.trim().to_owned(),
        })
    }
}

impl fmt::Display for Greeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPD {}", self.version)
    }
}

/// Builder for a single command line.
///
/// # Example
///
/// ```rust
/// let line = Command::new("addid").quoted("Music/a.mp3")?.arg(3).to_string();
/// assert_eq!(line, "addid \"Music/a.mp3\" 3");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    line: String,
}

impl Command {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            line: name.to_owned(),
        }
    }

    /// Appends an unquoted argument, such as a number or a range.
    #[must_use]
    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.line.push(' ');
        self.line.push_str(&arg.to_string());
        self
    }

    /// Appends `0` or `1`.
    #[must_use]
    pub fn flag(self, flag: bool) -> Self {
        self.arg(u8::from(flag))
    }

    /// Appends a double-quoted argument.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// when `arg` contains a character that would change the meaning of the
    /// line: `"`, `\`, `\r` or `\n`.
    pub fn quoted(mut self, arg: &str) -> Result<Self> {
        if let Some(c) = arg.chars().find(|c| QUOTED_FORBIDDEN.contains(c)) {
            return Err(Error::invalid_argument(format!(
                "argument \"{}\" contains unsupported character {c:?}",
                arg.escape_debug()
            )));
        }

        self.line.push_str(" \"");
        self.line.push_str(arg);
        self.line.push('"');
        Ok(self)
    }

    /// Appends a quoted argument unless it is empty.
    ///
    /// Listing commands treat a missing path as the library root.
    ///
    /// # Errors
    ///
    /// See [`Command::quoted`].
    pub fn quoted_opt(self, arg: &str) -> Result<Self> {
        if arg.is_empty() {
            Ok(self)
        } else {
            self.quoted(arg)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Whether `name` can be used for a stored playlist.
///
/// Rejects empty names, control characters and any of `" \ / ? | < >`.
#[must_use]
pub fn is_valid_playlist_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c < '\u{20}' || PLAYLIST_NAME_FORBIDDEN.contains(&c))
}
