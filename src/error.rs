//! Error handling for skympc.
//!
//! Every failure is reported as an [`struct@Error`] carrying an [`ErrorKind`]
//! and the underlying cause. The kinds separate the ways a conversation with
//! a music server can go wrong, so callers can react differently to each:
//!
//! * [`ErrorKind::Connection`] - host unreachable or connection lost
//! * [`ErrorKind::Protocol`] - the peer does not speak the MPD protocol
//! * [`ErrorKind::Authentication`] - the password was rejected
//! * [`ErrorKind::Command`] - a single command was rejected with `ACK`
//! * [`ErrorKind::Timeout`] - no data arrived within the allowed time
//!
//! Connection, protocol and timeout errors are fatal for the session that
//! produced them: the transport is closed and a fresh `open()` is needed.
//! Command errors leave the session usable.
//!
//! # Example
//!
//! ```rust
//! use skympc::error::{Error, ErrorKind, Result};
//!
//! fn check_volume(volume: u8) -> Result<u8> {
//!     if volume > 100 {
//!         return Err(Error::invalid_argument("volume must be between 0 and 100"));
//!     }
//!     Ok(volume)
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::{fmt, io};

use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for skympc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories of a music server conversation.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// Host could not be reached, or the connection dropped mid-exchange.
    #[error("connection error")]
    Connection,

    /// The peer answered, but not with the expected protocol.
    #[error("protocol error")]
    Protocol,

    /// The server rejected the password.
    #[error("authentication failure")]
    Authentication,

    /// The server rejected a command with an `ACK` line.
    #[error("command failed")]
    Command,

    /// No data arrived within the allowed time.
    #[error("operation timed out")]
    Timeout,

    /// An argument was refused before anything was sent.
    #[error("invalid argument specified")]
    InvalidArgument,

    /// The session is not open.
    #[error("not connected")]
    NotConnected,
}

impl ErrorKind {
    /// Whether an error of this kind leaves the session unusable.
    ///
    /// Timeouts are treated like lost connections: once a response stalls,
    /// the stream can no longer be trusted to be aligned on a response
    /// boundary.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Connection | ErrorKind::Protocol | ErrorKind::Timeout
        )
    }
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::Protocol, "unexpected greeting");
    /// assert_eq!(err.kind, ErrorKind::Protocol);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for an unreachable host or a dropped connection.
    pub fn connection<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Connection, error)
    }

    /// Creates an error for a peer that does not speak the protocol.
    ///
    /// Also used for responses that cannot be interpreted, such as a
    /// non-numeric id where the server promised one.
    pub fn protocol<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Protocol, error)
    }

    /// Creates an error for rejected credentials.
    pub fn authentication<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Authentication, error)
    }

    /// Creates an error for a command the server rejected.
    ///
    /// Usually wraps a [`crate::protocol::Ack`], which can be recovered with
    /// [`Error::downcast`].
    pub fn command<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Command, error)
    }

    /// Creates an error for an expired read or connect deadline.
    pub fn timeout<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Timeout, error)
    }

    /// Creates an error for arguments refused before sending.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::invalid_argument("playlist name is empty");
    /// assert_eq!(err.kind, ErrorKind::InvalidArgument);
    /// ```
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for operations on a closed session.
    pub fn not_connected<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotConnected, error)
    }

    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Example
    /// ```
    /// if let Some(ack) = error.downcast::<Ack>() {
    ///     println!("server said: {}", ack.message);
    /// }
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether this error leaves the session unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.kind, self.error)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind::*;

        match err.kind() {
            TimedOut | WouldBlock => Self::timeout(err),
            InvalidInput => Self::invalid_argument(err),
            InvalidData => Self::protocol(err),
            _ => Self::connection(err),
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::timeout(e)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::protocol(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Ack;

    #[test]
    fn io_errors_are_classified() {
        let timed_out = Error::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(timed_out.kind, ErrorKind::Timeout);

        let refused = Error::from(io::Error::new(io::ErrorKind::ConnectionRefused, "nope"));
        assert_eq!(refused.kind, ErrorKind::Connection);
        assert!(refused.is_fatal());
    }

    #[test]
    fn command_errors_keep_session_alive() {
        let ack = Ack {
            code: 50,
            index: 1,
            command: "play".to_owned(),
            message: "song doesn't exist".to_owned(),
        };
        let err = Error::command(ack.clone());
        assert!(!err.is_fatal());
        assert_eq!(err.downcast::<Ack>(), Some(&ack));
        assert_eq!(err.error.to_string(), "song doesn't exist");
    }
}
