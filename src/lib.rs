//! Client for Music Player Daemon servers.
//!
//! The crate is organized leaf-first:
//!
//! * [`endpoint`] - server address, port and password
//! * [`transport`] - one TCP connection with per-read deadlines
//! * [`session`] - handshake, authentication, command execution
//! * [`protocol`] - wire format and response parsing
//! * [`client`] - one typed method per server command
//! * [`listing`] - sorting and duplicate detection for listings
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod listing;
pub mod protocol;
pub mod session;
pub mod transport;
