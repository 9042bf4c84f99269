//! Server addresses as typed in by users or read from stored profiles.
//!
//! An [`Endpoint`] is accepted in `host` or `host:port` form. A port that is
//! missing, non-numeric or outside `1..=65535` is not an error: it is kept
//! as `0`, meaning "use the default port", and resolved with
//! [`Endpoint::port_or`] when connecting.

use std::{convert::Infallible, fmt, hash, str::FromStr};

use veil::Redact;

/// Address, port and optional password of a music server.
///
/// Equality and hashing consider only the address and port: two profiles
/// pointing at the same server with different passwords are the same
/// endpoint.
#[derive(Redact, Clone, Default, Eq)]
pub struct Endpoint {
    address: String,
    port: u16,
    #[redact]
    password: String,
}

impl Endpoint {
    /// Creates an endpoint from its parts.
    ///
    /// Ports outside `1..=65535` normalize to `0`.
    #[must_use]
    pub fn new(address: impl Into<String>, port: i64) -> Self {
        Self {
            address: address.into(),
            port: normalize_port(port),
            password: String::new(),
        }
    }

    /// Parses `host` or `host:port`.
    ///
    /// The input is split on its last `:` and the left-hand side is the
    /// address. The right-hand side becomes the port when it is all digits;
    /// anything else, including an empty suffix, leaves the port unset. A
    /// bare IPv6 literal such as `fe80::1` is kept whole unless it ends in a
    /// numeric suffix.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.rsplit_once(':') {
            Some((address, port))
                if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
            {
                // Saturate overly long digit strings; they are out of range either way.
                let port = port.parse::<i64>().unwrap_or(i64::MAX);
                Self::new(address, port)
            }
            Some((address, _)) if !address.contains(':') => Self::new(address, 0),
            _ => Self::new(input, 0),
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: i64) -> Self {
        self.port = normalize_port(port);
        self
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the port, `0` when unset.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the port, or `default` when unset.
    #[must_use]
    pub fn port_or(&self, default: u16) -> u16 {
        if self.port == 0 {
            default
        } else {
            self.port
        }
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// An endpoint is usable when it names an address.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.address.is_empty()
    }
}

fn normalize_port(port: i64) -> u16 {
    match u16::try_from(port) {
        Ok(port) if port >= 1 => port,
        _ => 0,
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl hash::Hash for Endpoint {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
    }
}

impl FromStr for Endpoint {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Formats as `host:port`, or just `host` when the port is unset.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 0 {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}
