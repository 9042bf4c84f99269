use std::time::Duration;

/// Port a music server listens on when the endpoint does not name one.
pub const DEFAULT_PORT: u16 = 6600;

/// Connection tunables shared by every session.
///
/// The read timeouts model a server that may take a while to start
/// answering (a busy database, a slow greeting) but that, once a response
/// is flowing, delivers every further line promptly. A response that stalls
/// halfway is treated as a lost connection rather than a short answer.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    /// Upper bound for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound for the greeting and for the first line of a response.
    pub first_line_timeout: Duration,
    /// Upper bound for every following line of the same response.
    pub next_line_timeout: Duration,
    /// How long `close` waits for the farewell to be flushed.
    pub close_linger: Duration,

    /// Attempts made by the liveness probe after a handshake.
    pub ping_retries: usize,
    /// Port used when the endpoint does not name one.
    pub default_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            first_line_timeout: Duration::from_secs(10),
            next_line_timeout: Duration::from_secs(1),
            close_linger: Duration::from_millis(100),

            ping_retries: 1,
            default_port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Returns a copy with every timeout set to `timeout`.
    ///
    /// Handy for tests and for callers on a fast local network.
    #[must_use]
    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.first_line_timeout = timeout;
        self.next_line_timeout = timeout;
        self
    }
}
