//! Connection lifecycle and command execution.
//!
//! A [`Session`] owns one [`Transport`] for its whole life:
//!
//! ```text
//! Disconnected --open--> Connected --password accepted--> Authenticated
//!                            |                                  |
//!                            +------ fatal error --> Failed <---+
//! ```
//!
//! Commands are strictly request/response. [`Session::exec`] takes `&mut
//! self`, so the borrow checker already rules out a second command being
//! issued before the previous terminator has been read. Callers that want to
//! probe a server from elsewhere (a "test connection" button, a health
//! check) open their own session with [`Session::probe`] instead of sharing
//! one.

use std::fmt;

use crate::{
    config::Config,
    endpoint::Endpoint,
    error::{Error, Result},
    protocol::{Ack, Greeting, Terminator},
    transport::Transport,
};

/// Lifecycle state of a [`Session`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum State {
    #[default]
    Disconnected,
    Connected,
    Authenticated,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            State::Disconnected => write!(f, "disconnected"),
            State::Connected => write!(f, "connected"),
            State::Authenticated => write!(f, "authenticated"),
            State::Failed => write!(f, "failed"),
        }
    }
}

/// Receives a human-readable narrative of a connection attempt.
///
/// This is what a "test connection" dialog shows: which host is tried,
/// the peer address, the greeting and any rejection from the server.
pub trait Transcript {
    fn append(&mut self, text: &str);
}

impl Transcript for String {
    fn append(&mut self, text: &str) {
        self.push_str(text);
    }
}

impl Transcript for Vec<String> {
    fn append(&mut self, text: &str) {
        self.push(text.to_owned());
    }
}

/// Optional transcript sink accepted by [`Session::open`] and [`Session::probe`].
pub type TranscriptRef<'a> = Option<&'a mut (dyn Transcript + Send)>;

fn narrate(transcript: &mut TranscriptRef<'_>, text: &str) {
    if let Some(transcript) = transcript.as_deref_mut() {
        transcript.append(text);
    }
}

#[derive(Debug)]
pub struct Session {
    transport: Option<Transport>,
    endpoint: Endpoint,
    config: Config,
    state: State,
    greeting: Greeting,
    password_rejected: bool,
    last_error: String,
}

impl Session {
    /// Connects, validates the greeting and authenticates when the endpoint
    /// carries a password.
    ///
    /// A rejected password does not fail the handshake: the session is
    /// returned in the [`State::Connected`] state with
    /// [`password_rejected`](Self::password_rejected) set, so callers can
    /// tell "reachable, but wrong password" apart from "unreachable".
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    ///   when the endpoint has no address
    /// * [`ErrorKind::Connection`](crate::error::ErrorKind::Connection) or
    ///   [`ErrorKind::Timeout`](crate::error::ErrorKind::Timeout) when the
    ///   server cannot be reached
    /// * [`ErrorKind::Protocol`](crate::error::ErrorKind::Protocol) when the
    ///   peer is not a music server
    ///
    /// The transport is closed before any error is returned.
    pub async fn open(
        endpoint: &Endpoint,
        config: &Config,
        mut transcript: TranscriptRef<'_>,
    ) -> Result<Self> {
        if !endpoint.is_valid() {
            return Err(Error::invalid_argument("specified host is not valid"));
        }
        if endpoint.password().contains(['\r', '\n']) {
            return Err(Error::invalid_argument("password contains a line break"));
        }

        let port = endpoint.port_or(config.default_port);
        narrate(
            &mut transcript,
            &format!("Attempting to connect to: {}:{port}\n", endpoint.address()),
        );
        debug!("connecting to {}:{port}", endpoint.address());

        let mut transport =
            Transport::connect(endpoint.address(), port, config.connect_timeout).await?;
        narrate(
            &mut transcript,
            &format!("Connected to: {}\n", transport.peer_addr()),
        );

        match Self::handshake(&mut transport, endpoint, config, &mut transcript).await {
            Ok((greeting, password_rejected)) => {
                let state = if password_rejected || endpoint.password().is_empty() {
                    State::Connected
                } else {
                    State::Authenticated
                };
                info!("{state} to {greeting} at {}", transport.peer_addr());

                Ok(Self {
                    transport: Some(transport),
                    endpoint: endpoint.clone(),
                    config: config.clone(),
                    state,
                    greeting,
                    password_rejected,
                    last_error: String::new(),
                })
            }
            Err(e) => {
                transport.close(config.close_linger).await;
                Err(e)
            }
        }
    }

    async fn handshake(
        transport: &mut Transport,
        endpoint: &Endpoint,
        config: &Config,
        transcript: &mut TranscriptRef<'_>,
    ) -> Result<(Greeting, bool)> {
        let line = transport.read_line(config.first_line_timeout).await?;
        narrate(transcript, "---\n");
        narrate(transcript, &format!("{line}\n"));
        let greeting = line.parse::<Greeting>()?;

        let mut password_rejected = false;
        if !endpoint.password().is_empty() {
            transport
                .write_line(&format!("password {}", endpoint.password()))
                .await?;

            match read_response(transport, config).await {
                Ok(_) => debug!("password accepted"),
                Err(e) => match e.downcast::<Ack>() {
                    Some(ack) => {
                        warn!("password rejected: {}", ack.message);
                        narrate(transcript, &format!("{}\n", ack.message));
                        password_rejected = true;
                    }
                    None => return Err(e),
                },
            }
        }

        narrate(transcript, "\n---\n");
        Ok((greeting, password_rejected))
    }

    /// Opens a session that is ready for commands.
    ///
    /// On top of [`Session::open`] this fails when the password was
    /// rejected, and confirms with a liveness probe that the server answers
    /// commands.
    ///
    /// # Errors
    ///
    /// As [`Session::open`], plus
    /// [`ErrorKind::Authentication`](crate::error::ErrorKind::Authentication)
    /// for a rejected password and
    /// [`ErrorKind::Connection`](crate::error::ErrorKind::Connection) when
    /// the probe gets no answer.
    pub async fn connect(endpoint: &Endpoint, config: &Config) -> Result<Self> {
        Self::connect_with(endpoint, config, None).await
    }

    async fn connect_with(
        endpoint: &Endpoint,
        config: &Config,
        transcript: TranscriptRef<'_>,
    ) -> Result<Self> {
        let mut session = Self::open(endpoint, config, transcript).await?;

        if session.password_rejected {
            session.close().await;
            return Err(Error::authentication("authentication failure"));
        }

        if !session.ping(config.ping_retries).await {
            session.close().await;
            return Err(Error::connection("the server does not respond"));
        }

        Ok(session)
    }

    /// Tests whether `endpoint` accepts connections and commands.
    ///
    /// Uses its own short-lived connection, which is always closed before
    /// returning.
    ///
    /// # Errors
    ///
    /// As [`Session::connect`].
    pub async fn probe(
        endpoint: &Endpoint,
        config: &Config,
        transcript: TranscriptRef<'_>,
    ) -> Result<Greeting> {
        let mut session = Self::connect_with(endpoint, config, transcript).await?;
        let greeting = session.greeting.clone();
        session.close().await;
        Ok(greeting)
    }

    /// Sends `command` and returns the response body.
    ///
    /// Bytes left over from an earlier exchange are discarded first. The
    /// returned lines never include the `OK` terminator.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::Command`](crate::error::ErrorKind::Command) when the
    ///   server answers `ACK`; the [`Ack`] is available through
    ///   [`Error::downcast`] and its message through
    ///   [`last_error`](Self::last_error). The session stays usable.
    /// * [`ErrorKind::Connection`](crate::error::ErrorKind::Connection) or
    ///   [`ErrorKind::Timeout`](crate::error::ErrorKind::Timeout) when the
    ///   response does not arrive completely. The session is closed.
    /// * [`ErrorKind::NotConnected`](crate::error::ErrorKind::NotConnected)
    ///   after the session has been closed.
    pub async fn exec(&mut self, command: &str) -> Result<Vec<String>> {
        self.last_error.clear();

        let config = &self.config;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::not_connected("session is not open"))?;

        let result = async {
            transport.discard_pending()?;
            transport.write_line(command).await?;
            read_response(transport, config).await
        }
        .await;

        if let Err(ref e) = result {
            match e.downcast::<Ack>() {
                Some(ack) => {
                    warn!("{command}: {}", ack.message);
                    self.last_error.clone_from(&ack.message);
                }
                None => {
                    self.last_error = e.to_string();
                    if e.is_fatal() {
                        error!("{command}: {e}");
                        self.fail().await;
                    }
                }
            }
        }

        result
    }

    /// Sends the no-op command up to `retries` times.
    ///
    /// Returns `true` on the first answer. Gives up early once the session
    /// is no longer open.
    pub async fn ping(&mut self, retries: usize) -> bool {
        for attempt in 1..=retries {
            match self.exec("ping").await {
                Ok(_) => return true,
                Err(e) => debug!("ping attempt {attempt}/{retries} failed: {e}"),
            }
            if !self.is_open() {
                break;
            }
        }
        false
    }

    /// Closes the connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close(self.config.close_linger).await;
        }
        if self.state != State::Failed {
            self.state = State::Disconnected;
        }
    }

    async fn fail(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close(self.config.close_linger).await;
        }
        self.state = State::Failed;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn greeting(&self) -> &Greeting {
        &self.greeting
    }

    /// Whether the server refused the endpoint's password.
    #[must_use]
    pub fn password_rejected(&self) -> bool {
        self.password_rejected
    }

    /// Message of the most recent failed command, empty after a success.
    #[must_use]
    pub fn last_error(&self) -> &str {
        &self.last_error
    }
}

/// Reads body lines until a terminator.
///
/// The first line may take `first_line_timeout`; once the response is
/// flowing, each further line must arrive within `next_line_timeout`.
async fn read_response(transport: &mut Transport, config: &Config) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let deadline = if lines.is_empty() {
            config.first_line_timeout
        } else {
            config.next_line_timeout
        };

        let line = transport.read_line(deadline).await?;
        match Terminator::parse(&line) {
            Some(Terminator::Ok) => return Ok(lines),
            Some(Terminator::Ack(ack)) => return Err(Error::command(ack)),
            None => lines.push(line),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream},
        task::JoinHandle,
    };

    use super::*;
    use crate::error::ErrorKind;

    /// One scripted exchange: the command line the client must send, and the
    /// raw text the server answers with. `None` as answer means the server
    /// stays silent.
    pub(crate) type Exchange = (&'static str, Option<&'static str>);

    pub(crate) fn test_config() -> Config {
        Config::default().with_timeouts(Duration::from_millis(300))
    }

    /// Starts a fake server that greets with `greeting` and then plays
    /// `script`, asserting on every command it receives.
    pub(crate) async fn fake_server(
        greeting: &'static str,
        script: Vec<Exchange>,
    ) -> (Endpoint, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, greeting, script).await;
        });

        (Endpoint::new("127.0.0.1", i64::from(port)), handle)
    }

    async fn serve(stream: TcpStream, greeting: &str, script: Vec<Exchange>) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        writer.write_all(greeting.as_bytes()).await.unwrap();

        for (expected, answer) in script {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end_matches('\n'), expected);

            match answer {
                Some(answer) => writer.write_all(answer.as_bytes()).await.unwrap(),
                None => tokio::time::sleep(Duration::from_secs(2)).await,
            }
        }

        // Drain until the client hangs up.
        let mut rest = String::new();
        while reader.read_line(&mut rest).await.unwrap_or(0) > 0 {}
    }

    const GREETING: &str = "OK MPD 0.23.5\n";

    #[tokio::test]
    async fn open_without_password() {
        let (endpoint, server) = fake_server(GREETING, vec![]).await;
        let mut transcript = String::new();

        let mut session = Session::open(&endpoint, &test_config(), Some(&mut transcript))
            .await
            .unwrap();
        assert_eq!(session.state(), State::Connected);
        assert_eq!(session.greeting().version, "0.23.5");
        assert!(!session.password_rejected());
        assert!(transcript.contains("Attempting to connect to: 127.0.0.1:"));
        assert!(transcript.contains("OK MPD 0.23.5"));

        session.close().await;
        assert_eq!(session.state(), State::Disconnected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn open_authenticates() {
        let (endpoint, server) =
            fake_server(GREETING, vec![("password secret", Some("OK\n"))]).await;
        let endpoint = endpoint.with_password("secret");

        let mut session = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap();
        assert_eq!(session.state(), State::Authenticated);
        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn wrong_password_is_not_a_connection_failure() {
        let (endpoint, server) = fake_server(
            GREETING,
            vec![(
                "password wrong",
                Some("ACK [3@0] {password} incorrect password\n"),
            )],
        )
        .await;
        let endpoint = endpoint.with_password("wrong");
        let mut transcript = Vec::new();

        let mut session = Session::open(&endpoint, &test_config(), Some(&mut transcript))
            .await
            .unwrap();
        assert!(session.password_rejected());
        assert_eq!(session.state(), State::Connected);
        assert!(transcript.iter().any(|line| line == "incorrect password\n"));
        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_reports_wrong_password() {
        let (endpoint, server) = fake_server(
            GREETING,
            vec![(
                "password wrong",
                Some("ACK [3@0] {password} incorrect password\n"),
            )],
        )
        .await;
        let endpoint = endpoint.with_password("wrong");

        let err = Session::connect(&endpoint, &test_config())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn foreign_greeting_is_a_protocol_error() {
        let (endpoint, server) = fake_server("SSH-2.0-OpenSSH_9.6\n", vec![]).await;

        let err = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Protocol);
        // The server task only finishes once the client hung up.
        server.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_endpoint_is_rejected_early() {
        let err = Session::open(&Endpoint::parse(""), &test_config(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn password_with_line_break_is_rejected_before_connecting() {
        // Nothing listens here; the check must fire before any connect.
        for password in ["x\nclear", "x\rclear"] {
            let endpoint = Endpoint::new("127.0.0.1", 1).with_password(password);
            let err = Session::open(&endpoint, &test_config(), None)
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "{password:?}");
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        // Bind and drop to find a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::new("127.0.0.1", i64::from(port));
        let err = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Connection);
    }

    #[tokio::test]
    async fn exec_collects_body_until_ok() {
        let (endpoint, server) = fake_server(
            GREETING,
            vec![("status", Some("volume: 40\nstate: play\nOK\n"))],
        )
        .await;

        let mut session = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap();
        let lines = session.exec("status").await.unwrap();
        assert_eq!(lines, ["volume: 40", "state: play"]);
        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn ack_keeps_session_usable() {
        let (endpoint, server) = fake_server(
            GREETING,
            vec![
                ("play 99", Some("ACK [50@1] {play} song doesn't exist\n")),
                ("ping", Some("OK\n")),
            ],
        )
        .await;

        let mut session = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap();
        let err = session.exec("play 99").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Command);
        assert_eq!(session.last_error(), "song doesn't exist");
        assert_eq!(err.downcast::<Ack>().map(|ack| ack.code), Some(50));

        assert!(session.ping(1).await);
        assert_eq!(session.last_error(), "");
        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_response_fails_the_session() {
        let (endpoint, server) =
            fake_server(GREETING, vec![("listall", Some("file: a.mp3\n"))]).await;

        let mut session = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap();
        let err = session.exec("listall").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(session.state(), State::Failed);
        assert!(!session.is_open());

        let err = session.exec("ping").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConnected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn slow_first_line_is_tolerated_but_mid_response_stall_is_not() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            writer.write_all(GREETING.as_bytes()).await.unwrap();

            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, "status\n");
            tokio::time::sleep(Duration::from_millis(300)).await;
            writer.write_all(b"volume: 10\nstate: play\nOK\n").await.unwrap();

            line.clear();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line, "currentsong\n");
            writer.write_all(b"file: a.mp3\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            let _ = writer.write_all(b"OK\n").await;

            let mut rest = String::new();
            while reader.read_line(&mut rest).await.unwrap_or(0) > 0 {}
        });

        let config = Config {
            first_line_timeout: Duration::from_millis(1000),
            next_line_timeout: Duration::from_millis(100),
            ..test_config()
        };
        let endpoint = Endpoint::new("127.0.0.1", i64::from(port));
        let mut session = Session::open(&endpoint, &config, None).await.unwrap();

        let lines = session.exec("status").await.unwrap();
        assert_eq!(lines, ["volume: 10", "state: play"]);

        let err = session.exec("currentsong").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(session.state(), State::Failed);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_server_fails_ping() {
        let (endpoint, server) = fake_server(GREETING, vec![("ping", None)]).await;

        let mut session = Session::open(&endpoint, &test_config(), None)
            .await
            .unwrap();
        assert!(!session.ping(3).await);
        assert!(!session.is_open());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn probe_uses_its_own_connection() {
        let (endpoint, server) = fake_server(GREETING, vec![("ping", Some("OK\n"))]).await;

        let greeting = Session::probe(&endpoint, &test_config(), None)
            .await
            .unwrap();
        assert_eq!(greeting.version, "0.23.5");
        server.await.unwrap();
    }
}
