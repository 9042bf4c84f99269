//! Line-oriented TCP transport.
//!
//! A [`Transport`] owns exactly one TCP connection, split into a buffered
//! read half and a write half. Every read carries its own deadline so the
//! caller decides how patient to be: long for a greeting or the first line
//! of a response, short for the lines that follow.

use std::{future::Future, io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};

use crate::error::{Error, Result};

/// Longest line accepted from the server. Guards against a peer that never
/// sends a newline.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Awaits a connection attempt. An attempt that is refused or outlives
/// `connect_timeout` is a connection failure, not a read timeout.
async fn establish<T>(
    attempt: impl Future<Output = io::Result<T>>,
    connect_timeout: Duration,
    target: &str,
) -> Result<T> {
    match timeout(connect_timeout, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::connection(format!("cannot connect to {target}: {e}"))),
        Err(_) => Err(Error::connection(format!(
            "connecting to {target} took longer than {connect_timeout:?}"
        ))),
    }
}

#[derive(Debug)]
pub struct Transport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl Transport {
    /// Connects to `address:port` within `connect_timeout`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Connection`](crate::error::ErrorKind::Connection) when
    /// the host cannot be resolved, refuses the connection or does not
    /// accept it in time.
    pub async fn connect(address: &str, port: u16, connect_timeout: Duration) -> Result<Self> {
        let stream = establish(
            TcpStream::connect((address, port)),
            connect_timeout,
            &format!("{address}:{port}"),
        )
        .await?;

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!("connected to {peer}");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            peer,
        })
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Reads one line, without its trailing newline.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::Timeout`](crate::error::ErrorKind::Timeout) when no
    ///   complete line arrives within `deadline`
    /// * [`ErrorKind::Connection`](crate::error::ErrorKind::Connection) when
    ///   the peer closed the connection or the line is too long
    pub async fn read_line(&mut self, deadline: Duration) -> Result<String> {
        let mut buf = Vec::new();
        let read = timeout(deadline, self.read_until_newline(&mut buf))
            .await
            .map_err(|_| Error::timeout(format!("no line received within {deadline:?}")))??;

        if read == 0 {
            return Err(Error::connection("connection closed by server"));
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!("<- {line}");
        Ok(line)
    }

    async fn read_until_newline(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut total = 0;
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                // A partial line followed by EOF is as good as no line.
                return Ok(0);
            }

            let (done, used) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            };
            buf.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            total += used;

            if done {
                return Ok(total);
            }
            if total > MAX_LINE_LENGTH {
                return Err(Error::connection(format!(
                    "line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }
        }
    }

    /// Writes `text` followed by a single `\n`.
    ///
    /// No escaping is applied; callers build complete command lines.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Connection`](crate::error::ErrorKind::Connection)
    /// when the write fails.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        trace!("-> {}", redact_password(text));
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Drops bytes left over from an earlier, partially read exchange.
    ///
    /// Returns the number of bytes discarded. Never waits for new data.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Connection`](crate::error::ErrorKind::Connection)
    /// when the peer has closed the connection.
    pub fn discard_pending(&mut self) -> Result<usize> {
        let mut discarded = self.reader.buffer().len();
        self.reader.consume(discarded);

        let mut scratch = [0; 4096];
        loop {
            match self.reader.get_ref().try_read(&mut scratch) {
                Ok(0) => return Err(Error::connection("connection closed by server")),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        if discarded > 0 {
            warn!("discarded {discarded} stale bytes from {}", self.peer);
        }
        Ok(discarded)
    }

    /// Closes the connection gracefully.
    ///
    /// Sends the protocol's `close` command, gives it `linger` to leave, and
    /// shuts the socket down. Failures are logged, not returned: the
    /// connection is gone either way.
    pub async fn close(mut self, linger: Duration) {
        let farewell = async {
            self.writer.write_all(b"close\n").await?;
            self.writer.flush().await?;
            self.writer.shutdown().await
        };

        match timeout(linger, farewell).await {
            Ok(Ok(())) => debug!("closed connection to {}", self.peer),
            Ok(Err(e)) => debug!("error closing connection to {}: {e}", self.peer),
            Err(_) => debug!("closing connection to {} timed out", self.peer),
        }
    }
}

/// Hides the secret of a `password` command in log output.
fn redact_password(line: &str) -> &str {
    if line.starts_with("password ") {
        "password [REDACTED]"
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    const SHORT: Duration = Duration::from_millis(200);

    async fn pair() -> (Transport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (transport, accepted) = tokio::join!(
            Transport::connect("127.0.0.1", port, SHORT),
            listener.accept()
        );
        (transport.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn unanswered_connect_is_a_connection_error() {
        let attempt = std::future::pending::<io::Result<TcpStream>>();
        let err = establish(attempt, Duration::from_millis(20), "10.255.255.1:6600")
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Connection);
        assert!(err.to_string().contains("took longer"));
    }

    #[tokio::test]
    async fn refused_connect_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Transport::connect("127.0.0.1", port, SHORT).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Connection);
    }

    #[tokio::test]
    async fn reads_lines_without_newline() {
        let (mut transport, mut server) = pair().await;
        server.write_all(b"OK MPD 0.23.5\nvolume: 50\n").await.unwrap();

        assert_eq!(transport.read_line(SHORT).await.unwrap(), "OK MPD 0.23.5");
        assert_eq!(transport.read_line(SHORT).await.unwrap(), "volume: 50");
    }

    #[tokio::test]
    async fn read_times_out_on_partial_line() {
        let (mut transport, mut server) = pair().await;
        server.write_all(b"file: a.mp3").await.unwrap();

        let err = transport.read_line(SHORT).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn closed_peer_is_a_connection_error() {
        let (mut transport, server) = pair().await;
        drop(server);

        let err = transport.read_line(SHORT).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Connection);
    }

    #[tokio::test]
    async fn writes_one_newline_and_discards_stale_bytes() {
        let (mut transport, mut server) = pair().await;
        server.write_all(b"stale\nlines\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.discard_pending().unwrap(), 12);
        transport.write_line("status").await.unwrap();

        let mut buf = [0; 7];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"status\n");
    }

    #[tokio::test]
    async fn close_sends_farewell() {
        let (transport, mut server) = pair().await;
        transport.close(SHORT).await;

        let mut buf = String::new();
        server.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "close\n");
    }

    #[test]
    fn passwords_stay_out_of_logs() {
        assert_eq!(redact_password("password hunter2"), "password [REDACTED]");
        assert_eq!(redact_password("status"), "status");
    }
}
