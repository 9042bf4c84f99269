//! Typed command facade.
//!
//! [`Client`] offers one method per supported server command. Each method
//! builds the command line, runs it on the current [`Session`] and shapes
//! the response body into the structure the caller needs.
//!
//! Every failure is returned as an [`struct@Error`] and its message is also
//! kept in [`Client::last_error`], which is what a status bar or dialog
//! shows. For rejected commands that is exactly the server's own message.
//!
//! # Example
//!
//! ```rust
//! use skympc::{client::Client, config::Config, endpoint::Endpoint};
//!
//! let mut client = Client::new(Config::default());
//! if client.open(&Endpoint::parse("localhost:6600")).await {
//!     client.play(None).await?;
//!     let status = client.status().await?;
//!     println!("state: {}", status.get("state"));
//! } else {
//!     eprintln!("{}", client.last_error());
//! }
//! ```

use std::fmt;

use crate::{
    config::Config,
    endpoint::Endpoint,
    error::{Error, Result},
    protocol::{
        is_valid_playlist_name,
        response::{self, KeyValue, Record, StringMap},
        Command,
    },
    session::Session,
};

/// Playback options that are toggled on and off.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    /// Restart the queue when it ends.
    Repeat,
    /// Stop after the current song, or repeat it with [`Mode::Repeat`].
    Single,
    /// Remove songs from the queue once played.
    Consume,
    /// Play the queue in random order.
    Random,
}

impl Mode {
    fn command(self) -> &'static str {
        match self {
            Mode::Repeat => "repeat",
            Mode::Single => "single",
            Mode::Consume => "consume",
            Mode::Random => "random",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.command())
    }
}

#[derive(Debug, Default)]
pub struct Client {
    config: Config,
    session: Option<Session>,
    last_error: String,
}

impl Client {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
            last_error: String::new(),
        }
    }

    /// Connects to `endpoint`, replacing any current session.
    ///
    /// Returns `false` when the server is unreachable, is not a music
    /// server, rejects the password or does not answer the liveness probe.
    /// The reason is available from [`last_error`](Self::last_error).
    pub async fn open(&mut self, endpoint: &Endpoint) -> bool {
        self.close().await;
        self.last_error.clear();

        match Session::connect(endpoint, &self.config).await {
            Ok(session) => {
                self.session = Some(session);
                true
            }
            Err(e) => {
                warn!("could not open {endpoint}: {e}");
                self.last_error = e.to_string();
                false
            }
        }
    }

    /// Closes the current session, if any.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_open)
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Message of the most recent failure, empty after a success.
    #[must_use]
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            self.last_error = e.to_string();
        }
        result
    }

    async fn exec(&mut self, command: &Command) -> Result<Vec<String>> {
        let Some(session) = self.session.as_mut() else {
            return self.check(Err(Error::not_connected("no server connection")));
        };

        let result = session.exec(command.as_str()).await;
        match result {
            Ok(_) => self.last_error.clear(),
            Err(_) => self.last_error = session.last_error().to_owned(),
        }
        result
    }

    async fn run(&mut self, command: &Command) -> Result<()> {
        self.exec(command).await.map(drop)
    }

    async fn records(&mut self, name: &str, path: &str) -> Result<Vec<Record>> {
        let command = self.check(Command::new(name).quoted_opt(path))?;
        let lines = self.exec(&command).await?;
        Ok(response::parse_records(&lines))
    }

    fn require(&mut self, what: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return self.check(Err(Error::invalid_argument(format!("{what} is empty"))));
        }
        Ok(())
    }

    fn require_playlist_name(&mut self, name: &str) -> Result<()> {
        if !is_valid_playlist_name(name) {
            return self.check(Err(Error::invalid_argument(format!(
                "\"{}\" is not a valid playlist name",
                name.escape_debug()
            ))));
        }
        Ok(())
    }

    /// Sends the no-op command up to `retries` times.
    pub async fn ping(&mut self, retries: usize) -> bool {
        match self.session.as_mut() {
            Some(session) => session.ping(retries).await,
            None => false,
        }
    }

    /// Lists the direct children of `path`; an empty path is the library
    /// root.
    pub async fn list_directory(&mut self, path: &str) -> Result<Vec<Record>> {
        self.records("lsinfo", path).await
    }

    /// Lists every entry below `path`, without metadata.
    pub async fn list_all(&mut self, path: &str) -> Result<Vec<Record>> {
        self.records("listall", path).await
    }

    /// Lists files and directories below `path` on the server's storage,
    /// including those not in the database.
    pub async fn list_files(&mut self, path: &str) -> Result<Vec<Record>> {
        self.records("listfiles", path).await
    }

    /// Lists every entry below `path`, with metadata.
    pub async fn list_all_recursive(&mut self, path: &str) -> Result<Vec<Record>> {
        self.records("listallinfo", path).await
    }

    /// Like [`list_all_recursive`](Self::list_all_recursive), but as one flat
    /// sequence of fields.
    pub async fn list_all_recursive_flat(&mut self, path: &str) -> Result<Vec<KeyValue>> {
        let command = self.check(Command::new("listallinfo").quoted_opt(path))?;
        let lines = self.exec(&command).await?;
        Ok(response::parse_pairs(&lines))
    }

    /// Returns the play queue with metadata.
    ///
    /// Servers that predate song ids omit the `Id` field; each file entry
    /// then gets its zero-based position among file entries as `Id`.
    pub async fn queue_info(&mut self, path: &str) -> Result<Vec<Record>> {
        let mut records = self.records("playlistinfo", path).await?;
        synthesize_ids(&mut records);
        Ok(records)
    }

    /// Returns the paths in the play queue, in queue order.
    pub async fn queue_paths(&mut self) -> Result<Vec<String>> {
        let lines = self.exec(&Command::new("playlist")).await?;

        // Lines read `<pos>:file: <path>`.
        Ok(response::parse_pairs(&lines)
            .into_iter()
            .map(|KeyValue { value, .. }| match value.split_once(':') {
                Some((_, path)) => path.trim().to_owned(),
                None => value,
            })
            .collect())
    }

    /// Returns the number of entries in the play queue.
    pub async fn queue_len(&mut self) -> Result<usize> {
        self.exec(&Command::new("playlist"))
            .await
            .map(|lines| lines.len())
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.run(&Command::new("clear")).await
    }

    /// Appends `path` to the play queue.
    pub async fn enqueue(&mut self, path: &str) -> Result<()> {
        self.require("path", path)?;
        let command = self.check(Command::new("add").quoted(path))?;
        self.run(&command).await
    }

    /// Inserts `path` into the play queue and returns the new entry's id.
    ///
    /// `None` lets the server choose the position, which appends.
    pub async fn enqueue_at(&mut self, path: &str, position: Option<u32>) -> Result<u32> {
        self.require("path", path)?;
        let mut command = self.check(Command::new("addid").quoted(path))?;
        if let Some(position) = position {
            command = command.arg(position);
        }

        let lines = self.exec(&command).await?;
        let map = response::parse_map(&lines);
        let id = map.get("Id");
        let id = if id.is_empty() {
            Err(Error::protocol("server did not return an id"))
        } else {
            id.parse::<u32>().map_err(Into::into)
        };
        if id.is_err() {
            // Protocol errors are fatal.
            self.close().await;
        }
        self.check(id)
    }

    /// Removes the queue entry with the given id.
    pub async fn dequeue_by_id(&mut self, id: u32) -> Result<()> {
        self.run(&Command::new("delete").arg(id)).await
    }

    /// Moves the queue entry at position `from` to position `to`.
    pub async fn move_entry(&mut self, from: u32, to: u32) -> Result<()> {
        self.run(&Command::new("move").arg(from).arg(to)).await
    }

    /// Swaps the queue entries at positions `a` and `b`.
    pub async fn swap(&mut self, a: u32, b: u32) -> Result<()> {
        self.run(&Command::new("swap").arg(a).arg(b)).await
    }

    /// Starts playback at queue position `index`, or resumes when `None`.
    pub async fn play(&mut self, index: Option<u32>) -> Result<()> {
        let mut command = Command::new("play");
        if let Some(index) = index {
            command = command.arg(index);
        }
        self.run(&command).await
    }

    pub async fn pause(&mut self, pause: bool) -> Result<()> {
        self.run(&Command::new("pause").flag(pause)).await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.run(&Command::new("stop")).await
    }

    pub async fn next(&mut self) -> Result<()> {
        self.run(&Command::new("next")).await
    }

    pub async fn previous(&mut self) -> Result<()> {
        self.run(&Command::new("previous")).await
    }

    pub async fn set_mode(&mut self, mode: Mode, enabled: bool) -> Result<()> {
        self.run(&Command::new(mode.command()).flag(enabled)).await
    }

    /// Sets the volume in percent.
    pub async fn set_volume(&mut self, volume: u8) -> Result<()> {
        if volume > 100 {
            return self.check(Err(Error::invalid_argument(format!(
                "volume {volume} is not between 0 and 100"
            ))));
        }
        self.run(&Command::new("setvol").arg(volume)).await
    }

    /// Seeks to `position` seconds into the song at queue position `song`.
    pub async fn seek(&mut self, song: u32, position: u32) -> Result<()> {
        self.run(&Command::new("seek").arg(song).arg(position))
            .await
    }

    /// Saves the play queue as stored playlist `name`.
    pub async fn save(&mut self, name: &str) -> Result<()> {
        self.require_playlist_name(name)?;
        let command = self.check(Command::new("save").quoted(name))?;
        self.run(&command).await
    }

    /// Appends stored playlist `name` to the play queue.
    ///
    /// `range` selects part of the playlist, as `start:end`; an empty range
    /// loads all of it.
    pub async fn load(&mut self, name: &str, range: &str) -> Result<()> {
        self.require("playlist name", name)?;
        if !range.chars().all(|c| c.is_ascii_digit() || c == ':') {
            return self.check(Err(Error::invalid_argument(format!(
                "\"{}\" is not a range",
                range.escape_debug()
            ))));
        }

        let mut command = self.check(Command::new("load").quoted(name))?;
        if !range.is_empty() {
            command = command.arg(range);
        }
        self.run(&command).await
    }

    /// Returns the songs of stored playlist `name`, with metadata.
    pub async fn list_named_playlist(&mut self, name: &str) -> Result<Vec<Record>> {
        self.require("playlist name", name)?;
        self.records("listplaylistinfo", name).await
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.require("playlist name", from)?;
        self.require_playlist_name(to)?;
        let command = self.check(Command::new("rename").quoted(from).and_then(|c| c.quoted(to)))?;
        self.run(&command).await
    }

    /// Deletes stored playlist `name`.
    pub async fn remove(&mut self, name: &str) -> Result<()> {
        self.require("playlist name", name)?;
        let command = self.check(Command::new("rm").quoted(name))?;
        self.run(&command).await
    }

    /// Asks the server to rescan its music library.
    pub async fn rescan_library(&mut self) -> Result<()> {
        self.run(&Command::new("update")).await
    }

    pub async fn status(&mut self) -> Result<StringMap> {
        let lines = self.exec(&Command::new("status")).await?;
        Ok(response::parse_map(&lines))
    }

    pub async fn current_song(&mut self) -> Result<StringMap> {
        let lines = self.exec(&Command::new("currentsong")).await?;
        Ok(response::parse_map(&lines))
    }

    /// Returns the volume in percent, derived from [`status`](Self::status).
    ///
    /// `None` when the server has no mixer and reports `-1`, or reports no
    /// volume at all.
    pub async fn volume(&mut self) -> Result<Option<u8>> {
        let status = self.status().await?;
        let volume = status.get("volume");
        if volume.is_empty() {
            return Ok(None);
        }

        let volume = self.check(volume.parse::<i32>().map_err(Error::from))?;
        Ok(u8::try_from(volume).ok().filter(|v| *v <= 100))
    }
}

/// Numbers file entries lacking an `Id` by their position among file
/// entries.
fn synthesize_ids(records: &mut [Record]) {
    for (position, record) in records.iter_mut().filter(|r| r.is_file()).enumerate() {
        if !record.attributes.contains_key("Id") {
            record.attributes.insert("Id", position.to_string());
        }
    }
}
