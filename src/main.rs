use std::{error::Error, process};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, LevelFilter};
use serde::Serialize;
use veil::Redact;

use skympc::{
    client::{Client, Mode},
    config::Config,
    endpoint::Endpoint,
    listing,
    protocol::response::Record,
    session::Session,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Redact, Clone, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server to connect to
    ///
    /// Either `host` or `host:port`.
    #[arg(long, env = "MPD_HOST", value_hint = ValueHint::Hostname, default_value_t = String::from("localhost"))]
    host: String,

    /// Server port
    ///
    /// Overrides a port given with `--host`.
    ///
    /// [default: 6600]
    #[arg(short, long, env = "MPD_PORT")]
    port: Option<u16>,

    /// Server password
    #[redact]
    #[arg(long, env = "MPD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging, which shows every protocol line.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Cmd {
    /// Test the connection on its own session and show the conversation
    Test,
    /// Show player status
    Status,
    /// Show the current song
    Current,
    /// List a library directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// List everything below a library directory
    Listall {
        #[arg(default_value = "")]
        path: String,
    },
    /// Show the play queue
    Queue,
    /// Append a file or directory to the queue
    Add { path: String },
    /// Insert a file into the queue and print its id
    Insert { path: String, position: Option<u32> },
    /// Remove a queue entry by id
    Delete { id: u32 },
    /// Move a queue entry
    Move { from: u32, to: u32 },
    /// Swap two queue entries
    Swap { a: u32, b: u32 },
    /// Clear the queue
    Clear,
    /// Start playback, optionally at a queue position
    Play { index: Option<u32> },
    /// Pause playback
    Pause,
    /// Resume playback
    Resume,
    /// Stop playback
    Stop,
    /// Play the next song
    Next,
    /// Play the previous song
    Prev,
    /// Toggle repeat mode
    Repeat { state: Switch },
    /// Toggle single mode
    Single { state: Switch },
    /// Toggle consume mode
    Consume { state: Switch },
    /// Toggle random mode
    Random { state: Switch },
    /// Show or set the volume
    Volume { volume: Option<u8> },
    /// Seek within a queued song
    Seek { song: u32, seconds: u32 },
    /// Save the queue as a stored playlist
    Save { name: String },
    /// Load a stored playlist into the queue
    Load {
        name: String,
        #[arg(default_value = "")]
        range: String,
    },
    /// Show the songs of a stored playlist
    Playlist { name: String },
    /// Rename a stored playlist
    Rename { from: String, to: String },
    /// Delete a stored playlist
    Rm { name: String },
    /// Rescan the music library
    Update,
    /// Report duplicate entries in the queue
    Dupes,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        switch == Switch::On
    }
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "warn"),
    );

    if let Some(level) = log_level(config.quiet, config.verbose) {
        // Filter log messages of external crates.
        logger.filter_module("skympc", level);
    }

    logger.init();
}

/// Level selected by `-q` or `-v`, if any.
fn log_level(quiet: bool, verbose: u8) -> Option<LevelFilter> {
    if !quiet && verbose == 0 {
        return None;
    }

    let level = match verbose {
        // `verbose` and `quiet` are mutually exclusive, so this arm is
        // quiet mode.
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Some(level)
}

/// Prints `value` as JSON, or as the text `text` renders for it.
fn output<T: Serialize>(
    json: bool,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let text = text(value);
        if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(())
}

fn records_text(records: &[Record]) -> String {
    records
        .iter()
        .map(|record| {
            let time = listing::time_text(record);
            let title = record.get("Title");
            match (title.is_empty(), time.is_empty()) {
                (true, true) => format!("{}: {}", record.kind, record.primary),
                (true, false) => format!("{}: {} ({time})", record.kind, record.primary),
                (false, true) => format!("{}: {} - {title}", record.kind, record.primary),
                (false, false) => {
                    format!("{}: {} - {title} ({time})", record.kind, record.primary)
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn map_text(map: &skympc::protocol::response::StringMap) -> String {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs one command against the server.
///
/// # Errors
///
/// Returns an error when the server cannot be reached or rejects the
/// command.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config::default();

    let mut endpoint = Endpoint::parse(&args.host);
    if let Some(port) = args.port {
        endpoint = endpoint.with_port(i64::from(port));
    }
    if let Some(password) = args.password {
        endpoint = endpoint.with_password(password);
    }

    if args.command == Cmd::Test {
        let mut transcript = String::new();
        let result = Session::probe(&endpoint, &config, Some(&mut transcript)).await;
        print!("{transcript}");
        let greeting = result?;
        println!("Connection OK ({greeting})");
        return Ok(());
    }

    let mut client = Client::new(config);
    if !client.open(&endpoint).await {
        return Err(client.last_error().into());
    }
    info!("connected to {endpoint}");

    let json = args.json;
    let result = match args.command {
        Cmd::Test => unreachable!("handled above"),
        Cmd::Status => {
            let status = client.status().await?;
            output(json, &status, map_text)
        }
        Cmd::Current => {
            let song = client.current_song().await?;
            output(json, &song, map_text)
        }
        Cmd::Ls { path } => {
            let mut records = client.list_directory(&path).await?;
            listing::sort(&mut records);
            output(json, &records, |records| records_text(records))
        }
        Cmd::Listall { path } => {
            let mut records = client.list_all(&path).await?;
            listing::sort(&mut records);
            output(json, &records, |records| records_text(records))
        }
        Cmd::Queue => {
            let queue = client.queue_info("").await?;
            output(json, &queue, |queue| {
                queue
                    .iter()
                    .map(|record| format!("{:>4}  {}", record.get("Id"), record.primary))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Cmd::Add { path } => client.enqueue(&path).await.map_err(Into::into),
        Cmd::Insert { path, position } => {
            let id = client.enqueue_at(&path, position).await?;
            output(json, &id, ToString::to_string)
        }
        Cmd::Delete { id } => client.dequeue_by_id(id).await.map_err(Into::into),
        Cmd::Move { from, to } => client.move_entry(from, to).await.map_err(Into::into),
        Cmd::Swap { a, b } => client.swap(a, b).await.map_err(Into::into),
        Cmd::Clear => client.clear().await.map_err(Into::into),
        Cmd::Play { index } => client.play(index).await.map_err(Into::into),
        Cmd::Pause => client.pause(true).await.map_err(Into::into),
        Cmd::Resume => client.pause(false).await.map_err(Into::into),
        Cmd::Stop => client.stop().await.map_err(Into::into),
        Cmd::Next => client.next().await.map_err(Into::into),
        Cmd::Prev => client.previous().await.map_err(Into::into),
        Cmd::Repeat { state } => client
            .set_mode(Mode::Repeat, state.into())
            .await
            .map_err(Into::into),
        Cmd::Single { state } => client
            .set_mode(Mode::Single, state.into())
            .await
            .map_err(Into::into),
        Cmd::Consume { state } => client
            .set_mode(Mode::Consume, state.into())
            .await
            .map_err(Into::into),
        Cmd::Random { state } => client
            .set_mode(Mode::Random, state.into())
            .await
            .map_err(Into::into),
        Cmd::Volume {
            volume: Some(volume),
        } => client.set_volume(volume).await.map_err(Into::into),
        Cmd::Volume { volume: None } => {
            let volume = client.volume().await?;
            output(json, &volume, |volume| {
                volume.map_or_else(|| String::from("n/a"), |v| format!("{v}%"))
            })
        }
        Cmd::Seek { song, seconds } => client.seek(song, seconds).await.map_err(Into::into),
        Cmd::Save { name } => client.save(&name).await.map_err(Into::into),
        Cmd::Load { name, range } => client.load(&name, &range).await.map_err(Into::into),
        Cmd::Playlist { name } => {
            let songs = client.list_named_playlist(&name).await?;
            output(json, &songs, |songs| records_text(songs))
        }
        Cmd::Rename { from, to } => client.rename(&from, &to).await.map_err(Into::into),
        Cmd::Rm { name } => client.remove(&name).await.map_err(Into::into),
        Cmd::Update => client.rescan_library().await.map_err(Into::into),
        Cmd::Dupes => {
            let queue = client.queue_info("").await?;
            let duplicates: Vec<&Record> = listing::detect_duplicates(&queue)
                .into_iter()
                .map(|i| &queue[i])
                .collect();
            output(json, &duplicates, |duplicates| {
                if duplicates.is_empty() {
                    String::from("no duplicate entries found")
                } else {
                    duplicates
                        .iter()
                        .map(|record| format!("{:>4}  {}", record.get("Id"), record.primary))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })
        }
    };

    client.close().await;
    result
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("{e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_keeps_warnings() {
        assert_eq!(log_level(false, 0), None);
        assert_eq!(log_level(true, 0), Some(LevelFilter::Warn));
        assert_eq!(log_level(false, 1), Some(LevelFilter::Debug));
        assert_eq!(log_level(false, 2), Some(LevelFilter::Trace));
    }
}
