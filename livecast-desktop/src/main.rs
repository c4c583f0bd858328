//! Livecast: broadcast a file to a live collaboration room.
//!
//! Edit the shared file with any editor; every write is picked up and pushed
//! to the hub. Commands are read from stdin (`help` lists them).
//!
//! ```bash
//! livecast notes.md --settings livecast.json --start
//! RUST_LOG=livecast_collab=debug livecast src/main.rs
//! ```

mod commands;
mod host;
mod status;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

use livecast_collab::{BroadcastSettings, Broadcaster, ConnectionConfig, WsConnector};

use commands::{Command, HELP};
use host::FileEditor;
use status::{status_line, TerminalStatus};

/// Livecast broadcaster
#[derive(Parser, Debug)]
#[command(name = "livecast")]
#[command(about = "Broadcast a file to a live collaboration room")]
struct Args {
    /// File to broadcast
    file: Option<PathBuf>,

    /// Settings file (JSON, keys: url, hubName, userName, userToken, roomName, roomToken)
    #[arg(short, long, env = "LIVECAST_SETTINGS")]
    settings: Option<PathBuf>,

    /// Start broadcasting right away
    #[arg(long)]
    start: bool,

    /// How often the file is checked for changes, in milliseconds
    #[arg(long, default_value = "250")]
    poll_ms: u64,
}

/// Read settings, then apply `LIVECAST_*` overrides.
fn load_config(path: Option<&Path>) -> anyhow::Result<ConnectionConfig> {
    let settings = match path {
        Some(path) => BroadcastSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => BroadcastSettings::default(),
    };
    Ok(settings.with_env().into_config()?)
}

fn start(broadcaster: &mut Broadcaster<FileEditor>, settings: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(settings)?;
    broadcaster.start(config)?;
    Ok(())
}

fn restart(broadcaster: &mut Broadcaster<FileEditor>, settings: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(settings)?;
    broadcaster.restart(config)?;
    Ok(())
}

fn run(broadcaster: &mut Broadcaster<FileEditor>, command: Command, settings: Option<&Path>) {
    let result = match command {
        Command::Start => start(broadcaster, settings),
        Command::Restart => restart(broadcaster, settings),
        Command::Stop => {
            broadcaster.stop();
            Ok(())
        }
        Command::Refresh => {
            broadcaster.refresh();
            Ok(())
        }
        Command::Open(path) => match broadcaster.host_mut().open(&path) {
            Ok(event) => {
                broadcaster.handle_editor_event(event);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!("opening {}", path.display()))),
        },
        Command::Close => {
            let event = broadcaster.host_mut().close();
            broadcaster.handle_editor_event(event);
            Ok(())
        }
        Command::Status => {
            println!("{}", status_line(broadcaster.phase()));
            if let Some(session) = broadcaster.session_id() {
                println!("  session: {session}");
            }
            match broadcaster.host().path() {
                Some(path) => println!("  file:    {}", path.display()),
                None => println!("  file:    <none>"),
            }
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting Livecast...");

    let (connector, mut hub_events) = WsConnector::channel();
    let mut broadcaster =
        Broadcaster::new(Box::new(connector), Box::new(TerminalStatus), FileEditor::new());

    if let Some(path) = args.file.clone() {
        run(&mut broadcaster, Command::Open(path), None);
    }
    println!("{}", status_line(broadcaster.phase()));
    if args.start {
        run(&mut broadcaster, Command::Start, args.settings.as_deref());
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(Duration::from_millis(args.poll_ms.max(10)));

    loop {
        tokio::select! {
            Some(event) = hub_events.recv() => broadcaster.handle_hub_event(event),
            _ = poll.tick() => match broadcaster.host_mut().poll() {
                Ok(events) => {
                    for event in events {
                        broadcaster.handle_editor_event(event);
                    }
                }
                Err(e) => log::warn!("Cannot read shared file: {e}"),
            },
            line = stdin.next_line() => match line? {
                None => break,
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => run(&mut broadcaster, command, args.settings.as_deref()),
                    Err(e) => eprintln!("{e}"),
                },
            },
        }
    }

    broadcaster.stop();
    // Let the transport flush the session removal.
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Livecast stopped");
    Ok(())
}
