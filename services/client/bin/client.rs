//! Main Entrypoint for the Caatuu tutor client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Initializing logging.
//! 3. Wiring the transport, offline simulator, connection manager and session.
//! 4. Running the terminal REPL until the user quits or presses Ctrl+C.

use anyhow::Context;
use caatuu_client::{
    audio_utils::load_audio_clip,
    config::Config,
    repl::{self, HELP, ReplAction},
    simulator::OfflineSimulator,
    ws::{Command, ConnectionManager, Session, UiEvent, WsTransport},
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Terminal client for the Caatuu Chinese tutor")]
struct Cli {
    /// Origin of the tutor web app; overrides CAATUU_ORIGIN.
    #[arg(long)]
    origin: Option<String>,
    /// Difficulty used when `new` is given none; overrides DEFAULT_DIFFICULTY.
    #[arg(long)]
    difficulty: Option<String>,
    /// Start without connecting; every request is answered locally.
    #[arg(long)]
    offline: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(origin) = &cli.origin {
        config = config
            .with_origin(origin)
            .context("Invalid --origin")?;
    }
    if let Some(difficulty) = cli.difficulty {
        config.default_difficulty = difficulty;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(url = %config.ws_url, offline = cli.offline, "Configuration loaded");

    // --- 3. Wire the Session ---
    let simulator = OfflineSimulator::new(&config);
    let (manager, channels) =
        ConnectionManager::new(&config, Box::new(WsTransport::new()), simulator);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();
    let session = Session::new(manager, config.default_difficulty.clone(), ui_tx);
    let session_handle = tokio::spawn(session.run(command_rx, channels));

    let printer = tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            println!("{}", repl::render(&event));
        }
    });

    let start = if cli.offline {
        Command::Network { online: false }
    } else {
        Command::Connect
    };
    command_tx.send(start).context("Session stopped before start")?;

    // --- 4. Run the REPL ---
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C. Shutting down...");
                None
            }
        };
        let Some(line) = line else { break };

        let action = match repl::parse_line(&line) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        let command = match action {
            ReplAction::Send(command) => command,
            ReplAction::Speak(path) => match load_audio_clip(&path).await {
                Ok(clip) => Command::SpeechToText {
                    audio_base64: clip.base64,
                    mime: clip.mime,
                },
                Err(e) => {
                    warn!(error = %e, "Speech input unavailable");
                    println!("{}", repl::render(&UiEvent::Warning(e.to_string())));
                    continue;
                }
            },
            ReplAction::Help => {
                println!("{HELP}");
                continue;
            }
            ReplAction::Quit => break,
        };
        if command_tx.send(command).is_err() {
            warn!("Session has stopped");
            break;
        }
    }

    // --- 5. Shut Down ---
    let _ = command_tx.send(Command::Shutdown);
    session_handle
        .await
        .context("Session task panicked")?
        .context("Session failed")?;
    printer.abort();
    info!("Client has shut down.");
    Ok(())
}
