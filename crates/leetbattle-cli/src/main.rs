// Leet Battle console client entry point.
//
// Startup sequence:
// 1. Parse command-line flags
// 2. Initialize tracing (log to file, stdout belongs to the console)
// 3. Load config and apply overrides
// 4. Start the match client
// 5. Run the console loop until `quit`, Ctrl+C or end of input
// 6. Shut the client down

mod console;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use leetbattle_core::config::{self, ClientConfig, ConfigOverrides};
use leetbattle_core::{ClientState, MatchClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use console::ConsoleCommand;

#[derive(Parser, Debug)]
#[command(name = "leetbattle", about = "Console client for Leet Battle matches")]
struct Args {
    /// Path to client.toml (otherwise $LEETBATTLE_CONFIG, ./config/client.toml
    /// or the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Match server WebSocket URL, e.g. ws://127.0.0.1:4000/ws
    #[arg(long, env = "LEETBATTLE_SERVER_URL")]
    server: Option<String>,

    /// Display name used by `join` without an argument
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing()?;
    info!("Leet Battle client starting up");

    let config = load(&args).context("failed to load configuration")?;
    info!(
        "Config loaded: server={}, player={}, language={}",
        config.server.url, config.player.name, config.player.language
    );

    let (client, task) = MatchClient::start(&config);
    println!("connecting to {} (type `help` for commands)", config.server.url);

    if let Err(e) = run_console(&client, &config).await {
        error!("Console error: {}", e);
    }

    if client.shutdown().await.is_err() {
        info!("Match client already stopped");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;

    info!("Leet Battle client shut down cleanly");
    Ok(())
}

fn load(args: &Args) -> anyhow::Result<ClientConfig> {
    let config = config::load_config(args.config.as_deref(), &overrides(args))?;
    Ok(config)
}

fn overrides(args: &Args) -> ConfigOverrides {
    ConfigOverrides {
        server_url: args.server.clone(),
        player_name: args.name.clone(),
    }
}

/// Read commands from stdin and print state changes until the user quits.
async fn run_console(client: &MatchClient, config: &ClientConfig) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state_rx = client.subscribe();
    let mut shown: ClientState = state_rx.borrow_and_update().clone();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("stdin closed");
                    return Ok(());
                };
                match console::parse_command(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => return Ok(()),
                    Ok(Some(cmd)) => {
                        if let Err(e) = execute(client, config, cmd).await {
                            println!("{e:#}");
                        }
                    }
                    Ok(None) => {}
                    Err(msg) => println!("{msg}"),
                }
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    println!("match client stopped");
                    return Ok(());
                }
                let next = state_rx.borrow_and_update().clone();
                for line in console::describe_changes(&shown, &next) {
                    println!("{line}");
                }
                shown = next;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                return Ok(());
            }
        }
    }
}

async fn execute(
    client: &MatchClient,
    config: &ClientConfig,
    cmd: ConsoleCommand,
) -> anyhow::Result<()> {
    let state = client.snapshot();
    match cmd {
        ConsoleCommand::Join(name) => {
            if !state.can_join_queue() {
                println!("cannot join the queue right now ({})", state.phase().as_str());
            }
            client.join_queue(name.unwrap_or_else(|| config.player.name.clone()))?;
        }
        ConsoleCommand::Submit(path) => {
            if !state.can_submit() {
                println!("no live match to submit to");
            }
            let code = match path {
                Some(path) => Some(read_source(&path).await?),
                None => None,
            };
            client.submit(code)?;
        }
        ConsoleCommand::Edit(path) => {
            let code = read_source(&path).await?;
            println!("loaded {} lines from {}", code.lines().count(), path.display());
            client.edit_code(code)?;
        }
        ConsoleCommand::Rematch => {
            if !state.can_request_rematch() {
                println!("no rematch vote available");
            }
            client.request_rematch()?;
        }
        ConsoleCommand::Lobby => client.return_to_lobby()?,
        ConsoleCommand::Status => {
            for line in console::status_lines(&state) {
                println!("{line}");
            }
        }
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

async fn read_source(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Initialize tracing to log to a file (not the terminal, which is used by
/// the console).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("leetbattle.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("leetbattle=info,leetbattle_core=info,warn")
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
