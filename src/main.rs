//! ovpnadmin - console control center

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use ovpnadmin_lib::config::{ConfigStorage, StorageError};
use ovpnadmin_lib::console::{ConsoleCommand, ConsolePrompt, ConsoleView, HELP};
use ovpnadmin_lib::control::{AppContext, ControlCenter};
use ovpnadmin_lib::ssh::SshError;

/// Operate the OpenVPN management wrapper on a remote server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Servers file (default: ~/.ovpnadmin/servers.json)
    #[arg(long, env = "OVPNADMIN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured servers
    List,
    /// Open a control session to a configured server
    Connect {
        /// Server name as stored in the servers file
        server: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Connection failed: {0}")]
    Ssh(#[from] SshError),

    #[error("Console input failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    ovpnadmin_lib::init_logging();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let storage = match args.config {
        Some(path) => ConfigStorage::with_path(path),
        None => ConfigStorage::new()?,
    };

    match args.command {
        Commands::List => {
            let file = storage.load().await?;
            if file.servers.is_empty() {
                println!("no servers in {}", storage.path().display());
            }
            for server in &file.servers {
                println!(
                    "{:<16} {}@{}:{}",
                    server.name, server.username, server.host, server.port
                );
            }
            Ok(())
        }
        Commands::Connect { server } => {
            let record = storage.find(&server).await?;
            session(record).await
        }
    }
}

async fn session(record: ovpnadmin_lib::ssh::ServerRecord) -> Result<(), AppError> {
    let ctx = Arc::new(AppContext::ssh());
    let prompt = Arc::new(ConsolePrompt::default());

    println!("connecting to {}@{}:{} ...", record.username, record.host, record.port);
    let (handle, mut task) =
        ControlCenter::open(record, ctx, Arc::new(ConsoleView), prompt.clone()).await?;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            _ = &mut task => break,
            line = lines.next_line(), if input_open => match line? {
                Some(line) => {
                    if prompt.answer(&line) {
                        continue;
                    }
                    match ConsoleCommand::parse(&line) {
                        Some(command) => command.apply(&handle).await,
                        None if line.trim().is_empty() => {}
                        None => println!("unknown command, type 'help'"),
                    }
                }
                None => {
                    // stdin closed; shut the session down and wait for the tab
                    input_open = false;
                    prompt.answer("n");
                    handle.close_all().await;
                }
            },
        }
    }

    Ok(())
}
