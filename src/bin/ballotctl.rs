//! BallotCtl - Voter client for BallotBox servers
//!
//! Usage:
//!   ballotctl candidates --login L --password P          - Show the ballot
//!   ballotctl vote --login L --password P --voter-id N --candidate C

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ballotbox::config::BallotConfig;
use ballotbox::network::{VoteClient, VoteOutcome};

/// BallotBox Voter Client
#[derive(Parser)]
#[command(name = "ballotctl")]
#[command(about = "Cast a vote on a BallotBox server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ballotbox.toml")]
    config: PathBuf,

    /// Server address (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 10000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and print the candidates without voting
    Candidates {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
    /// Authenticate and cast a vote (candidate 0 or an unknown id is blank)
    Vote {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        voter_id: i64,
        #[arg(long)]
        candidate: i64,
    },
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let address = cli.server.clone().unwrap_or_else(|| server_from_config(&cli.config));
    let result = match &cli.command {
        Commands::Candidates { login, password } => {
            show_candidates(&cli, &address, login, password).await
        }
        Commands::Vote {
            login,
            password,
            voter_id,
            candidate,
        } => vote(&cli, &address, login, password, *voter_id, *candidate).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Derive a connectable address from the server's bind address
fn server_from_config(path: &Path) -> String {
    let bind = BallotConfig::from_file(path)
        .map(|config| config.server.bind_address)
        .unwrap_or_else(|_| "127.0.0.1:8888".to_string());

    if let Some(port) = bind.strip_prefix("0.0.0.0:") {
        return format!("127.0.0.1:{}", port);
    }
    bind
}

async fn connect(cli: &Cli, address: &str) -> anyhow::Result<VoteClient> {
    VoteClient::connect(
        address,
        Duration::from_millis(cli.connect_timeout_ms),
        Duration::from_millis(cli.timeout_ms),
    )
    .await
    .with_context(|| format!("cannot reach vote server at {}", address))
}

// ============ Commands ============

async fn show_candidates(
    cli: &Cli,
    address: &str,
    login: &str,
    password: &str,
) -> anyhow::Result<()> {
    let mut client = connect(cli, address).await?;

    if !client.authenticate(login, password).await? {
        anyhow::bail!("authentication refused for {}", login);
    }

    for entry in client.candidates().await? {
        println!("[{}] {}", entry.id, entry.name);
    }
    Ok(())
}

async fn vote(
    cli: &Cli,
    address: &str,
    login: &str,
    password: &str,
    voter_id: i64,
    candidate: i64,
) -> anyhow::Result<()> {
    let client = connect(cli, address).await?;

    match client.cast(login, password, voter_id, candidate).await? {
        VoteOutcome::Accepted => {
            println!("\x1b[1;32m✓\x1b[0m Vote recorded");
            Ok(())
        }
        VoteOutcome::AuthRejected => anyhow::bail!("authentication refused for {}", login),
        VoteOutcome::Refused => anyhow::bail!("vote refused by the server"),
    }
}
