//! BallotBox - Networked one-vote-per-voter election server
//!
//! Operator binary: runs the vote server and manages the roster, the
//! candidates and the credential ledger.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ballotbox::admin::{self, Operator, ServeLock};
use ballotbox::config::BallotConfig;
use ballotbox::console::{Console, ConsoleReply};
use ballotbox::credentials::{CredentialStore, Role};
use ballotbox::display;
use ballotbox::election::{snapshot, Election, VoterId};
use ballotbox::error::{Error, Result};
use ballotbox::network::VoteServer;
use ballotbox::persist::FileSink;

/// BallotBox - Networked one-vote-per-voter election server
#[derive(Parser)]
#[command(name = "ballotbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ballotbox.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Administrator login for roster and account commands
    #[arg(long, global = true)]
    admin: Option<String>,

    /// Administrator password
    #[arg(long, global = true)]
    admin_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the vote server with its operator console
    Serve,

    /// Initialize a new configuration file
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "ballotbox.toml")]
        output: PathBuf,
    },

    /// Create the first administrator account
    Bootstrap {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },

    /// Manage voters
    Voter {
        #[command(subcommand)]
        action: VoterCommand,
    },

    /// Manage candidates
    Candidate {
        #[command(subcommand)]
        action: CandidateCommand,
    },

    /// Open voting
    Open,

    /// Close voting
    Close,

    /// Print per-candidate results
    Results,

    /// Print turnout statistics
    Stats {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write the results CSV
    Export,

    /// Manage credential ledger accounts
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },

    /// Delete the election snapshot
    Reset,
}

#[derive(Subcommand)]
enum VoterCommand {
    /// Register a voter together with their login
    Add {
        #[arg(long)]
        id: VoterId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
    /// List registered voters
    List,
}

#[derive(Subcommand)]
enum CandidateCommand {
    /// Register a candidate
    Add {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
    },
    /// List candidates
    List,
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Create an account
    Add {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
        /// admin, votant, or any other role
        #[arg(long, default_value = "votant")]
        role: String,
    },
    /// Change a password, checking the old one
    Passwd(PasswdArgs),
    /// Set a new password without checking the old one
    Reset {
        #[arg(long)]
        login: String,
        #[arg(long)]
        new: String,
    },
    /// Re-enable an account
    Enable {
        #[arg(long)]
        login: String,
    },
    /// Disable an account
    Disable {
        #[arg(long)]
        login: String,
    },
    /// List accounts
    List,
}

#[derive(Args)]
struct PasswdArgs {
    #[arg(long)]
    login: String,
    #[arg(long)]
    old: String,
    #[arg(long)]
    new: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
        return run_init(output);
    }

    let config = load_config(&cli.config)?;
    init_logging(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        &config.logging.format,
    );

    let ctx = Context::open(config).await?;

    match &cli.command {
        Commands::Serve => run_serve(ctx).await,
        Commands::Bootstrap { login, password } => {
            ctx.operator.bootstrap(login, password).await?;
            println!("✓ Administrator {} created", login);
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
        command => {
            let (Some(login), Some(password)) = (cli.admin.as_deref(), cli.admin_password.as_deref())
            else {
                return Err(Error::Invalid(
                    "this command requires --admin and --admin-password".into(),
                ));
            };
            ctx.operator.require_admin(login, password).await?;
            run_admin(&ctx, command).await
        }
    }
}

fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the configuration file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> Result<BallotConfig> {
    if path.exists() {
        return BallotConfig::from_file(path);
    }
    let config = BallotConfig::default();
    config.validate()?;
    Ok(config)
}

/// Loaded ledger and election behind one operator
struct Context {
    config: BallotConfig,
    operator: Arc<Operator>,
    sink: Arc<FileSink>,
}

impl Context {
    async fn open(config: BallotConfig) -> Result<Self> {
        tokio::fs::create_dir_all(config.data_dir()).await?;

        let store = Arc::new(CredentialStore::new(config.ledger_path()));
        store.init().await?;

        let state = snapshot::load(&config.snapshot_path()).await?;
        let election = Arc::new(Election::from_state(state));
        let sink = Arc::new(FileSink::from_config(&config));
        let operator = Arc::new(Operator::new(store, election, Arc::clone(&sink)));

        Ok(Self {
            config,
            operator,
            sink,
        })
    }

    /// Refuse commands that would overwrite a running server's snapshot
    fn refuse_while_serving(&self) -> Result<()> {
        let lock = self.config.lock_path();
        if ServeLock::is_held(&lock) {
            return Err(Error::Invalid(format!(
                "a server is running ({} exists); use its console instead",
                lock.display()
            )));
        }
        Ok(())
    }
}

/// Start the vote server, the live display and the operator console
async fn run_serve(ctx: Context) -> Result<()> {
    let _lock = ServeLock::acquire(ctx.config.lock_path())?;
    tracing::info!("Starting BallotBox vote server...");

    let store = Arc::clone(ctx.operator.store());
    let election = Arc::clone(ctx.operator.election());

    if !store.has_role(&Role::Admin).await? {
        tracing::warn!("No administrator account exists; run `ballotbox bootstrap` first");
    }

    let turnout = election.turnout().await;
    let status = if election.is_open().await { "open" } else { "closed" };
    tracing::info!(
        "Loaded {} voters ({} voted), election {}",
        turnout.total,
        turnout.voted,
        status
    );

    let server = Arc::new(VoteServer::new(
        ctx.config.server.bind_address.clone(),
        ctx.config.session.clone(),
        store,
        Arc::clone(&election),
        ctx.sink.clone(),
    ));
    let listener = server.bind().await?;

    let (display_tx, display_rx) = tokio::sync::watch::channel(false);
    let display_handle = if ctx.config.display.enabled {
        Some(tokio::spawn(display::run_display(
            Arc::clone(&election),
            ctx.config.refresh_interval(),
            display_rx,
        )))
    } else {
        None
    };

    // A dropped sender disables the quit branch below
    let (quit_tx, mut quit_rx) = oneshot::channel();
    if ctx.config.server.console {
        tokio::spawn(run_console(Arc::clone(&ctx.operator), quit_tx));
    }

    let mut server_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    tokio::select! {
        result = &mut server_handle => {
            display_tx.send_replace(true);
            return match result {
                Ok(result) => result,
                Err(e) => Err(Error::Internal(format!("server task failed: {}", e))),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        Ok(()) = &mut quit_rx => {
            tracing::info!("Shutdown requested from the console");
        }
    }

    server.stop();
    display_tx.send_replace(true);

    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }
    if let Some(handle) = display_handle {
        let _ = handle.await;
    }

    ctx.operator.save().await?;
    tracing::info!("BallotBox stopped");
    Ok(())
}

/// Feed stdin lines to a console bound to the serving operator
async fn run_console(operator: Arc<Operator>, quit: oneshot::Sender<()>) {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);

    // Blocking stdin reads stay off the runtime so shutdown never waits on them
    std::thread::spawn(move || {
        use std::io::BufRead;
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Operator console ready; type help");
    let mut console = Console::new(operator);
    while let Some(line) = line_rx.recv().await {
        match console.handle_line(&line).await {
            ConsoleReply::Output(text) => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            ConsoleReply::Quit => {
                let _ = quit.send(());
                return;
            }
        }
    }
    tracing::debug!("Console input closed");
}

async fn run_admin(ctx: &Context, command: &Commands) -> Result<()> {
    let op = &ctx.operator;
    match command {
        Commands::Voter { action } => run_voter(ctx, action).await,
        Commands::Candidate { action } => run_candidate(ctx, action).await,
        Commands::Open => {
            ctx.refuse_while_serving()?;
            op.open().await?;
            println!("✓ Voting is open");
            Ok(())
        }
        Commands::Close => {
            ctx.refuse_while_serving()?;
            op.close().await?;
            println!("✓ Voting is closed");
            Ok(())
        }
        Commands::Results => {
            print!("{}", admin::render_results(&op.election().tally().await));
            Ok(())
        }
        Commands::Stats { json } => print_stats(op.election(), *json).await,
        Commands::Export => {
            let path = op.export().await?;
            println!("✓ Results written to {}", path.display());
            Ok(())
        }
        Commands::Account { action } => run_account(op, action).await,
        Commands::Reset => {
            ctx.refuse_while_serving()?;
            if op.reset().await? {
                println!("✓ Election data reset");
            } else {
                println!("Nothing to reset");
            }
            Ok(())
        }
        Commands::Serve | Commands::InitConfig { .. } | Commands::Bootstrap { .. } => Ok(()),
    }
}

async fn run_voter(ctx: &Context, action: &VoterCommand) -> Result<()> {
    match action {
        VoterCommand::Add {
            id,
            name,
            login,
            password,
        } => {
            ctx.refuse_while_serving()?;
            ctx.operator.add_voter(*id, name, login, password).await?;
            println!("✓ Voter {} ({}) registered", id, name);
        }
        VoterCommand::List => {
            print!("{}", admin::render_voters(&ctx.operator.election().voters().await));
        }
    }
    Ok(())
}

async fn run_candidate(ctx: &Context, action: &CandidateCommand) -> Result<()> {
    match action {
        CandidateCommand::Add { id, name } => {
            ctx.refuse_while_serving()?;
            ctx.operator.add_candidate(*id, name).await?;
            println!("✓ Candidate {} ({}) registered", id, name);
        }
        CandidateCommand::List => {
            print!("{}", admin::render_candidates(&ctx.operator.election().candidates().await));
        }
    }
    Ok(())
}

async fn print_stats(election: &Election, json: bool) -> Result<()> {
    let state = election.snapshot().await;

    if json {
        let report = serde_json::json!({
            "open": state.is_open,
            "turnout": state.turnout(),
            "tally": state.tally(),
        });
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::Internal(format!("failed to render stats: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    print!("{}", admin::render_stats(&state.turnout(), state.is_open));
    Ok(())
}

/// Account changes go straight to the shared ledger, so they stay allowed while serving
async fn run_account(op: &Operator, action: &AccountCommand) -> Result<()> {
    match action {
        AccountCommand::Add {
            login,
            password,
            role,
        } => {
            op.add_account(login, password, Role::from(role.as_str())).await?;
            println!("✓ Account {} created", login);
        }
        AccountCommand::Passwd(args) => {
            op.change_password(&args.login, Some(&args.old), &args.new).await?;
            println!("✓ Password changed for {}", args.login);
        }
        AccountCommand::Reset { login, new } => {
            op.change_password(login, None, new).await?;
            println!("✓ Password reset for {}", login);
        }
        AccountCommand::Enable { login } => {
            op.set_active(login, true).await?;
            println!("✓ Account {} enabled", login);
        }
        AccountCommand::Disable { login } => {
            op.set_active(login, false).await?;
            println!("✓ Account {} disabled", login);
        }
        AccountCommand::List => {
            print!("{}", admin::render_accounts(&op.store().list().await?));
        }
    }
    Ok(())
}

/// Write a default configuration file
fn run_init(output: &Path) -> Result<()> {
    let config_content = r#"# BallotBox Configuration
# Generated configuration file

[server]
bind_address = "0.0.0.0:8888"
# Ledger, snapshot and export files are resolved against this directory
data_dir = "."
# Read operator commands (open, close, voter add, ...) from stdin while serving
console = true

[storage]
ledger_file = "users.csv"
snapshot_file = "vote_data.txt"
export_file = "results.csv"
# Created by serve; offline roster changes are refused while it exists
lock_file = "ballotbox.lock"

[session]
# Longest accepted login or password
max_token_len = 64
# Longest accepted request line; must fit "AUTH <login> <password>"
max_line_len = 256
read_timeout_ms = 30000

[display]
enabled = true
refresh_interval_ms = 3000

[logging]
level = "info"
# pretty or compact
format = "pretty"
"#;

    if output.exists() {
        return Err(Error::AlreadyExists(format!(
            "configuration file {}",
            output.display()
        )));
    }

    std::fs::write(output, config_content)?;
    println!("✓ Configuration written to {}", output.display());
    Ok(())
}
