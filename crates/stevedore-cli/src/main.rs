mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Session, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stevedore",
    version,
    about = "Local development-environment orchestrator for containerized services"
)]
struct Cli {
    /// Path to the Stevedore store directory.
    #[arg(long, default_value = "~/.local/share/stevedore", global = true)]
    store: String,

    /// Path to the project configuration file.
    #[arg(long, default_value = "stevedore.toml", global = true)]
    config: PathBuf,

    /// Environment tag the application runs under.
    #[arg(long, default_value = "sim", global = true)]
    env: String,

    /// Fail immediately if another process holds the store lock.
    #[arg(long, default_value_t = false, global = true)]
    no_wait: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a release for a registered remote.
    Deploy {
        /// Remote alias.
        #[arg(default_value = "default")]
        alias: String,
    },
    /// Start or tear down the simulated application.
    Sim {
        #[command(subcommand)]
        action: SimAction,
    },
    /// Manage individual services.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Inspect and edit the application's environment variables.
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
    /// Manage deploy remotes.
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
    /// List registered operations.
    Ops,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum SimAction {
    /// Create the application and provision every configured service.
    Start,
    /// Destroy every service and the application record.
    Destroy,
}

#[derive(Debug, Subcommand)]
enum ServiceAction {
    /// Tear down one service.
    Destroy {
        /// Service name.
        name: String,
    },
    /// List provisioned services.
    List,
}

#[derive(Debug, Subcommand)]
enum EnvAction {
    /// Show every variable.
    List,
    /// Set one or more KEY=VALUE pairs.
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Remove one or more variables.
    Unset {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum RemoteAction {
    /// Register or replace a remote alias.
    Add { alias: String, target: String },
    /// Show registered remotes.
    List,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STEVEDORE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let result = match cli.command {
        Commands::Ops => commands::ops::run(json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        command => Session::open(&expand_tilde(&cli.store), &cli.config, &cli.env, json)
            .map(|session| session.with_no_wait(cli.no_wait))
            .and_then(|session| dispatch(&session, command)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn dispatch(session: &Session, command: Commands) -> Result<u8, String> {
    match command {
        Commands::Deploy { alias } => commands::deploy::run(session, &alias),
        Commands::Sim { action } => match action {
            SimAction::Start => commands::sim::start(session),
            SimAction::Destroy => commands::sim::destroy(session),
        },
        Commands::Service { action } => match action {
            ServiceAction::Destroy { name } => commands::service::destroy(session, &name),
            ServiceAction::List => commands::service::list(session),
        },
        Commands::Env { action } => match action {
            EnvAction::List => commands::env::list(session),
            EnvAction::Set { pairs } => commands::env::set(session, &pairs),
            EnvAction::Unset { keys } => commands::env::unset(session, &keys),
        },
        Commands::Remote { action } => match action {
            RemoteAction::Add { alias, target } => commands::remote::add(session, &alias, &target),
            RemoteAction::List => commands::remote::list(session),
        },
        Commands::Ops | Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
