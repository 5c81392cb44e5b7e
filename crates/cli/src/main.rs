//! patchwright CLI — the main entry point.
//!
//! Commands:
//! - `import`    — Load instances from a JSONL dataset file
//! - `instances` — List stored instances
//! - `solve`     — Run (or resume) the agent on one instance
//! - `replay`    — Print the committed actions of a run
//! - `runs`      — List runs
//! - `evaluate`  — Record an external evaluation result
//! - `stats`     — Show database statistics
//! - `config`    — Show the effective configuration

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "patchwright",
    about = "patchwright — autonomous bug-fixing agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.patchwright/config.toml)
    #[arg(short, long, global = true, env = "PATCHWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load instances from a JSONL file (one SWE-bench row per line)
    Import {
        file: PathBuf,

        /// Overwrite instances already stored under the same id
        #[arg(long)]
        replace: bool,
    },

    /// List stored instances
    Instances {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Run the agent on one instance
    Solve {
        instance_id: String,

        /// Checkout to work in (defaults to <repos_dir>/<instance>)
        #[arg(long)]
        repo_dir: Option<PathBuf>,

        /// Continue the instance's interrupted run instead of refusing
        #[arg(long, conflicts_with = "replay")]
        resume: bool,

        /// Give up after this many seconds; the run stays resumable
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Re-drive the decisions of a stored run instead of asking the model
        #[arg(long, value_name = "RUN_ID")]
        replay: Option<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the committed actions of a run
    Replay {
        run_id: String,

        /// Print actions as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List runs, newest first
    Runs {
        #[arg(short, long)]
        instance: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Record whether a finished run's patch resolved its instance
    #[command(group(ArgGroup::new("verdict").required(true).args(["resolved", "unresolved"])))]
    Evaluate {
        run_id: String,

        #[arg(long)]
        resolved: bool,

        #[arg(long)]
        unresolved: bool,

        /// Free-form evaluator output to store alongside
        #[arg(long)]
        details: Option<String>,
    },

    /// Show database statistics
    Stats,

    /// Show the effective configuration (secrets redacted)
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Import { file, replace } => {
            commands::import::run(&config, &file, replace).await?
        }
        Commands::Instances { limit } => commands::runs::instances(&config, limit).await?,
        Commands::Solve {
            instance_id,
            repo_dir,
            resume,
            timeout_secs,
            replay,
            json,
        } => {
            let options = commands::solve::SolveOptions {
                instance_id,
                repo_dir,
                resume,
                timeout_secs,
                replay,
                json,
            };
            commands::solve::run(&config, options).await?
        }
        Commands::Replay { run_id, json } => commands::replay::run(&config, &run_id, json).await?,
        Commands::Runs { instance, limit } => {
            commands::runs::runs(&config, instance.as_deref(), limit).await?
        }
        Commands::Evaluate {
            run_id,
            resolved,
            unresolved: _,
            details,
        } => commands::evaluate::run(&config, &run_id, resolved, details).await?,
        Commands::Stats => commands::stats::run(&config).await?,
        Commands::Config { default } => {
            commands::config_cmd::show(&config, cli.config.as_deref(), default)
        }
    }

    Ok(())
}
