//! docboot CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docboot::{
    commands::{
        cmd_bootstrap, cmd_indexes, cmd_init, cmd_ping, cmd_roles, print_bootstrap, print_indexes,
        print_init, print_ping, print_roles, IndexesOptions, InitOptions,
    },
    config::Config,
    error::{Error, Result},
    store::MongoConnector,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docboot")]
#[command(version, about = "Bootstrap a document database", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "DOCBOOT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Check connectivity, reconcile indexes and seed roles
    Bootstrap,

    /// Check whether the database is reachable
    Ping,

    /// Reconcile collection indexes
    Indexes {
        /// Only report differences, change nothing
        #[arg(long)]
        check: bool,

        /// Restrict to one collection
        #[arg(long)]
        collection: Option<String>,
    },

    /// Seed the built-in roles
    Roles {
        /// Only list which catalog roles exist
        #[arg(long)]
        list: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but the database was unreachable
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.json {
        // Keep stdout clean for the JSON document
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let config = cmd_init(InitOptions::from_arg(cli.config, force))?;
        if cli.json {
            print_json(&config)?;
        } else {
            print_init(&config);
        }
        return Ok(true);
    }

    // Handle completions command (doesn't need config or a database)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docboot", &mut std::io::stdout());
        return Ok(true);
    }

    let config = load_config(cli.config.as_deref())?;
    let connector = MongoConnector;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Bootstrap => {
            let outcome = cmd_bootstrap(&connector, &config).await?;

            if cli.json {
                print_json(&outcome)?;
            } else {
                print_bootstrap(&outcome);
            }
            Ok(outcome.is_ready())
        }

        Commands::Ping => {
            let info = cmd_ping(&connector, &config).await?;

            if cli.json {
                print_json(&info)?;
            } else {
                print_ping(&info);
            }
            Ok(info.reachable)
        }

        Commands::Indexes { check, collection } => {
            let options = IndexesOptions { check, collection };
            let result = cmd_indexes(&connector, &config, options).await?;

            if cli.json {
                print_json(&result)?;
            } else {
                print_indexes(&result);
            }
            Ok(true)
        }

        Commands::Roles { list } => {
            let result = cmd_roles(&connector, &config, list).await?;

            if cli.json {
                print_json(&result)?;
            } else {
                print_roles(&result);
            }
            Ok(true)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
