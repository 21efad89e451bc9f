//! Tally CLI
//!
//! Command-line interface for Tally - bookkeeping records kept in a
//! relational store with a search index projected alongside.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tally_core::{Config, Database, EntityKind, Ledger, PageRequest, RecordId, SortOrder};

mod commands;
mod output;

use commands::records::{self, for_kind};
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - Bookkeeping records with a synchronized search index")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (defaults to ~/.config/tally/config.toml or TALLY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a record, or fully replace the one with the same id
    Put {
        /// Entity type (relationships, purchases, inventory, sales, miscellaneous)
        kind: EntityKind,
        /// Record JSON: inline, `-` for stdin, or `@file`
        #[arg(value_name = "JSON")]
        record: String,
    },
    /// Create a new record
    #[command(alias = "add")]
    Create {
        /// Entity type
        kind: EntityKind,
        /// Record JSON: inline, `-` for stdin, or `@file`
        #[arg(value_name = "JSON")]
        record: String,
    },
    /// Update some fields of an existing record
    Update {
        /// Entity type
        kind: EntityKind,
        /// Patch JSON with `id` and the fields to change
        #[arg(value_name = "JSON")]
        record: String,
    },
    /// Search records through the search index
    #[command(alias = "ls")]
    List {
        /// Entity type
        kind: EntityKind,
        /// 1-based page number
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Records per page
        #[arg(short, long)]
        limit: Option<usize>,
        /// Full-text query
        #[arg(long, default_value = "")]
        query: String,
        /// Field to sort by
        #[arg(long, default_value = "id")]
        order_by: String,
        /// asc or desc
        #[arg(long, default_value = "asc")]
        sort_order: SortOrder,
        /// Return every record on one page
        #[arg(long)]
        all: bool,
    },
    /// Show one record from the relational store
    Show {
        /// Entity type
        kind: EntityKind,
        /// Record id
        id: RecordId,
    },
    /// Delete a record and its search document
    #[command(alias = "rm")]
    Delete {
        /// Entity type
        kind: EntityKind,
        /// Record id
        id: RecordId,
    },
    /// Drop and reload every search index from the relational store
    Rebuild,
    /// Show per-index row and document counts
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, index.backend, index.url, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        name: String,
        email: String,
        /// Password hash produced by the auth layer
        #[arg(long)]
        password_hash: String,
    },
    /// Look up a user by email
    Show { email: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(Config::config_file_path);
    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;
    init_logging(&config);
    tracing::debug!(path = ?config_path, data_dir = ?config.data_dir, "Loaded configuration");

    // Commands that don't need the ledger
    match cli.command {
        Commands::Config { command } => {
            return match command {
                Some(ConfigCommands::Show) | None => {
                    commands::config::show(&config, &config_path, output)
                }
                Some(ConfigCommands::Set { key, value }) => {
                    commands::config::set(config, key, value, &config_path, output)
                }
            };
        }
        Commands::User { command } => {
            let database = Database::open(&config).context("Failed to open database")?;
            return match command {
                UserCommands::Add {
                    name,
                    email,
                    password_hash,
                } => commands::user::add(&database, name, email, password_hash, output),
                UserCommands::Show { email } => commands::user::show(&database, email, output),
            };
        }
        command => {
            let ledger = Ledger::open(&config).context("Failed to open ledger")?;
            dispatch(command, &ledger, &config, output)
        }
    }
}

fn dispatch(
    command: Commands,
    ledger: &Ledger,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Commands::Put { kind, record } => {
            for_kind!(kind, E => records::put::<E, _>(ledger, &record, output))
        }
        Commands::Create { kind, record } => {
            for_kind!(kind, E => records::create::<E, _>(ledger, &record, output))
        }
        Commands::Update { kind, record } => {
            for_kind!(kind, E => records::update::<E, _>(ledger, &record, output))
        }
        Commands::List {
            kind,
            page,
            limit,
            query,
            order_by,
            sort_order,
            all,
        } => {
            let request = PageRequest {
                page,
                page_limit: limit,
                query,
                order_by,
                sort_order,
                get_all: all,
            };
            for_kind!(kind, E => records::list::<E, _>(ledger, &request, output))
        }
        Commands::Show { kind, id } => {
            for_kind!(kind, E => records::show::<E, _>(ledger, id, output))
        }
        Commands::Delete { kind, id } => {
            for_kind!(kind, E => records::delete::<E, _>(ledger, id, output))
        }
        Commands::Rebuild => commands::rebuild::rebuild(ledger, output),
        Commands::Status => commands::status::show(ledger, config, output),
        Commands::Config { .. } | Commands::User { .. } => Ok(()),
    }
}

/// Log to stderr so JSON on stdout stays parseable; RUST_LOG wins over config
fn init_logging(config: &Config) {
    let level = config.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally_core={level},tally_cli={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_argument_and_json_flag() {
        let cli = Cli::try_parse_from([
            "tally",
            "--json",
            "create",
            "relationships",
            r#"{"name": "Acme"}"#,
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Create { kind, record } => {
                assert_eq!(kind, EntityKind::Relationships);
                assert_eq!(record, r#"{"name": "Acme"}"#);
            }
            _ => panic!("expected create"),
        }

        let cli = Cli::try_parse_from(["tally", "update", "sale", r#"{"id": 1}"#, "--quiet"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Update { kind: EntityKind::Sales, .. }));
    }
}
