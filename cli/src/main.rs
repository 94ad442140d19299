// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Tenancy Operator CLI
//!
//! The `tenancy` binary provisions additional tenants into a shared runtime
//! topology by extending its compose and routing documents.
//!
//! ## Commands
//!
//! - `tenancy provision <NAME>` - Provision a tenant
//! - `tenancy check <NAME>` - Validate and preview allocation without writing
//! - `tenancy list` - Tenants found in the documents, with drift
//! - `tenancy config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use tenancy_cli::commands::{self, CheckArgs, ConfigCommand, ListArgs, ProvisionArgs};

/// Tenancy - provision tenants into a shared runtime topology
#[derive(Parser)]
#[command(name = "tenancy")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TENANCY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Project root holding the topology and routing documents
    #[arg(long, global = true, env = "TENANCY_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TENANCY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a new tenant
    #[command(name = "provision")]
    Provision(ProvisionArgs),

    /// Validate a tenant name and preview its allocation without writing
    #[command(name = "check")]
    Check(CheckArgs),

    /// List tenants found in the topology, routing and apps directory
    #[command(name = "list")]
    List(ListArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A local .env may carry TENANCY_* settings.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let result = match cli.command {
        Some(Commands::Provision(args)) => {
            commands::provision::handle_command(args, cli.config, cli.root).await
        }
        Some(Commands::Check(args)) => {
            commands::tenant::handle_check(args, cli.config, cli.root).await
        }
        Some(Commands::List(args)) => {
            commands::tenant::handle_list(args, cli.config, cli.root).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config, cli.root).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
