// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use tenancy_core::domain::config::CONFIG_PATH_ENV;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./tenancy.yaml)
        #[arg(short, long, default_value = "./tenancy.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
    root_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, root_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override), root_override).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(output, examples, force).await,
    }
}

async fn show(
    config_override: Option<PathBuf>,
    root_override: Option<PathBuf>,
    show_paths: bool,
    as_yaml: bool,
) -> Result<()> {
    let config = super::load_config(config_override.clone(), root_override)?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./tenancy.yaml");
        println!("  4. ~/.tenancy/config.yaml");
        println!("  5. /etc/tenancy/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    let spec = &config.spec;
    let paths = config.paths();

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Root: {}", paths.root.display());
    println!("  Apps directory: {}", paths.apps_dir.display());
    println!();

    println!("{}", "Topology document:".bold());
    println!("  Path: {}", paths.topology.display());
    println!("  Anchor: {}", spec.topology.anchor);
    println!("  Worker services: {}{{name}}", spec.topology.worker_prefix);
    println!();

    println!("{}", "Routing document:".bold());
    println!("  Path: {}", paths.routing.display());
    println!("  Document root: {}", spec.routing.document_root);
    println!("  Execution pool: {}", spec.routing.pool_address);
    println!();

    println!("{}", "Allocation:".bold());
    println!(
        "  Ports: {}..{}",
        spec.allocation.first_tenant_port, spec.allocation.port_ceiling
    );
    println!("  Cache namespaces: 0..={}", spec.allocation.max_cache_namespace);
    println!();

    println!("{}", "Commit:".bold());
    println!("  Mode: {}", spec.commit.mode);
    match &paths.backup_dir {
        Some(dir) => println!("  Backups: {}", dir.display()),
        None => println!("  Backups: {}", "next to each document".dimmed()),
    }
    println!("  Lock: {}", paths.lock_file.display());

    Ok(())
}

async fn validate(config_path: Option<PathBuf>, root_override: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = super::load_config(config_path, root_override)?;

    config
        .validate()
        .context("Configuration validation failed")?;

    let paths = config.paths();
    for (label, path) in [("topology", &paths.topology), ("routing", &paths.routing)] {
        if !path.is_file() {
            println!(
                "{}",
                format!("! {} document not found at {}", label, path.display()).yellow()
            );
        }
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;
    info!("Wrote sample configuration: {:?}", output);

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
