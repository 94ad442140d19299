// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-only tenant commands
//!
//! Commands: check, list

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use tenancy_core::application::{ProvisionRequest, TenantInventory, TenantListing};

use super::provision::{print_json, print_report, run_workflow};

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Tenant name to check
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Check this port instead of the next free one
    #[arg(long, value_name = "PORT")]
    pub port: Option<u32>,

    /// Check this cache namespace instead of the next free one
    #[arg(long, value_name = "N")]
    pub cache_namespace: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    /// A check is a provisioning request that never writes.
    pub fn request(&self) -> ProvisionRequest {
        ProvisionRequest {
            name: self.name.clone(),
            port: self.port,
            cache_namespace: self.cache_namespace,
            dry_run: true,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_check(
    args: CheckArgs,
    config_override: Option<PathBuf>,
    root_override: Option<PathBuf>,
) -> Result<()> {
    let config = super::load_config(config_override, root_override)?;
    let report = run_workflow(config, args.request()).await?;
    if args.json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

pub async fn handle_list(
    args: ListArgs,
    config_override: Option<PathBuf>,
    root_override: Option<PathBuf>,
) -> Result<()> {
    let config = super::load_config(config_override, root_override)?;

    let listing = tokio::task::spawn_blocking(move || {
        TenantInventory::new(&config)?.list()
    })
    .await
    .context("Listing task failed")??;

    if args.json {
        let json = serde_json::to_string_pretty(&listing).context("Failed to serialize listing")?;
        println!("{json}");
        return Ok(());
    }

    for line in listing_lines(&listing) {
        println!("{line}");
    }
    Ok(())
}

fn listing_lines(listing: &TenantListing) -> Vec<String> {
    if listing.tenants.is_empty() {
        return vec![format!("{}", "No tenants found".yellow())];
    }

    let mut lines = vec![format!("{} tenants:", listing.tenants.len())];
    for record in &listing.tenants {
        let port = record
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let namespace = record
            .cache_namespace
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = if record.is_complete() {
            format!("{}", "ok".green())
        } else {
            let mut missing = Vec::new();
            if !record.in_topology {
                missing.push("topology");
            }
            if !record.in_routing {
                missing.push("routing");
            }
            if !record.has_directory {
                missing.push("directory");
            }
            format!("{}", format!("missing {}", missing.join(", ")).red())
        };
        lines.push(format!(
            "  {:<20} port {:<6} namespace {:<3} {}",
            record.name, port, namespace, status
        ));
    }
    if !listing.drifted.is_empty() {
        lines.push(format!(
            "{}",
            format!("{} tenant(s) drifted", listing.drifted.len()).yellow()
        ));
    }
    lines
}
