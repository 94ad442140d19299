// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tenant provisioning command

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

use tenancy_core::application::{ProvisionRequest, ProvisioningWorkflow};
use tenancy_core::{ProvisionError, ProvisionReport, ProvisionerConfig};

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    /// Tenant name (lowercase letters, digits, '_' and '-')
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Use this port instead of the next free one
    #[arg(long, value_name = "PORT")]
    pub port: Option<u32>,

    /// Use this cache namespace instead of the next free one
    #[arg(long, value_name = "N")]
    pub cache_namespace: Option<u32>,

    /// Validate, allocate and render without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProvisionArgs {
    pub fn request(&self) -> ProvisionRequest {
        ProvisionRequest {
            name: self.name.clone(),
            port: self.port,
            cache_namespace: self.cache_namespace,
            dry_run: self.dry_run,
        }
    }
}

pub async fn handle_command(
    args: ProvisionArgs,
    config_override: Option<PathBuf>,
    root_override: Option<PathBuf>,
) -> Result<()> {
    let config = super::load_config(config_override, root_override)?;
    let request = args.request();

    if !args.json {
        let verb = if args.dry_run { "Checking" } else { "Provisioning" };
        println!("{} tenant {}...", verb, args.name.bold());
    }

    let report = run_workflow(config, request).await?;
    if args.json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

/// Run the workflow on a blocking thread; it does synchronous file I/O and
/// may wait on the run lock.
pub(crate) async fn run_workflow(
    config: ProvisionerConfig,
    request: ProvisionRequest,
) -> Result<ProvisionReport> {
    debug!("Dispatching provisioning of {} (dry_run={})", request.name, request.dry_run);
    let outcome = tokio::task::spawn_blocking(move || {
        let workflow = ProvisioningWorkflow::new(config)?;
        Ok::<_, anyhow::Error>(workflow.run(&request))
    })
    .await
    .context("Provisioning task failed")??;

    outcome.map_err(|err| {
        for line in failure_details(&err) {
            eprintln!("{line}");
        }
        anyhow::Error::new(err)
    })
}

pub(crate) fn print_json(report: &ProvisionReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}

pub(crate) fn print_report(report: &ProvisionReport) {
    let tenant = &report.tenant;

    if report.dry_run {
        println!("{}", format!("✓ Tenant '{}' can be provisioned", tenant.name).green());
    } else {
        println!("{}", format!("✓ Tenant '{}' provisioned", tenant.name).green());
    }
    println!("  Run: {}", report.run_id.to_string().dimmed());
    println!();

    println!("{}", "Tenant:".bold());
    println!("  Port: {}", tenant.port);
    println!("  Cache namespace: {}", tenant.cache_namespace);
    println!("  Database: {}", tenant.database_name);
    println!("  Queue: {}", tenant.queue_name);
    println!("  Cache prefix: {}", tenant.cache_prefix);
    println!("  Directory: {}", tenant.directory.display());
    println!();

    if let Some(preview) = &report.preview {
        println!("{}", "Topology block:".bold());
        print!("{}", preview.topology_block);
        println!("{}", "Routing block:".bold());
        print!("{}", preview.routing_block);
        println!("{}", "Environment descriptor:".bold());
        print!("{}", preview.env_descriptor);
        println!();
        println!("{}", "Dry run: nothing was written".yellow());
        return;
    }

    println!("{}", "Modified:".bold());
    for artifact in &report.modified {
        println!("  - {}", artifact);
    }
    println!("{}", "Backups:".bold());
    for backup in &report.backups {
        println!("  - {}", backup.display());
    }
    println!();

    println!("{}", "Next steps:".bold());
    for (index, step) in report.next_steps.iter().enumerate() {
        println!("  {}. {}", index + 1, step);
    }
}

/// What the operator needs to know about a failed run beyond the message.
fn failure_details(err: &ProvisionError) -> Vec<String> {
    match err {
        ProvisionError::Partial {
            reached,
            modified,
            untouched,
            backups,
            ..
        } => {
            let mut lines = vec![
                format!("{}", format!("Provisioning stopped after state '{reached}'").red().bold()),
                "Already modified (not reverted):".to_string(),
            ];
            lines.extend(modified.iter().map(|a| format!("  - {}", a.to_string().yellow())));
            lines.push("Not modified:".to_string());
            lines.extend(untouched.iter().map(|a| format!("  - {a}")));
            if !backups.is_empty() {
                lines.push("Backups of the originals:".to_string());
                lines.extend(backups.iter().map(|b| format!("  - {}", b.display())));
            }
            lines
        }
        ProvisionError::Aborted { backups, .. } => {
            let mut lines = vec![
                format!("{}", "No documents were modified".dimmed()),
                "Backups taken before the failure:".to_string(),
            ];
            lines.extend(backups.iter().map(|b| format!("  - {}", b.display())));
            lines
        }
        _ => vec![format!("{}", "No files were modified".dimmed())],
    }
}
