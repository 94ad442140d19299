// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the tenancy CLI

pub mod config;
pub mod provision;
pub mod tenant;

pub use self::config::ConfigCommand;
pub use self::provision::ProvisionArgs;
pub use self::tenant::{CheckArgs, ListArgs};

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

use tenancy_core::ProvisionerConfig;

/// Load configuration through discovery, then apply the `--root` flag on top.
pub fn load_config(
    config_override: Option<PathBuf>,
    root_override: Option<PathBuf>,
) -> Result<ProvisionerConfig> {
    let mut config =
        ProvisionerConfig::load_or_default(config_override).context("Failed to load configuration")?;
    if let Some(root) = root_override {
        info!("Root overridden from command line: {:?}", root);
        config.spec.root = root;
    }
    debug!(
        "Configuration loaded: name={} root={:?} mode={}",
        config.metadata.name, config.spec.root, config.spec.commit.mode
    );
    Ok(config)
}
