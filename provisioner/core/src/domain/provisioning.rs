// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provisioning State Machine & Error Taxonomy
//!
//! ```text
//! Start → Validated → Allocated → TopologyMutated → RoutingMutated → Scaffolded → Done
//!   └──────────┴───────────┴─────────────┴─────────────────┴──────────────┴──→ Failed
//! ```
//!
//! Errors raised before anything is written carry no side effects. Errors
//! raised after backups were taken but before any artifact changed are
//! wrapped in [`ProvisionError::Aborted`]. Anything raised after the first
//! artifact is written is wrapped in [`ProvisionError::Partial`], which
//! records what was already written and where the backups are. The engine
//! never rolls back on its own.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::tenant::Tenant;

/// Workflow states, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    Start,
    Validated,
    Allocated,
    TopologyMutated,
    RoutingMutated,
    Scaffolded,
    Done,
    Failed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Validated => "validated",
            Self::Allocated => "allocated",
            Self::TopologyMutated => "topology-mutated",
            Self::RoutingMutated => "routing-mutated",
            Self::Scaffolded => "scaffolded",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Things a provisioning run writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    TopologyDocument,
    RoutingDocument,
    TenantDirectory,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [
        Artifact::TopologyDocument,
        Artifact::RoutingDocument,
        Artifact::TenantDirectory,
    ];
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TopologyDocument => "topology document",
            Self::RoutingDocument => "routing document",
            Self::TenantDirectory => "tenant directory",
        };
        f.write_str(label)
    }
}

/// Allocatable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Port,
    CacheNamespace,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port => f.write_str("port"),
            Self::CacheNamespace => f.write_str("cache namespace"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid tenant name '{name}': {reason}")]
    InvalidFormat { name: String, reason: String },

    #[error("tenant '{name}' already exists ({location})")]
    AlreadyExists { name: String, location: String },

    #[error("{resource} {value} is out of range (allowed {min}..={max})")]
    OutOfRange {
        resource: Resource,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{resource} {value} is already assigned to {holder}")]
    Conflict {
        resource: Resource,
        value: u32,
        holder: String,
    },

    #[error("anchor {anchor} not found in {}; the document no longer matches the expected layout", path.display())]
    AnchorNotFound { path: PathBuf, anchor: String },

    #[error("document {} is invalid: {reason}", path.display())]
    InvalidDocument { path: PathBuf, reason: String },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render {template} template: {reason}")]
    Template { template: String, reason: String },

    #[error(
        "provisioning stopped after reaching {reached} before any artifact was modified; backups taken: {}",
        path_list(.backups)
    )]
    Aborted {
        reached: ProvisionState,
        backups: Vec<PathBuf>,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error(
        "provisioning stopped after reaching {reached}; already modified: {}; not modified: {}",
        artifact_list(.modified),
        artifact_list(.untouched)
    )]
    Partial {
        reached: ProvisionState,
        modified: Vec<Artifact>,
        untouched: Vec<Artifact>,
        backups: Vec<PathBuf>,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure wrote nothing, backups included.
    pub fn is_side_effect_free(&self) -> bool {
        !matches!(self, Self::Partial { .. } | Self::Aborted { .. })
    }

    /// Backups left behind by the failed run.
    pub fn backups(&self) -> &[PathBuf] {
        match self {
            Self::Partial { backups, .. } | Self::Aborted { backups, .. } => backups,
            _ => &[],
        }
    }

    /// Artifacts already written when the run stopped.
    pub fn modified_artifacts(&self) -> &[Artifact] {
        match self {
            Self::Partial { modified, .. } => modified,
            _ => &[],
        }
    }
}

fn artifact_list(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return "none".to_string();
    }
    artifacts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn path_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Blocks rendered for a dry run, exactly as they would be inserted.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPreview {
    pub topology_block: String,
    pub routing_block: String,
    pub env_descriptor: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub tenant: Tenant,
    pub final_state: ProvisionState,
    pub dry_run: bool,
    pub modified: Vec<Artifact>,
    pub backups: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<RenderedPreview>,
    pub next_steps: Vec<String>,
}

impl ProvisionReport {
    /// Manual follow-ups the engine leaves to the operator.
    pub fn next_steps_for(tenant: &Tenant, worker_service: &str) -> Vec<String> {
        vec![
            format!(
                "Install the application payload into {}",
                tenant.directory.display()
            ),
            format!(
                "Create the database: CREATE DATABASE `{}`;",
                tenant.database_name
            ),
            format!("Run the startup migrations for '{}' inside {}", tenant.name, worker_service),
            format!(
                "Reload the stack so the router and {} pick up port {}",
                worker_service, tenant.port
            ),
        ]
    }
}
