// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Registry Reader
//!
//! Read-only scan of the two configuration documents and the apps directory.
//! Everything a run needs is read up front, before anything is written.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::domain::config::{ProvisionerConfig, ResolvedPaths};
use crate::domain::document::{Document, DocumentKind};
use crate::domain::provisioning::ProvisionError;
use crate::domain::registry::{Registry, RegistryRules};

/// Documents as read from disk plus the registry derived from them.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub topology: Document,
    pub routing: Document,
    pub registry: Registry,
}

pub struct RegistryReader {
    paths: ResolvedPaths,
    rules: RegistryRules,
}

impl RegistryReader {
    pub fn new(paths: ResolvedPaths, rules: RegistryRules) -> Self {
        Self { paths, rules }
    }

    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ProvisionError> {
        let rules = config
            .registry_rules()
            .map_err(|e| ProvisionError::InvalidDocument {
                path: config.paths().routing,
                reason: e.to_string(),
            })?;
        Ok(Self::new(config.paths(), rules))
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn read(&self) -> Result<RegistrySnapshot, ProvisionError> {
        let topology = read_document(&self.paths.topology, DocumentKind::Topology)?;
        let routing = read_document(&self.paths.routing, DocumentKind::Routing)?;
        let tenant_dirs = list_tenant_dirs(&self.paths.apps_dir)?;

        let registry = Registry::from_documents(&topology, &routing, &tenant_dirs, &self.rules)?;

        debug!(
            tenants = registry.tenants().count(),
            bound_ports = registry.bound_ports().len(),
            namespaces = registry.assigned_namespaces().len(),
            "Registry loaded"
        );

        Ok(RegistrySnapshot {
            topology,
            routing,
            registry,
        })
    }
}

pub fn read_document(path: &Path, kind: DocumentKind) -> Result<Document, ProvisionError> {
    let text = std::fs::read_to_string(path).map_err(|e| ProvisionError::io(path, e))?;
    Ok(Document::parse(path, kind, &text))
}

/// Names of the visible subdirectories of `apps_dir`. A missing apps
/// directory simply means no tenant has a directory yet.
fn list_tenant_dirs(apps_dir: &Path) -> Result<BTreeSet<String>, ProvisionError> {
    let entries = match std::fs::read_dir(apps_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(ProvisionError::io(apps_dir, e)),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProvisionError::io(apps_dir, e))?;
        let is_dir = entry
            .file_type()
            .map(|t| t.is_dir())
            .map_err(|e| ProvisionError::io(entry.path(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dir && !name.starts_with('.') {
            names.insert(name);
        }
    }
    Ok(names)
}
