// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity Validator
//!
//! Decides whether a requested tenant name may be provisioned.
//!
//! - **Layer:** Application
//! - **Collaborators:** Domain `TenantName` (format), `Registry` (documents),
//!   filesystem (the apps directory)
//!
//! Never writes anything.

use std::path::{Path, PathBuf};

use crate::domain::provisioning::ProvisionError;
use crate::domain::registry::Registry;
use crate::domain::tenant::TenantName;

pub struct IdentityValidator {
    apps_dir: PathBuf,
}

impl IdentityValidator {
    /// `apps_dir` is the absolute directory tenant directories live in.
    pub fn new(apps_dir: impl Into<PathBuf>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
        }
    }

    /// Check the name's format, then that nothing by that name exists on disk
    /// or in either document.
    pub fn validate(&self, raw: &str, registry: &Registry) -> Result<TenantName, ProvisionError> {
        let name = TenantName::parse(raw)?;

        let directory = self.apps_dir.join(name.as_str());
        if exists(&directory) {
            return Err(ProvisionError::AlreadyExists {
                name: name.to_string(),
                location: format!("directory {}", directory.display()),
            });
        }

        if let Some(record) = registry.tenant(name.as_str()) {
            let location = match (record.in_topology, record.in_routing) {
                (true, true) => "topology and routing documents",
                (true, false) => "topology document",
                (false, true) => "routing document",
                (false, false) => "apps directory",
            };
            return Err(ProvisionError::AlreadyExists {
                name: name.to_string(),
                location: location.to_string(),
            });
        }

        Ok(name)
    }
}

/// Treats dangling symlinks as existing.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
