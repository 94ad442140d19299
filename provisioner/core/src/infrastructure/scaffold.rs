// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scaffold Generator
//!
//! Creates a tenant's working directory and writes its environment
//! descriptor. Nothing else on disk is touched.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::provisioning::ProvisionError;
use crate::domain::tenant::Tenant;

#[derive(Debug, Clone)]
pub struct ScaffoldGenerator {
    root: PathBuf,
    env_file: String,
}

impl ScaffoldGenerator {
    pub fn new(root: impl Into<PathBuf>, env_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            env_file: env_file.into(),
        }
    }

    /// Absolute location of the tenant's directory.
    pub fn directory_of(&self, tenant: &Tenant) -> PathBuf {
        self.root.join(&tenant.directory)
    }

    /// Create the tenant directory in place and write the descriptor into it.
    pub fn create_tenant_scaffold(
        &self,
        tenant: &Tenant,
        env_descriptor: &str,
    ) -> Result<PathBuf, ProvisionError> {
        let directory = self.directory_of(tenant);
        fs::create_dir_all(&directory).map_err(|e| ProvisionError::io(&directory, e))?;

        let env_path = directory.join(&self.env_file);
        fs::write(&env_path, env_descriptor).map_err(|e| ProvisionError::io(&env_path, e))?;

        info!(tenant = %tenant.name, directory = %directory.display(), "Created tenant scaffold");
        Ok(directory)
    }

    /// Assemble the scaffold under a hidden sibling of the tenant directory.
    /// Nothing is visible at the final location until [`StagedScaffold::commit`].
    pub fn stage_tenant_scaffold(
        &self,
        tenant: &Tenant,
        env_descriptor: &str,
    ) -> Result<StagedScaffold, ProvisionError> {
        let target = self.directory_of(tenant);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|e| ProvisionError::io(&parent, e))?;

        let temp = parent.join(format!(".{}.tenancy-{}.tmp", tenant.name, std::process::id()));
        if temp.exists() {
            fs::remove_dir_all(&temp).map_err(|e| ProvisionError::io(&temp, e))?;
        }
        fs::create_dir(&temp).map_err(|e| ProvisionError::io(&temp, e))?;

        let staged = StagedScaffold {
            target,
            temp: Some(temp.clone()),
        };

        let env_path = temp.join(&self.env_file);
        fs::write(&env_path, env_descriptor).map_err(|e| ProvisionError::io(&env_path, e))?;

        debug!(tenant = %tenant.name, temp = %temp.display(), "Staged tenant scaffold");
        Ok(staged)
    }
}

/// A fully assembled tenant directory waiting to be renamed into place.
/// Dropping it without committing removes the staging directory.
#[derive(Debug)]
pub struct StagedScaffold {
    target: PathBuf,
    temp: Option<PathBuf>,
}

impl StagedScaffold {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> Result<PathBuf, ProvisionError> {
        let Some(temp) = self.temp.take() else {
            return Ok(self.target.clone());
        };

        // rename(2) happily replaces an empty directory; never do that.
        if self.target.exists() {
            let _ = fs::remove_dir_all(&temp);
            return Err(ProvisionError::io(
                &self.target,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "tenant directory appeared while provisioning",
                ),
            ));
        }

        if let Err(e) = fs::rename(&temp, &self.target) {
            let _ = fs::remove_dir_all(&temp);
            return Err(ProvisionError::io(&self.target, e));
        }

        info!(directory = %self.target.display(), "Created tenant scaffold");
        Ok(self.target.clone())
    }
}

impl Drop for StagedScaffold {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            let _ = fs::remove_dir_all(temp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::TenantName;

    fn tenant() -> Tenant {
        Tenant::new(TenantName::parse("app3").unwrap(), 8082, 2, Path::new("apps"))
    }

    #[test]
    fn creates_directory_and_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let generator = ScaffoldGenerator::new(root.path(), ".env");

        let dir = generator.create_tenant_scaffold(&tenant(), "APP_NAME=app3\n").unwrap();

        assert_eq!(dir, root.path().join("apps/app3"));
        assert_eq!(fs::read_to_string(dir.join(".env")).unwrap(), "APP_NAME=app3\n");
        assert_eq!(fs::read_dir(root.path().join("apps")).unwrap().count(), 1);
    }

    #[test]
    fn staged_scaffold_appears_only_on_commit() {
        let root = tempfile::tempdir().unwrap();
        let generator = ScaffoldGenerator::new(root.path(), ".env");

        let staged = generator.stage_tenant_scaffold(&tenant(), "APP_NAME=app3\n").unwrap();
        assert!(!staged.target().exists());

        let dir = staged.commit().unwrap();
        assert!(dir.join(".env").is_file());
        assert_eq!(fs::read_dir(root.path().join("apps")).unwrap().count(), 1);
    }

    #[test]
    fn dropped_staged_scaffold_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let generator = ScaffoldGenerator::new(root.path(), ".env");

        drop(generator.stage_tenant_scaffold(&tenant(), "").unwrap());
        assert_eq!(fs::read_dir(root.path().join("apps")).unwrap().count(), 0);
    }

    #[test]
    fn commit_refuses_to_replace_existing_directory() {
        let root = tempfile::tempdir().unwrap();
        let generator = ScaffoldGenerator::new(root.path(), ".env");

        let staged = generator.stage_tenant_scaffold(&tenant(), "").unwrap();
        fs::create_dir_all(root.path().join("apps/app3")).unwrap();

        assert!(matches!(staged.commit(), Err(ProvisionError::Io { .. })));
        assert_eq!(fs::read_dir(root.path().join("apps")).unwrap().count(), 1);
    }
}
