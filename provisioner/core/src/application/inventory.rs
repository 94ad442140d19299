// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tenant Inventory
//!
//! Lists the tenants the registry can see and flags drift: a tenant present
//! in one document but not the other, or in the documents without a
//! directory.

use serde::Serialize;

use crate::domain::config::ProvisionerConfig;
use crate::domain::provisioning::ProvisionError;
use crate::domain::registry::TenantRecord;
use crate::infrastructure::registry_reader::RegistryReader;

#[derive(Debug, Clone, Serialize)]
pub struct TenantListing {
    pub tenants: Vec<TenantRecord>,
    /// Names of tenants missing from at least one location.
    pub drifted: Vec<String>,
}

pub struct TenantInventory {
    reader: RegistryReader,
}

impl TenantInventory {
    pub fn new(config: &ProvisionerConfig) -> Result<Self, ProvisionError> {
        Ok(Self {
            reader: RegistryReader::from_config(config)?,
        })
    }

    pub fn list(&self) -> Result<TenantListing, ProvisionError> {
        let snapshot = self.reader.read()?;
        let tenants: Vec<TenantRecord> = snapshot.registry.tenants().cloned().collect();
        let drifted = tenants
            .iter()
            .filter(|record| !record.is_complete())
            .map(|record| record.name.clone())
            .collect();
        Ok(TenantListing { tenants, drifted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reports_incomplete_tenants_as_drift() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("docker-compose.yml"),
            "services:\n  worker-app1:\n    environment:\n      APP_PORT: 8081\n  worker-app2:\n    environment:\n      APP_PORT: 8082\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("docker/nginx")).unwrap();
        fs::write(
            dir.path().join("docker/nginx/nginx.conf"),
            "http {\n    server {\n        listen 8081;\n        root /var/www/app1/public;\n    }\n}\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("apps/app1")).unwrap();

        let mut config = ProvisionerConfig::default();
        config.spec.root = dir.path().to_path_buf();

        let listing = TenantInventory::new(&config).unwrap().list().unwrap();
        let names: Vec<&str> = listing.tenants.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["app1", "app2"]);
        assert_eq!(listing.drifted, vec!["app2".to_string()]);
        assert_eq!(listing.tenants[1].port, Some(8082));
    }
}
