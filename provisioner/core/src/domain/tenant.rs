// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant Identity
//!
//! - [`TenantName`]: validated name newtype. Construction is the naming rule.
//! - [`Tenant`]: a fully resolved tenant: allocated resources plus the
//!   identifiers derived from its name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::provisioning::ProvisionError;

/// Lowest port a tenant may bind. Everything below is privileged.
pub const MIN_TENANT_PORT: u32 = 1024;

/// Highest valid TCP port.
pub const MAX_TENANT_PORT: u32 = u16::MAX as u32;

/// Cache/queue brokers expose 16 logical databases by default (0..=15).
pub const MAX_CACHE_NAMESPACE: u32 = 15;

static TENANT_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("tenant name pattern is valid")
});

/// A tenant name that satisfies `^[a-z0-9][a-z0-9_-]*$`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantName(String);

impl TenantName {
    /// Parse a raw name, rejecting anything outside the naming pattern.
    pub fn parse(raw: &str) -> Result<Self, ProvisionError> {
        if raw.is_empty() {
            return Err(ProvisionError::InvalidFormat {
                name: raw.to_string(),
                reason: "name is empty".to_string(),
            });
        }

        if !TENANT_NAME_PATTERN.is_match(raw) {
            let reason = match raw.chars().next() {
                Some(first) if !(first.is_ascii_lowercase() || first.is_ascii_digit()) => {
                    format!("must start with a lowercase letter or digit, found '{}'", first)
                }
                _ => "only lowercase letters, digits, '-' and '_' are allowed".to_string(),
            };
            return Err(ProvisionError::InvalidFormat {
                name: raw.to_string(),
                reason,
            });
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantName {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantName> for String {
    fn from(name: TenantName) -> Self {
        name.0
    }
}

/// A tenant with every identifier resolved.
///
/// `port` and `cache_namespace` come from the allocator. The remaining fields
/// are derived from the name and never stored independently of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub name: TenantName,
    pub port: u16,
    pub cache_namespace: u8,
    pub database_name: String,
    pub queue_name: String,
    pub cache_prefix: String,
    /// Root-relative path of the tenant's working directory.
    pub directory: PathBuf,
}

impl Tenant {
    pub fn new(name: TenantName, port: u16, cache_namespace: u8, apps_dir: &Path) -> Self {
        let directory = apps_dir.join(name.as_str());
        Self {
            database_name: format!("{}_db", name),
            queue_name: name.to_string(),
            cache_prefix: format!("{}_cache_", name),
            directory,
            port,
            cache_namespace,
            name,
        }
    }
}
