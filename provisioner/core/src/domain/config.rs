// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Configuration Types
//
// Defines the configuration schema for the tenant provisioner, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Locations of the topology and routing documents and the apps directory
// - Anchors and naming conventions used to recognise tenant entries
// - Allocation bounds and commit mode
// - Scaffold defaults and template overrides

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::allocation::AllocationPolicy;
use crate::domain::document::Anchor;
use crate::domain::registry::RegistryRules;
use crate::domain::routing::DocumentRootPattern;

pub const API_VERSION: &str = "tenancy/v1";
pub const KIND: &str = "ProvisionerConfig";
pub const CONFIG_PATH_ENV: &str = "TENANCY_CONFIG_PATH";
pub const ROOT_ENV: &str = "TENANCY_ROOT";
pub const COMMIT_MODE_ENV: &str = "TENANCY_COMMIT_MODE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid apiVersion '{0}', must be 'tenancy/v1'")]
    ApiVersion(String),

    #[error("invalid kind '{0}', must be 'ProvisionerConfig'")]
    Kind(String),

    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("topology anchor '{pattern}' is not a valid regex: {reason}")]
    Anchor { pattern: String, reason: String },

    #[error("routing.document_root: {0}")]
    DocumentRoot(String),

    #[error("allocation.first_tenant_port {first} must be at least 1024 and below port_ceiling {ceiling}")]
    PortBounds { first: u16, ceiling: u16 },

    #[error("allocation.max_cache_namespace {0} exceeds 15")]
    NamespaceBound(u8),

    #[error("unknown commit mode '{0}', expected 'staged' or 'sequential'")]
    CommitMode(String),
}

/// Top-level Kubernetes-style provisioner manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: ProvisionerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Human-readable name of the deployment this config describes
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerSpec {
    /// Project root every other path is relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory holding one subdirectory per tenant
    #[serde(default = "default_apps_dir")]
    pub apps_dir: PathBuf,

    #[serde(default)]
    pub topology: TopologyDocumentConfig,

    #[serde(default)]
    pub routing: RoutingDocumentConfig,

    #[serde(default)]
    pub allocation: AllocationPolicy,

    #[serde(default)]
    pub commit: CommitConfig,

    #[serde(default)]
    pub scaffold: ScaffoldConfig,

    #[serde(default)]
    pub templates: TemplateOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyDocumentConfig {
    #[serde(default = "default_topology_path")]
    pub path: PathBuf,

    /// Regex for the line that opens the shared-infrastructure section
    #[serde(default = "default_topology_anchor")]
    pub anchor: String,

    /// Tenant worker services are named `{worker_prefix}{tenant}`
    #[serde(default = "default_worker_prefix")]
    pub worker_prefix: String,

    /// Image used by generated worker services
    #[serde(default = "default_worker_image")]
    pub worker_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDocumentConfig {
    #[serde(default = "default_routing_path")]
    pub path: PathBuf,

    /// Document root with a `{name}` placeholder
    #[serde(default = "default_document_root")]
    pub document_root: String,

    /// Address of the shared execution pool requests are forwarded to
    #[serde(default = "default_pool_address")]
    pub pool_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Render and verify both documents before writing anything, then
    /// rename them into place.
    #[default]
    Staged,
    /// Snapshot and write each document as its state is entered.
    Sequential,
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staged => f.write_str("staged"),
            Self::Sequential => f.write_str("sequential"),
        }
    }
}

impl FromStr for CommitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staged" => Ok(Self::Staged),
            "sequential" => Ok(Self::Sequential),
            other => Err(ConfigError::CommitMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitConfig {
    #[serde(default)]
    pub mode: CommitMode,

    /// Where backups go. Defaults to next to each document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldConfig {
    /// File name of the environment descriptor written into the tenant directory
    #[serde(default = "default_env_file")]
    pub env_file: String,

    #[serde(default = "default_database_host")]
    pub database_host: String,

    #[serde(default = "default_cache_host")]
    pub cache_host: String,

    /// Host used to build `APP_URL`
    #[serde(default = "default_app_host")]
    pub app_host: String,
}

/// Paths to Handlebars templates replacing the built-in ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_block: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_block: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_descriptor: Option<PathBuf>,
}

/// Absolute (root-joined) locations of everything a run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub root: PathBuf,
    pub apps_dir: PathBuf,
    pub topology: PathBuf,
    pub routing: PathBuf,
    pub backup_dir: Option<PathBuf>,
    pub lock_file: PathBuf,
}

pub const LOCK_FILE_NAME: &str = ".tenancy.lock";

impl Default for ProvisionerSpec {
    fn default() -> Self {
        Self {
            root: default_root(),
            apps_dir: default_apps_dir(),
            topology: TopologyDocumentConfig::default(),
            routing: RoutingDocumentConfig::default(),
            allocation: AllocationPolicy::default(),
            commit: CommitConfig::default(),
            scaffold: ScaffoldConfig::default(),
            templates: TemplateOverrides::default(),
        }
    }
}

impl Default for TopologyDocumentConfig {
    fn default() -> Self {
        Self {
            path: default_topology_path(),
            anchor: default_topology_anchor(),
            worker_prefix: default_worker_prefix(),
            worker_image: default_worker_image(),
        }
    }
}

impl Default for RoutingDocumentConfig {
    fn default() -> Self {
        Self {
            path: default_routing_path(),
            document_root: default_document_root(),
            pool_address: default_pool_address(),
        }
    }
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            database_host: default_database_host(),
            cache_host: default_cache_host(),
            app_host: default_app_host(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "local".to_string(),
            },
            spec: ProvisionerSpec::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. TENANCY_CONFIG_PATH environment variable
    /// 2. ./tenancy.yaml (working directory)
    /// 3. ~/.tenancy/config.yaml (user home)
    /// 4. /etc/tenancy/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./tenancy.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tenancy").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/tenancy/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(ROOT_ENV) {
            if !root.trim().is_empty() {
                tracing::info!("Environment override: {}={}", ROOT_ENV, root);
                self.spec.root = PathBuf::from(root);
            }
        }

        if let Ok(val) = std::env::var(COMMIT_MODE_ENV) {
            match val.parse::<CommitMode>() {
                Ok(mode) => {
                    tracing::info!("Environment override: {}={}", COMMIT_MODE_ENV, mode);
                    self.spec.commit.mode = mode;
                }
                Err(e) => {
                    tracing::warn!("Ignoring {}: {}", COMMIT_MODE_ENV, e);
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::ApiVersion(self.api_version.clone()));
        }
        if self.kind != KIND {
            return Err(ConfigError::Kind(self.kind.clone()));
        }
        if self.metadata.name.is_empty() {
            return Err(ConfigError::Empty { field: "metadata.name" });
        }

        let spec = &self.spec;
        if spec.apps_dir.as_os_str().is_empty() {
            return Err(ConfigError::Empty { field: "spec.apps_dir" });
        }
        if spec.topology.path.as_os_str().is_empty() {
            return Err(ConfigError::Empty { field: "spec.topology.path" });
        }
        if spec.routing.path.as_os_str().is_empty() {
            return Err(ConfigError::Empty { field: "spec.routing.path" });
        }
        if spec.topology.worker_prefix.is_empty() {
            return Err(ConfigError::Empty { field: "spec.topology.worker_prefix" });
        }
        if spec.scaffold.env_file.is_empty() {
            return Err(ConfigError::Empty { field: "spec.scaffold.env_file" });
        }

        self.topology_anchor()?;
        self.registry_rules()?;

        let allocation = &spec.allocation;
        if allocation.first_tenant_port < 1024
            || allocation.first_tenant_port >= allocation.port_ceiling
        {
            return Err(ConfigError::PortBounds {
                first: allocation.first_tenant_port,
                ceiling: allocation.port_ceiling,
            });
        }
        if allocation.max_cache_namespace > 15 {
            return Err(ConfigError::NamespaceBound(allocation.max_cache_namespace));
        }

        Ok(())
    }

    pub fn topology_anchor(&self) -> Result<Anchor, ConfigError> {
        Regex::new(&self.spec.topology.anchor)
            .map(Anchor::Line)
            .map_err(|e| ConfigError::Anchor {
                pattern: self.spec.topology.anchor.clone(),
                reason: e.to_string(),
            })
    }

    pub fn routing_anchor(&self) -> Anchor {
        Anchor::FinalClosingDelimiter
    }

    pub fn registry_rules(&self) -> Result<RegistryRules, ConfigError> {
        Ok(RegistryRules {
            worker_prefix: self.spec.topology.worker_prefix.clone(),
            document_root: DocumentRootPattern::new(&self.spec.routing.document_root)
                .map_err(ConfigError::DocumentRoot)?,
        })
    }

    pub fn paths(&self) -> ResolvedPaths {
        let root = self.spec.root.clone();
        ResolvedPaths {
            apps_dir: root.join(&self.spec.apps_dir),
            topology: root.join(&self.spec.topology.path),
            routing: root.join(&self.spec.routing.path),
            backup_dir: self.spec.commit.backup_dir.as_ref().map(|dir| root.join(dir)),
            lock_file: root.join(LOCK_FILE_NAME),
            root,
        }
    }

    /// Service name of a tenant's worker
    pub fn worker_service(&self, tenant: &str) -> String {
        format!("{}{}", self.spec.topology.worker_prefix, tenant)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_apps_dir() -> PathBuf {
    PathBuf::from("apps")
}

fn default_topology_path() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_topology_anchor() -> String {
    r"^\s*#\s*Shared infrastructure".to_string()
}

fn default_worker_prefix() -> String {
    "worker-".to_string()
}

fn default_worker_image() -> String {
    "tenant-runtime:latest".to_string()
}

fn default_routing_path() -> PathBuf {
    PathBuf::from("docker/nginx/nginx.conf")
}

fn default_document_root() -> String {
    "/var/www/{name}/public".to_string()
}

fn default_pool_address() -> String {
    "php-fpm:9000".to_string()
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_database_host() -> String {
    "mysql".to_string()
}

fn default_cache_host() -> String {
    "redis".to_string()
}

fn default_app_host() -> String {
    "localhost".to_string()
}
