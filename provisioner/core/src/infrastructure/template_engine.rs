// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tenant Template Engine
//!
//! Renders the per-tenant blocks with Handlebars.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn a resolved [`Tenant`] into the topology block, the
//!   routing block and the environment descriptor
//! - **Integration:** Provisioning workflow → Document Mutator / Scaffold Generator
//!
//! # Supported Placeholders
//!
//! - `{{name}}`, `{{worker_service}}`, `{{worker_image}}`, `{{directory}}`
//! - `{{port}}`, `{{app_url}}`, `{{document_root}}`, `{{tenant_root}}`, `{{pool_address}}`
//! - `{{database_host}}`, `{{database_name}}`
//! - `{{cache_host}}`, `{{cache_namespace}}`, `{{cache_prefix}}`, `{{queue_name}}`
//!
//! Built-in templates live under `templates/` and can be replaced per
//! deployment through `spec.templates` in the provisioner config. Rendering is
//! strict, so a template referencing an unknown placeholder fails instead of
//! producing a block with holes in it.

use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

use crate::domain::config::{ProvisionerConfig, TemplateOverrides};
use crate::domain::provisioning::ProvisionError;
use crate::domain::routing;
use crate::domain::tenant::Tenant;

pub const TOPOLOGY_BLOCK: &str = "topology-block";
pub const ROUTING_BLOCK: &str = "routing-block";
pub const ENV_DESCRIPTOR: &str = "env-descriptor";

const BUILTIN_TOPOLOGY_BLOCK: &str = include_str!("../../templates/topology-block.yaml.hbs");
const BUILTIN_ROUTING_BLOCK: &str = include_str!("../../templates/routing-block.conf.hbs");
const BUILTIN_ENV_DESCRIPTOR: &str = include_str!("../../templates/tenant.env.hbs");

// ============================================================================
// Template Context
// ============================================================================

/// Values available to every tenant template.
#[derive(Debug, Clone, Serialize)]
pub struct TenantTemplateContext {
    pub name: String,
    pub worker_service: String,
    pub worker_image: String,
    /// Root-relative tenant directory, always with `/` separators
    pub directory: String,
    pub port: u16,
    pub app_url: String,
    pub document_root: String,
    /// Mount point of the tenant directory, the part of `document_root`
    /// that ends at the tenant name
    pub tenant_root: String,
    pub pool_address: String,
    pub database_host: String,
    pub database_name: String,
    pub cache_host: String,
    pub cache_namespace: u8,
    pub cache_prefix: String,
    pub queue_name: String,
}

impl TenantTemplateContext {
    pub fn new(tenant: &Tenant, config: &ProvisionerConfig) -> Self {
        let spec = &config.spec;
        let name = tenant.name.to_string();
        let directory = tenant
            .directory
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Self {
            worker_service: config.worker_service(&name),
            worker_image: spec.topology.worker_image.clone(),
            directory,
            port: tenant.port,
            app_url: format!("http://{}:{}", spec.scaffold.app_host, tenant.port),
            document_root: spec.routing.document_root.replace("{name}", &name),
            tenant_root: routing::tenant_root(&spec.routing.document_root, &name),
            pool_address: spec.routing.pool_address.clone(),
            database_host: spec.scaffold.database_host.clone(),
            database_name: tenant.database_name.clone(),
            cache_host: spec.scaffold.cache_host.clone(),
            cache_namespace: tenant.cache_namespace,
            cache_prefix: tenant.cache_prefix.clone(),
            queue_name: tenant.queue_name.clone(),
            name,
        }
    }
}

// ============================================================================
// Template Engine
// ============================================================================

pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    /// Engine with the built-in templates only.
    pub fn new() -> Result<Self, ProvisionError> {
        Self::with_overrides(&TemplateOverrides::default(), Path::new("."))
    }

    /// Engine with the built-in templates, replaced by any override files.
    /// Relative override paths resolve against `root`.
    pub fn with_overrides(overrides: &TemplateOverrides, root: &Path) -> Result<Self, ProvisionError> {
        let mut handlebars = Handlebars::new();

        // Output is YAML and nginx config, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        let sources = [
            (TOPOLOGY_BLOCK, &overrides.topology_block, BUILTIN_TOPOLOGY_BLOCK),
            (ROUTING_BLOCK, &overrides.routing_block, BUILTIN_ROUTING_BLOCK),
            (ENV_DESCRIPTOR, &overrides.env_descriptor, BUILTIN_ENV_DESCRIPTOR),
        ];

        for (name, override_path, builtin) in sources {
            let source = match override_path {
                Some(path) => {
                    let path = root.join(path);
                    tracing::debug!(template = name, path = %path.display(), "Using template override");
                    std::fs::read_to_string(&path).map_err(|e| ProvisionError::io(&path, e))?
                }
                None => builtin.to_string(),
            };
            handlebars
                .register_template_string(name, source)
                .map_err(|e| ProvisionError::Template {
                    template: name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        Ok(Self { handlebars })
    }

    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ProvisionError> {
        Self::with_overrides(&config.spec.templates, &config.spec.root)
    }

    pub fn render_topology_block(&self, context: &TenantTemplateContext) -> Result<String, ProvisionError> {
        self.render(TOPOLOGY_BLOCK, context)
    }

    pub fn render_routing_block(&self, context: &TenantTemplateContext) -> Result<String, ProvisionError> {
        self.render(ROUTING_BLOCK, context)
    }

    pub fn render_env_descriptor(&self, context: &TenantTemplateContext) -> Result<String, ProvisionError> {
        self.render(ENV_DESCRIPTOR, context)
    }

    fn render(&self, name: &str, context: &TenantTemplateContext) -> Result<String, ProvisionError> {
        self.handlebars
            .render(name, context)
            .map_err(|e| ProvisionError::Template {
                template: name.to_string(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
