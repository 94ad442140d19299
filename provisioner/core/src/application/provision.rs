// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Workflow
//!
//! Application service that takes a tenant name from request to a running
//! configuration.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Drive the provisioning state machine
//! - **Collaborators:**
//!   - Domain: `TenantName`, `ResourceAllocator`, `Document`, `verify_insertion`
//!   - Infrastructure: `RegistryReader`, `TemplateEngine`, `DocumentStore`,
//!     `ScaffoldGenerator`, `ProvisionLock`
//!
//! # Flow
//!
//! 1. Take the run lock and read both documents (Start)
//! 2. Validate the name (Validated)
//! 3. Allocate port and cache namespace (Allocated)
//! 4. Insert the worker service into the topology document (TopologyMutated)
//! 5. Insert the server block into the routing document (RoutingMutated)
//! 6. Create the tenant directory and descriptor (Scaffolded)
//! 7. Report the tenant and the manual follow-ups (Done)
//!
//! In [`CommitMode::Sequential`] each document is backed up and written as
//! its state is entered. In [`CommitMode::Staged`] both documents are
//! rendered and verified before the first write, so anchor and verification
//! failures never leave a document half-provisioned.
//!
//! # Error Handling
//!
//! Failures before the first write are returned as-is. Failures after the
//! backups but before any artifact changed are wrapped in
//! [`ProvisionError::Aborted`], later ones in [`ProvisionError::Partial`].
//! Nothing is rolled back.

use anyhow::Context;
use std::path::PathBuf;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::application::identity::IdentityValidator;
use crate::domain::allocation::ResourceAllocator;
use crate::domain::config::{CommitMode, ProvisionerConfig, ResolvedPaths};
use crate::domain::document::{verify_insertion, Anchor, Document, Section, SectionKind, TenantBlock};
use crate::domain::provisioning::{
    Artifact, ProvisionError, ProvisionReport, ProvisionState, RenderedPreview,
};
use crate::domain::registry::RegistryRules;
use crate::domain::routing;
use crate::domain::tenant::Tenant;
use crate::domain::topology::{
    TopologyView, ENV_APP_NAME, ENV_CACHE_NAMESPACE, ENV_CACHE_PREFIX, ENV_DATABASE, ENV_PORT,
    ENV_QUEUE,
};
use crate::infrastructure::document_store::DocumentStore;
use crate::infrastructure::lock::ProvisionLock;
use crate::infrastructure::registry_reader::{RegistryReader, RegistrySnapshot};
use crate::infrastructure::scaffold::ScaffoldGenerator;
use crate::infrastructure::template_engine::{TemplateEngine, TenantTemplateContext};

/// Input of a provisioning run.
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub name: String,
    /// Explicit port; allocated automatically when `None`.
    pub port: Option<u32>,
    /// Explicit cache namespace; allocated automatically when `None`.
    pub cache_namespace: Option<u32>,
    /// Validate, allocate and render without writing anything.
    pub dry_run: bool,
}

impl ProvisionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

pub struct ProvisioningWorkflow {
    config: ProvisionerConfig,
    paths: ResolvedPaths,
    rules: RegistryRules,
    topology_anchor: Anchor,
    routing_anchor: Anchor,
    reader: RegistryReader,
    templates: TemplateEngine,
    store: DocumentStore,
    scaffold: ScaffoldGenerator,
}

/// A document as read and the same document with the tenant block inserted.
struct Mutation {
    original: Document,
    updated: Document,
    block: TenantBlock,
}

/// Bookkeeping for the state machine.
struct Progress {
    state: ProvisionState,
    modified: Vec<Artifact>,
    backups: Vec<PathBuf>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: ProvisionState::Start,
            modified: Vec::new(),
            backups: Vec::new(),
        }
    }

    fn advance(&mut self, state: ProvisionState) {
        info!(from = %self.state, to = %state, "State transition");
        self.state = state;
    }

    /// Log the failure and attach what was already written, if anything.
    fn fail(&self, source: ProvisionError) -> ProvisionError {
        error!(
            reached = %self.state,
            state = %ProvisionState::Failed,
            error = %source,
            backups = self.backups.len(),
            "Provisioning failed"
        );
        if self.modified.is_empty() {
            if self.backups.is_empty() {
                return source;
            }
            return ProvisionError::Aborted {
                reached: self.state,
                backups: self.backups.clone(),
                source: Box::new(source),
            };
        }
        let untouched = Artifact::ALL
            .iter()
            .filter(|artifact| !self.modified.contains(artifact))
            .copied()
            .collect();
        ProvisionError::Partial {
            reached: self.state,
            modified: self.modified.clone(),
            untouched,
            backups: self.backups.clone(),
            source: Box::new(source),
        }
    }
}

impl ProvisioningWorkflow {
    /// Build a workflow from a configuration. The configuration is validated
    /// and template overrides are loaded here, so a bad setup fails before
    /// any run starts.
    pub fn new(config: ProvisionerConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid provisioner configuration")?;

        let paths = config.paths();
        let rules = config.registry_rules()?;
        let topology_anchor = config.topology_anchor()?;
        let routing_anchor = config.routing_anchor();
        let reader = RegistryReader::new(paths.clone(), rules.clone());
        let templates =
            TemplateEngine::from_config(&config).context("Failed to load tenant templates")?;
        let store = DocumentStore::new(paths.backup_dir.clone());
        let scaffold = ScaffoldGenerator::new(paths.root.clone(), config.spec.scaffold.env_file.clone());

        Ok(Self {
            config,
            paths,
            rules,
            topology_anchor,
            routing_anchor,
            reader,
            templates,
            store,
            scaffold,
        })
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.config.spec.commit.mode
    }

    /// Validation and allocation preview; never writes.
    pub fn check(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisionError> {
        self.run(&ProvisionRequest {
            dry_run: true,
            ..request.clone()
        })
    }

    /// Provision one tenant.
    pub fn run(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisionError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("provision", %run_id, tenant = %request.name);
        let _entered = span.enter();

        info!(
            mode = %self.commit_mode(),
            dry_run = request.dry_run,
            root = %self.paths.root.display(),
            "Starting provisioning run"
        );

        let mut progress = Progress::new();

        // A dry run writes nothing, not even the lock file.
        let _lock = if request.dry_run {
            None
        } else {
            Some(ProvisionLock::acquire(&self.paths.lock_file).map_err(|e| progress.fail(e))?)
        };

        let snapshot = self.reader.read().map_err(|e| progress.fail(e))?;

        let validator = IdentityValidator::new(self.paths.apps_dir.clone());
        let name = validator
            .validate(&request.name, &snapshot.registry)
            .map_err(|e| progress.fail(e))?;
        progress.advance(ProvisionState::Validated);

        let allocator = ResourceAllocator::new(&self.config.spec.allocation, &snapshot.registry);
        let port = allocator
            .allocate_port(request.port)
            .map_err(|e| progress.fail(e))?;
        let cache_namespace = allocator
            .allocate_cache_namespace(request.cache_namespace)
            .map_err(|e| progress.fail(e))?;
        let tenant = Tenant::new(name, port, cache_namespace, &self.config.spec.apps_dir);
        info!(port, cache_namespace, database = %tenant.database_name, "Resources allocated");
        progress.advance(ProvisionState::Allocated);

        let context = TenantTemplateContext::new(&tenant, &self.config);
        let topology_block = self
            .templates
            .render_topology_block(&context)
            .map_err(|e| progress.fail(e))?;
        let routing_block = self
            .templates
            .render_routing_block(&context)
            .map_err(|e| progress.fail(e))?;
        let env_descriptor = self
            .templates
            .render_env_descriptor(&context)
            .map_err(|e| progress.fail(e))?;

        if request.dry_run {
            let topology = self
                .mutate_topology(&snapshot, &tenant, &topology_block)
                .map_err(|e| progress.fail(e))?;
            let routing = self
                .mutate_routing(&snapshot, &tenant, &routing_block)
                .map_err(|e| progress.fail(e))?;
            info!("Dry run complete, nothing written");
            return Ok(self.report(
                run_id,
                tenant,
                ProvisionState::Allocated,
                true,
                progress,
                Some(RenderedPreview {
                    topology_block: topology.block.text(),
                    routing_block: routing.block.text(),
                    env_descriptor,
                }),
            ));
        }

        match self.commit_mode() {
            CommitMode::Sequential => self.commit_sequential(
                &snapshot,
                &tenant,
                &topology_block,
                &routing_block,
                &env_descriptor,
                &mut progress,
            )?,
            CommitMode::Staged => self.commit_staged(
                &snapshot,
                &tenant,
                &topology_block,
                &routing_block,
                &env_descriptor,
                &mut progress,
            )?,
        }

        progress.advance(ProvisionState::Done);
        info!(port = tenant.port, cache_namespace = tenant.cache_namespace, "Tenant provisioned");
        Ok(self.report(run_id, tenant, ProvisionState::Done, false, progress, None))
    }

    /// Each document is backed up, mutated and written as its state is entered.
    fn commit_sequential(
        &self,
        snapshot: &RegistrySnapshot,
        tenant: &Tenant,
        topology_block: &str,
        routing_block: &str,
        env_descriptor: &str,
        progress: &mut Progress,
    ) -> Result<(), ProvisionError> {
        let topology = self
            .mutate_topology(snapshot, tenant, topology_block)
            .map_err(|e| progress.fail(e))?;
        self.write_document(&topology, Artifact::TopologyDocument, progress)?;
        progress.advance(ProvisionState::TopologyMutated);

        let routing = self
            .mutate_routing(snapshot, tenant, routing_block)
            .map_err(|e| progress.fail(e))?;
        self.write_document(&routing, Artifact::RoutingDocument, progress)?;
        progress.advance(ProvisionState::RoutingMutated);

        if let Err(e) = self.scaffold.create_tenant_scaffold(tenant, env_descriptor) {
            if self.scaffold.directory_of(tenant).exists() {
                progress.modified.push(Artifact::TenantDirectory);
            }
            return Err(progress.fail(e));
        }
        progress.modified.push(Artifact::TenantDirectory);
        progress.advance(ProvisionState::Scaffolded);
        Ok(())
    }

    /// Render and verify both documents, stage every write, then rename.
    fn commit_staged(
        &self,
        snapshot: &RegistrySnapshot,
        tenant: &Tenant,
        topology_block: &str,
        routing_block: &str,
        env_descriptor: &str,
        progress: &mut Progress,
    ) -> Result<(), ProvisionError> {
        let topology = self
            .mutate_topology(snapshot, tenant, topology_block)
            .map_err(|e| progress.fail(e))?;
        let routing = self
            .mutate_routing(snapshot, tenant, routing_block)
            .map_err(|e| progress.fail(e))?;

        for mutation in [&topology, &routing] {
            let backup = self
                .store
                .backup(mutation.original.path(), &mutation.original.render())
                .map_err(|e| progress.fail(e))?;
            progress.backups.push(backup);
        }

        let staged_topology = self
            .store
            .stage(topology.updated.path(), &topology.updated.render())
            .map_err(|e| progress.fail(e))?;
        let staged_routing = self
            .store
            .stage(routing.updated.path(), &routing.updated.render())
            .map_err(|e| progress.fail(e))?;
        let staged_scaffold = self
            .scaffold
            .stage_tenant_scaffold(tenant, env_descriptor)
            .map_err(|e| progress.fail(e))?;

        staged_topology.commit().map_err(|e| progress.fail(e))?;
        progress.modified.push(Artifact::TopologyDocument);
        progress.advance(ProvisionState::TopologyMutated);

        staged_routing.commit().map_err(|e| progress.fail(e))?;
        progress.modified.push(Artifact::RoutingDocument);
        progress.advance(ProvisionState::RoutingMutated);

        staged_scaffold.commit().map_err(|e| progress.fail(e))?;
        progress.modified.push(Artifact::TenantDirectory);
        progress.advance(ProvisionState::Scaffolded);
        Ok(())
    }

    /// Back up the original, then replace it with the updated document. A
    /// failed backup aborts before the original is touched.
    fn write_document(
        &self,
        mutation: &Mutation,
        artifact: Artifact,
        progress: &mut Progress,
    ) -> Result<(), ProvisionError> {
        let path = mutation.original.path();
        let backup = self
            .store
            .backup(path, &mutation.original.render())
            .map_err(|e| progress.fail(e))?;
        progress.backups.push(backup);

        self.store
            .write_atomic(path, &mutation.updated.render())
            .map_err(|e| progress.fail(e))?;
        progress.modified.push(artifact);
        Ok(())
    }

    fn mutate_topology(
        &self,
        snapshot: &RegistrySnapshot,
        tenant: &Tenant,
        rendered: &str,
    ) -> Result<Mutation, ProvisionError> {
        let worker_service = self.config.worker_service(tenant.name.as_str());
        let is_tenant_entry = |section: &Section| {
            matches!(&section.kind, SectionKind::Service { name } if *name == worker_service)
        };
        let mutation = insert(&snapshot.topology, &self.topology_anchor, rendered, is_tenant_entry)?;

        let invalid = |reason: String| ProvisionError::InvalidDocument {
            path: mutation.updated.path().to_path_buf(),
            reason,
        };
        let view = TopologyView::parse(&mutation.updated.render()).map_err(|e| invalid(e.to_string()))?;
        let service = view
            .service(&worker_service)
            .ok_or_else(|| invalid(format!("service '{worker_service}' missing after insertion")))?;

        let port = tenant.port.to_string();
        let cache_namespace = tenant.cache_namespace.to_string();
        let expected = [
            (ENV_APP_NAME, tenant.name.as_str()),
            (ENV_PORT, port.as_str()),
            (ENV_DATABASE, tenant.database_name.as_str()),
            (ENV_CACHE_NAMESPACE, cache_namespace.as_str()),
            (ENV_CACHE_PREFIX, tenant.cache_prefix.as_str()),
            (ENV_QUEUE, tenant.queue_name.as_str()),
        ];
        for (key, value) in expected {
            if service.env_str(key).map(str::trim) != Some(value) {
                return Err(invalid(format!(
                    "service '{worker_service}' does not declare {key}={value:?} (found {:?})",
                    service.env_str(key)
                )));
            }
        }
        Ok(mutation)
    }

    fn mutate_routing(
        &self,
        snapshot: &RegistrySnapshot,
        tenant: &Tenant,
        rendered: &str,
    ) -> Result<Mutation, ProvisionError> {
        let name = tenant.name.as_str();
        let is_tenant_entry = |section: &Section| match &section.kind {
            SectionKind::Server { root: Some(root), .. } => {
                self.rules.document_root.tenant_of(root).as_deref() == Some(name)
            }
            _ => false,
        };
        let mutation = insert(&snapshot.routing, &self.routing_anchor, rendered, is_tenant_entry)?;

        let invalid = |reason: String| ProvisionError::InvalidDocument {
            path: mutation.updated.path().to_path_buf(),
            reason,
        };
        routing::check_balance(mutation.updated.lines()).map_err(&invalid)?;
        let listens_on_port = mutation.updated.sections().iter().any(|section| {
            is_tenant_entry(section)
                && matches!(&section.kind, SectionKind::Server { listen, .. } if listen.contains(&tenant.port))
        });
        if !listens_on_port {
            return Err(invalid(format!(
                "server block for '{name}' does not listen on port {}",
                tenant.port
            )));
        }
        Ok(mutation)
    }

    fn report(
        &self,
        run_id: Uuid,
        tenant: Tenant,
        final_state: ProvisionState,
        dry_run: bool,
        progress: Progress,
        preview: Option<RenderedPreview>,
    ) -> ProvisionReport {
        let worker_service = self.config.worker_service(tenant.name.as_str());
        ProvisionReport {
            run_id,
            next_steps: ProvisionReport::next_steps_for(&tenant, &worker_service),
            tenant,
            final_state,
            dry_run,
            modified: progress.modified,
            backups: progress.backups,
            preview,
        }
    }
}

/// Splice `rendered` in before `anchor` and check that nothing but the new
/// tenant entry changed.
fn insert(
    original: &Document,
    anchor: &Anchor,
    rendered: &str,
    is_tenant_entry: impl Fn(&Section) -> bool,
) -> Result<Mutation, ProvisionError> {
    let block = TenantBlock::from_rendered(rendered, &original.entry_indent(), original.line_ending());
    if block.is_empty() {
        return Err(ProvisionError::Template {
            template: original.kind().to_string(),
            reason: "rendered block is empty".to_string(),
        });
    }

    let mut updated = original.clone();
    let at = updated.insert_before_anchor(anchor, &block)?;
    verify_insertion(original, &updated, is_tenant_entry)?;

    info!(
        document = %original.path().display(),
        line = at + 1,
        lines = block.lines().len(),
        "Tenant block inserted"
    );

    Ok(Mutation {
        original: original.clone(),
        updated,
        block,
    })
}
