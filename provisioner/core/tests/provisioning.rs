// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end provisioning runs against a copy of the fixture stack.

use std::fs;
use std::path::{Path, PathBuf};

use tenancy_core::application::{ProvisionRequest, ProvisioningWorkflow};
use tenancy_core::domain::config::LOCK_FILE_NAME;
use tenancy_core::domain::topology::{
    TopologyView, ENV_APP_NAME, ENV_CACHE_NAMESPACE, ENV_CACHE_PREFIX, ENV_DATABASE, ENV_PORT,
    ENV_QUEUE,
};
use tenancy_core::{
    Artifact, CommitMode, ProvisionError, ProvisionState, ProvisionerConfig, Resource,
};

const COMPOSE: &str = include_str!("fixtures/docker-compose.yml");
const NGINX: &str = include_str!("fixtures/nginx.conf");
const TOPOLOGY_ANCHOR: &str = "  # Shared infrastructure\n";

struct Stack {
    dir: tempfile::TempDir,
}

impl Stack {
    fn new() -> Self {
        Self::with_documents(COMPOSE, NGINX)
    }

    fn with_documents(compose: &str, nginx: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("docker-compose.yml"), compose).unwrap();
        fs::create_dir_all(dir.path().join("docker/nginx")).unwrap();
        fs::write(dir.path().join("docker/nginx/nginx.conf"), nginx).unwrap();
        fs::create_dir_all(dir.path().join("apps/app1")).unwrap();
        fs::create_dir_all(dir.path().join("apps/app2")).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self, mode: CommitMode) -> ProvisionerConfig {
        let mut config = ProvisionerConfig::default();
        config.spec.root = self.root().to_path_buf();
        config.spec.commit.mode = mode;
        config
    }

    fn workflow(&self, mode: CommitMode) -> ProvisioningWorkflow {
        ProvisioningWorkflow::new(self.config(mode)).unwrap()
    }

    fn topology(&self) -> String {
        fs::read_to_string(self.root().join("docker-compose.yml")).unwrap()
    }

    fn routing(&self) -> String {
        fs::read_to_string(self.root().join("docker/nginx/nginx.conf")).unwrap()
    }

    fn backups(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in [self.root().to_path_buf(), self.root().join("docker/nginx")] {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.file_name().unwrap().to_string_lossy().contains(".bak.") {
                    found.push(path);
                }
            }
        }
        found.sort();
        found
    }

    fn tenant_dir(&self, name: &str) -> PathBuf {
        self.root().join("apps").join(name)
    }
}

fn request(name: &str) -> ProvisionRequest {
    ProvisionRequest::new(name)
}

/// Environment of a tenant's worker service, read back from the written
/// topology document.
fn worker_environment(topology: &str, name: &str) -> Vec<(&'static str, String)> {
    let view = TopologyView::parse(topology).unwrap();
    let service = view
        .service(&format!("worker-{name}"))
        .unwrap_or_else(|| panic!("worker-{name} missing"));
    [ENV_APP_NAME, ENV_PORT, ENV_DATABASE, ENV_CACHE_NAMESPACE, ENV_CACHE_PREFIX, ENV_QUEUE]
        .into_iter()
        .map(|key| (key, service.env_str(key).unwrap_or_default().to_string()))
        .collect()
}

#[test]
fn provisions_next_tenant_with_next_free_port_and_namespace() {
    let stack = Stack::new();
    let report = stack.workflow(CommitMode::Staged).run(&request("app3")).unwrap();

    assert_eq!(report.final_state, ProvisionState::Done);
    assert_eq!(report.tenant.port, 8082);
    assert_eq!(report.tenant.cache_namespace, 2);
    assert_eq!(report.tenant.database_name, "app3_db");
    assert_eq!(report.tenant.cache_prefix, "app3_cache_");
    assert_eq!(report.tenant.queue_name, "app3");
    assert_eq!(report.modified, Artifact::ALL.to_vec());
    assert_eq!(report.next_steps.len(), 4);
    assert!(report.next_steps[1].contains("CREATE DATABASE `app3_db`"));

    let topology = stack.topology();
    assert!(topology.contains("  worker-app3:\n"));
    assert_eq!(
        worker_environment(&topology, "app3"),
        vec![
            (ENV_APP_NAME, "app3".to_string()),
            (ENV_PORT, "8082".to_string()),
            (ENV_DATABASE, "app3_db".to_string()),
            (ENV_CACHE_NAMESPACE, "2".to_string()),
            (ENV_CACHE_PREFIX, "app3_cache_".to_string()),
            (ENV_QUEUE, "app3".to_string()),
        ]
    );

    let routing = stack.routing();
    assert!(routing.contains("        listen 8082;\n"));
    assert!(routing.contains("        root /var/www/app3/public;\n"));

    let env = fs::read_to_string(stack.tenant_dir("app3").join(".env")).unwrap();
    for line in [
        "APP_NAME=app3",
        "APP_PORT=8082",
        "APP_URL=http://localhost:8082",
        "DB_HOST=mysql",
        "DB_DATABASE=app3_db",
        "REDIS_HOST=redis",
        "REDIS_DB=2",
        "CACHE_PREFIX=app3_cache_",
        "REDIS_QUEUE=app3",
    ] {
        assert!(env.lines().any(|l| l == line), "descriptor missing {line}");
    }
}

#[test]
fn yaml_keyword_and_numeric_names_keep_their_own_identifiers() {
    let stack = Stack::new();
    let workflow = stack.workflow(CommitMode::Staged);

    for name in ["0x10", "null", "1e3", "16"] {
        let report = workflow.run(&request(name)).unwrap();
        assert_eq!(report.tenant.queue_name, name);

        let environment = worker_environment(&stack.topology(), name);
        let value_of = |key: &str| {
            environment
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(value_of(ENV_APP_NAME), name);
        assert_eq!(value_of(ENV_QUEUE), name);
        assert_eq!(value_of(ENV_DATABASE), format!("{name}_db"));
        assert_eq!(value_of(ENV_CACHE_PREFIX), format!("{name}_cache_"));
    }

    // Distinct tenants, distinct queues: `0x10` is not read back as 16.
    let view = TopologyView::parse(&stack.topology()).unwrap();
    let queues: std::collections::BTreeSet<_> = ["0x10", "16"]
        .iter()
        .map(|name| {
            view.service(&format!("worker-{name}"))
                .unwrap()
                .env_str(ENV_QUEUE)
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(queues.len(), 2);
}

#[test]
fn overridden_template_with_unquoted_identifiers_is_rejected() {
    let stack = Stack::new();
    let builtin = include_str!("../templates/topology-block.yaml.hbs");
    fs::write(
        stack.root().join("topology.hbs"),
        builtin.replace("REDIS_QUEUE: \"{{queue_name}}\"", "REDIS_QUEUE: {{queue_name}}"),
    )
    .unwrap();
    let mut config = stack.config(CommitMode::Staged);
    config.spec.templates.topology_block = Some(PathBuf::from("topology.hbs"));
    let workflow = ProvisioningWorkflow::new(config).unwrap();

    match workflow.run(&request("0x10")).unwrap_err() {
        ProvisionError::InvalidDocument { reason, .. } => {
            assert!(reason.contains(ENV_QUEUE), "{reason}");
        }
        other => panic!("expected InvalidDocument, got {other:?}"),
    }
    assert_eq!(stack.topology(), COMPOSE);
    assert!(stack.backups().is_empty());

    // Plain names still go through with the same template.
    workflow.run(&request("app3")).unwrap();
}

#[test]
fn insertion_preserves_every_existing_byte() {
    let stack = Stack::new();
    stack.workflow(CommitMode::Staged).run(&request("app3")).unwrap();

    let split = COMPOSE.find(TOPOLOGY_ANCHOR).unwrap();
    let topology = stack.topology();
    assert!(topology.starts_with(&COMPOSE[..split]));
    assert!(topology.ends_with(&COMPOSE[split..]));
    let inserted = &topology[split..topology.len() - (COMPOSE.len() - split)];
    assert!(inserted.starts_with("  # Tenant: app3\n  worker-app3:\n"));

    let split = NGINX.rfind("}\n").unwrap();
    let routing = stack.routing();
    assert!(routing.starts_with(&NGINX[..split]));
    assert!(routing.ends_with(&NGINX[split..]));
    let inserted = &routing[split..routing.len() - (NGINX.len() - split)];
    assert!(inserted.starts_with("    # Tenant: app3\n    server {\n"));
}

#[test]
fn backups_are_byte_identical_to_the_originals() {
    let stack = Stack::new();
    let report = stack.workflow(CommitMode::Staged).run(&request("app3")).unwrap();

    assert_eq!(report.backups.len(), 2);
    assert_eq!(stack.backups().len(), 2);

    let compose_backup = report
        .backups
        .iter()
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("docker-compose.yml.bak."))
        .unwrap();
    let nginx_backup = report
        .backups
        .iter()
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("nginx.conf.bak."))
        .unwrap();
    assert_eq!(fs::read_to_string(compose_backup).unwrap(), COMPOSE);
    assert_eq!(fs::read_to_string(nginx_backup).unwrap(), NGINX);
}

#[test]
fn consecutive_runs_allocate_from_the_updated_documents() {
    let stack = Stack::new();
    let workflow = stack.workflow(CommitMode::Sequential);

    let app3 = workflow.run(&request("app3")).unwrap();
    let app4 = workflow.run(&request("app4")).unwrap();

    assert_eq!((app3.tenant.port, app3.tenant.cache_namespace), (8082, 2));
    assert_eq!((app4.tenant.port, app4.tenant.cache_namespace), (8083, 3));
    assert_eq!(stack.backups().len(), 4);

    // app3 is now registered, so provisioning it again is refused.
    fs::remove_dir_all(stack.tenant_dir("app3")).unwrap();
    assert!(matches!(
        workflow.run(&request("app3")),
        Err(ProvisionError::AlreadyExists { .. })
    ));
}

#[test]
fn invalid_name_is_rejected_without_side_effects() {
    let stack = Stack::new();
    let err = stack.workflow(CommitMode::Staged).run(&request("Admin")).unwrap_err();

    assert!(matches!(err, ProvisionError::InvalidFormat { .. }));
    assert!(err.is_side_effect_free());
    assert_eq!(stack.topology(), COMPOSE);
    assert_eq!(stack.routing(), NGINX);
    assert!(stack.backups().is_empty());
}

#[test]
fn existing_tenant_directory_is_rejected() {
    let stack = Stack::new();
    let err = stack.workflow(CommitMode::Staged).run(&request("app2")).unwrap_err();

    assert!(matches!(err, ProvisionError::AlreadyExists { .. }));
    assert_eq!(stack.topology(), COMPOSE);
    assert!(stack.backups().is_empty());
}

#[test]
fn explicit_values_are_validated_not_overwritten() {
    let stack = Stack::new();
    let workflow = stack.workflow(CommitMode::Staged);

    let conflict = workflow
        .run(&ProvisionRequest {
            port: Some(8081),
            ..request("app3")
        })
        .unwrap_err();
    match conflict {
        ProvisionError::Conflict { resource, value, holder } => {
            assert_eq!(resource, Resource::Port);
            assert_eq!(value, 8081);
            assert_eq!(holder, "tenant 'app2'");
        }
        other => panic!("expected Conflict, got {other:?}"),
    }

    assert!(matches!(
        workflow.run(&ProvisionRequest {
            port: Some(6379),
            ..request("app3")
        }),
        Err(ProvisionError::Conflict { .. })
    ));
    assert!(matches!(
        workflow.run(&ProvisionRequest {
            port: Some(70_000),
            ..request("app3")
        }),
        Err(ProvisionError::OutOfRange { resource: Resource::Port, .. })
    ));
    assert!(matches!(
        workflow.run(&ProvisionRequest {
            cache_namespace: Some(16),
            ..request("app3")
        }),
        Err(ProvisionError::OutOfRange { resource: Resource::CacheNamespace, .. })
    ));
    assert_eq!(stack.topology(), COMPOSE);
    assert!(stack.backups().is_empty());

    let report = workflow
        .run(&ProvisionRequest {
            port: Some(8500),
            cache_namespace: Some(9),
            ..request("app3")
        })
        .unwrap();
    assert_eq!((report.tenant.port, report.tenant.cache_namespace), (8500, 9));
}

/// A routing document without a standalone closing delimiter.
const FLAT_NGINX: &str = "events { worker_connections 1024; }\nhttp { include mime.types; }\n";

#[test]
fn sequential_routing_anchor_failure_leaves_topology_mutated() {
    let stack = Stack::with_documents(COMPOSE, FLAT_NGINX);
    let err = stack
        .workflow(CommitMode::Sequential)
        .run(&request("app3"))
        .unwrap_err();

    match &err {
        ProvisionError::Partial {
            reached,
            modified,
            untouched,
            backups,
            source,
        } => {
            assert_eq!(*reached, ProvisionState::TopologyMutated);
            assert_eq!(modified, &vec![Artifact::TopologyDocument]);
            assert_eq!(
                untouched,
                &vec![Artifact::RoutingDocument, Artifact::TenantDirectory]
            );
            assert_eq!(backups.len(), 1);
            assert_eq!(fs::read_to_string(&backups[0]).unwrap(), COMPOSE);
            assert!(matches!(**source, ProvisionError::AnchorNotFound { .. }));
        }
        other => panic!("expected Partial, got {other:?}"),
    }

    // No automatic revert.
    assert!(stack.topology().contains("worker-app3:"));
    assert_eq!(stack.routing(), FLAT_NGINX);
    assert!(!stack.tenant_dir("app3").exists());
}

#[test]
fn staged_routing_anchor_failure_mutates_nothing() {
    let stack = Stack::with_documents(COMPOSE, FLAT_NGINX);
    let err = stack
        .workflow(CommitMode::Staged)
        .run(&request("app3"))
        .unwrap_err();

    assert!(matches!(err, ProvisionError::AnchorNotFound { .. }));
    assert!(err.is_side_effect_free());
    assert_eq!(stack.topology(), COMPOSE);
    assert_eq!(stack.routing(), FLAT_NGINX);
    assert!(stack.backups().is_empty());
    assert!(!stack.tenant_dir("app3").exists());
}

#[test]
fn missing_topology_anchor_fails_before_any_write() {
    let compose = COMPOSE.replace(TOPOLOGY_ANCHOR, "");
    for mode in [CommitMode::Staged, CommitMode::Sequential] {
        let stack = Stack::with_documents(&compose, NGINX);
        let err = stack.workflow(mode).run(&request("app3")).unwrap_err();

        assert!(matches!(err, ProvisionError::AnchorNotFound { .. }), "{mode}: {err:?}");
        assert_eq!(stack.topology(), compose);
        assert_eq!(stack.routing(), NGINX);
        assert!(stack.backups().is_empty(), "{mode}");
    }
}

#[test]
fn sequential_scaffold_failure_reports_both_documents_modified() {
    let stack = Stack::new();
    let mut config = stack.config(CommitMode::Sequential);
    config.spec.scaffold.env_file = "missing/.env".to_string();

    let err = ProvisioningWorkflow::new(config)
        .unwrap()
        .run(&request("app3"))
        .unwrap_err();

    match &err {
        ProvisionError::Partial {
            reached,
            modified,
            backups,
            source,
            ..
        } => {
            assert_eq!(*reached, ProvisionState::RoutingMutated);
            assert!(modified.contains(&Artifact::TopologyDocument));
            assert!(modified.contains(&Artifact::RoutingDocument));
            assert_eq!(backups.len(), 2);
            assert!(matches!(**source, ProvisionError::Io { .. }));
        }
        other => panic!("expected Partial, got {other:?}"),
    }
    assert!(stack.topology().contains("worker-app3:"));
    assert!(stack.routing().contains("listen 8082;"));
}

#[test]
fn staged_scaffold_failure_happens_before_any_rename() {
    let stack = Stack::new();
    let mut config = stack.config(CommitMode::Staged);
    config.spec.scaffold.env_file = "missing/.env".to_string();

    let err = ProvisioningWorkflow::new(config)
        .unwrap()
        .run(&request("app3"))
        .unwrap_err();

    match &err {
        ProvisionError::Aborted {
            reached,
            backups,
            source,
        } => {
            assert_eq!(*reached, ProvisionState::Allocated);
            assert!(matches!(**source, ProvisionError::Io { .. }));
            let mut reported = backups.clone();
            reported.sort();
            assert_eq!(reported, stack.backups());
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
    assert!(!err.is_side_effect_free());
    assert!(err.modified_artifacts().is_empty());
    assert_eq!(stack.topology(), COMPOSE);
    assert_eq!(stack.routing(), NGINX);
    assert!(!stack.tenant_dir("app3").exists());
    // Backups are taken before staging and are never deleted.
    assert_eq!(stack.backups().len(), 2);
}

#[test]
fn dry_run_renders_without_writing() {
    let stack = Stack::new();
    let report = stack
        .workflow(CommitMode::Staged)
        .run(&ProvisionRequest {
            dry_run: true,
            ..request("app3")
        })
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.final_state, ProvisionState::Allocated);
    assert!(report.modified.is_empty());
    let preview = report.preview.unwrap();
    assert!(preview.topology_block.contains("  worker-app3:\n"));
    assert!(preview.routing_block.contains("        listen 8082;\n"));
    assert!(preview.env_descriptor.contains("REDIS_DB=2"));

    assert_eq!(stack.topology(), COMPOSE);
    assert_eq!(stack.routing(), NGINX);
    assert!(stack.backups().is_empty());
    assert!(!stack.tenant_dir("app3").exists());
    assert!(!stack.root().join(LOCK_FILE_NAME).exists());
}

#[test]
fn check_is_repeatable() {
    let stack = Stack::new();
    let workflow = stack.workflow(CommitMode::Sequential);

    let first = workflow.check(&request("app3")).unwrap();
    let second = workflow.check(&request("app3")).unwrap();

    assert!(first.dry_run && second.dry_run);
    assert_eq!(first.tenant, second.tenant);
    assert_eq!(stack.topology(), COMPOSE);
}

#[test]
fn crlf_documents_keep_their_line_terminator() {
    let compose = COMPOSE.replace('\n', "\r\n");
    let nginx = NGINX.replace('\n', "\r\n");
    let stack = Stack::with_documents(&compose, &nginx);

    stack.workflow(CommitMode::Staged).run(&request("app3")).unwrap();

    for text in [stack.topology(), stack.routing()] {
        assert!(text.contains("app3"));
        let bare = text.match_indices('\n').filter(|(i, _)| !text[..*i].ends_with('\r')).count();
        assert_eq!(bare, 0, "found bare LF terminators");
    }
}
