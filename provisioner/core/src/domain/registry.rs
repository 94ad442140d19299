// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant Registry
//!
//! The configuration documents are the allocation ledger. A [`Registry`] is
//! derived from them (plus the apps directory listing) on every run and is
//! never persisted, so it cannot drift from the documents it describes.
//!
//! The derived index keeps bound ports and assigned namespaces in ordered
//! maps keyed by value, so conflict checks and "current maximum" lookups do
//! not rescan the documents.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::document::{Document, SectionKind};
use crate::domain::provisioning::ProvisionError;
use crate::domain::routing::DocumentRootPattern;
use crate::domain::topology::{TopologyView, ENV_CACHE_NAMESPACE, ENV_PORT};

/// Everything the registry knows about one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantRecord {
    pub name: String,
    pub port: Option<u16>,
    pub cache_namespace: Option<u8>,
    pub in_topology: bool,
    pub in_routing: bool,
    pub has_directory: bool,
}

impl TenantRecord {
    /// Registered in both documents and present on disk.
    pub fn is_complete(&self) -> bool {
        self.in_topology && self.in_routing && self.has_directory
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    tenants: BTreeMap<String, TenantRecord>,
    /// Ports attributed to a tenant.
    tenant_ports: BTreeMap<u16, String>,
    /// Every bound port (tenant ports, published host ports, unattributed listeners).
    bound_ports: BTreeMap<u16, String>,
    namespaces: BTreeMap<u8, String>,
}

/// How the registry recognises tenant entries in the documents.
#[derive(Debug, Clone)]
pub struct RegistryRules {
    pub worker_prefix: String,
    pub document_root: DocumentRootPattern,
}

impl Registry {
    /// Build the registry from both documents and the names of the
    /// directories found under the apps directory.
    pub fn from_documents(
        topology: &Document,
        routing: &Document,
        tenant_dirs: &BTreeSet<String>,
        rules: &RegistryRules,
    ) -> Result<Self, ProvisionError> {
        let mut registry = Self::default();
        let view = TopologyView::parse(&topology.render()).map_err(|e| {
            ProvisionError::InvalidDocument {
                path: topology.path().to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        for service in &view.services {
            let tenant = service
                .name
                .strip_prefix(rules.worker_prefix.as_str())
                .filter(|name| !name.is_empty())
                .map(str::to_string);

            if let Some(name) = &tenant {
                registry.record(name).in_topology = true;
            }

            let holder = match &tenant {
                Some(name) => format!("tenant '{name}'"),
                None => format!("service '{}'", service.name),
            };

            if let Some(port) = service.env_u32(ENV_PORT).and_then(|p| u16::try_from(p).ok()) {
                registry.bind_port(port, &holder, true);
                if let Some(name) = &tenant {
                    registry.record(name).port.get_or_insert(port);
                }
            }

            for port in &service.published_ports {
                registry.bind_port(*port, &format!("{} (published)", holder), false);
            }

            if let Some(ns) = service
                .env_u32(ENV_CACHE_NAMESPACE)
                .and_then(|n| u8::try_from(n).ok())
            {
                registry.namespaces.entry(ns).or_insert_with(|| holder.clone());
                if let Some(name) = &tenant {
                    registry.record(name).cache_namespace.get_or_insert(ns);
                }
            }
        }

        for section in routing.sections() {
            let SectionKind::Server { listen, root } = section.kind else {
                continue;
            };
            let tenant = root.as_deref().and_then(|r| rules.document_root.tenant_of(r));

            if let Some(name) = &tenant {
                registry.record(name).in_routing = true;
            }

            for port in listen {
                match &tenant {
                    Some(name) => {
                        registry.bind_port(port, &format!("tenant '{name}'"), true);
                        registry.record(name).port.get_or_insert(port);
                    }
                    None => registry.bind_port(
                        port,
                        &format!("routing server on line {}", section.start + 1),
                        false,
                    ),
                }
            }
        }

        for dir in tenant_dirs {
            registry.record(dir).has_directory = true;
        }

        Ok(registry)
    }

    fn record(&mut self, name: &str) -> &mut TenantRecord {
        self.tenants
            .entry(name.to_string())
            .or_insert_with(|| TenantRecord {
                name: name.to_string(),
                ..TenantRecord::default()
            })
    }

    fn bind_port(&mut self, port: u16, holder: &str, tenant_owned: bool) {
        if tenant_owned {
            self.tenant_ports
                .entry(port)
                .or_insert_with(|| holder.to_string());
        }
        self.bound_ports
            .entry(port)
            .or_insert_with(|| holder.to_string());
    }

    pub fn tenants(&self) -> impl Iterator<Item = &TenantRecord> {
        self.tenants.values()
    }

    pub fn tenant(&self, name: &str) -> Option<&TenantRecord> {
        self.tenants.get(name)
    }

    /// Who holds `port`, if anyone.
    pub fn port_holder(&self, port: u16) -> Option<&str> {
        self.bound_ports.get(&port).map(String::as_str)
    }

    pub fn namespace_holder(&self, namespace: u8) -> Option<&str> {
        self.namespaces.get(&namespace).map(String::as_str)
    }

    /// Highest tenant port strictly below `ceiling`.
    pub fn max_tenant_port_below(&self, ceiling: u16) -> Option<u16> {
        self.tenant_ports.range(..ceiling).next_back().map(|(p, _)| *p)
    }

    pub fn max_namespace(&self) -> Option<u8> {
        self.namespaces.keys().next_back().copied()
    }

    pub fn bound_ports(&self) -> BTreeSet<u16> {
        self.bound_ports.keys().copied().collect()
    }

    pub fn assigned_namespaces(&self) -> BTreeSet<u8> {
        self.namespaces.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::DocumentKind;

    const COMPOSE: &str = "\
services:
  router:
    image: nginx:alpine
    network_mode: host

  worker-app1:
    environment:
      APP_PORT: \"80\"
      REDIS_DB: \"0\"

  worker-app2:
    environment:
      APP_PORT: \"8081\"
      REDIS_DB: \"1\"

  # Shared infrastructure
  mysql:
    ports:
      - \"127.0.0.1:3306:3306\"
  mailpit:
    ports:
      - \"8025:8025\"
";

    const NGINX: &str = "\
http {
    server {
        listen 80;
        root /var/www/app1/public;
    }
    server {
        listen 8081;
        root /var/www/app2/public;
    }
    server {
        listen 8900;
        root /srv/status;
    }
    server {
        listen 8500;
        root /var/www/orphan/public;
    }
}
";

    fn rules() -> RegistryRules {
        RegistryRules {
            worker_prefix: "worker-".to_string(),
            document_root: DocumentRootPattern::new("/var/www/{name}/public").unwrap(),
        }
    }

    fn registry(dirs: &[&str]) -> Registry {
        let topology = Document::parse("docker-compose.yml", DocumentKind::Topology, COMPOSE);
        let routing = Document::parse("nginx.conf", DocumentKind::Routing, NGINX);
        let dirs = dirs.iter().map(|d| d.to_string()).collect();
        Registry::from_documents(&topology, &routing, &dirs, &rules()).unwrap()
    }

    #[test]
    fn collects_tenants_from_all_sources() {
        let registry = registry(&["app1", "app2"]);

        let app2 = registry.tenant("app2").unwrap();
        assert_eq!(app2.port, Some(8081));
        assert_eq!(app2.cache_namespace, Some(1));
        assert!(app2.is_complete());

        let orphan = registry.tenant("orphan").unwrap();
        assert!(orphan.in_routing && !orphan.in_topology && !orphan.has_directory);
        assert_eq!(orphan.port, Some(8500));
    }

    #[test]
    fn distinguishes_tenant_ports_from_other_bound_ports() {
        let registry = registry(&[]);

        assert_eq!(registry.max_tenant_port_below(9000), Some(8500));
        assert_eq!(registry.port_holder(8025), Some("service 'mailpit' (published)"));
        assert_eq!(registry.port_holder(8900), Some("routing server on line 10"));
        assert_eq!(registry.port_holder(3306), Some("service 'mysql' (published)"));
        assert_eq!(registry.port_holder(8081), Some("tenant 'app2'"));
        assert!(registry.bound_ports().contains(&80));
    }

    #[test]
    fn unparsable_topology_names_the_document() {
        let topology = Document::parse("docker-compose.yml", DocumentKind::Topology, "services: [\n");
        let routing = Document::parse("nginx.conf", DocumentKind::Routing, NGINX);

        match Registry::from_documents(&topology, &routing, &BTreeSet::new(), &rules()) {
            Err(ProvisionError::InvalidDocument { path, reason }) => {
                assert_eq!(path, std::path::Path::new("docker-compose.yml"));
                assert!(reason.starts_with("not valid YAML"));
            }
            other => panic!("expected InvalidDocument, got {other:?}"),
        }
    }

    #[test]
    fn collects_assigned_namespaces() {
        let registry = registry(&[]);
        assert_eq!(registry.assigned_namespaces(), BTreeSet::from([0, 1]));
        assert_eq!(registry.max_namespace(), Some(1));
        assert_eq!(registry.namespace_holder(1), Some("tenant 'app2'"));
    }
}
