// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Allocator
//!
//! Computes or validates a tenant's port and cache namespace against the
//! [`Registry`]. Allocation is a pure function of the registry, so calling it
//! twice without committing yields the same result.

use serde::{Deserialize, Serialize};

use crate::domain::provisioning::{ProvisionError, Resource};
use crate::domain::registry::Registry;
use crate::domain::tenant::{MAX_CACHE_NAMESPACE, MAX_TENANT_PORT, MIN_TENANT_PORT};

/// Bounds used when picking values automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    /// Port handed to the first tenant when no tenant port exists yet.
    #[serde(default = "default_first_tenant_port")]
    pub first_tenant_port: u16,

    /// Tenant ports are allocated strictly below this value. Ports at or above
    /// it belong to shared infrastructure (e.g. the execution pool on 9000).
    #[serde(default = "default_port_ceiling")]
    pub port_ceiling: u16,

    /// Highest namespace index the cache broker exposes.
    #[serde(default = "default_max_cache_namespace")]
    pub max_cache_namespace: u8,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            first_tenant_port: default_first_tenant_port(),
            port_ceiling: default_port_ceiling(),
            max_cache_namespace: default_max_cache_namespace(),
        }
    }
}

fn default_first_tenant_port() -> u16 {
    8081
}

fn default_port_ceiling() -> u16 {
    9000
}

fn default_max_cache_namespace() -> u8 {
    MAX_CACHE_NAMESPACE as u8
}

pub struct ResourceAllocator<'a> {
    policy: &'a AllocationPolicy,
    registry: &'a Registry,
}

impl<'a> ResourceAllocator<'a> {
    pub fn new(policy: &'a AllocationPolicy, registry: &'a Registry) -> Self {
        Self { policy, registry }
    }

    /// Validate `explicit`, or pick the next port after the highest tenant
    /// port below the ceiling, skipping anything already bound.
    pub fn allocate_port(&self, explicit: Option<u32>) -> Result<u16, ProvisionError> {
        if let Some(value) = explicit {
            if !(MIN_TENANT_PORT..=MAX_TENANT_PORT).contains(&value) {
                return Err(ProvisionError::OutOfRange {
                    resource: Resource::Port,
                    value,
                    min: MIN_TENANT_PORT,
                    max: MAX_TENANT_PORT,
                });
            }
            let port = value as u16;
            if let Some(holder) = self.registry.port_holder(port) {
                return Err(ProvisionError::Conflict {
                    resource: Resource::Port,
                    value,
                    holder: holder.to_string(),
                });
            }
            return Ok(port);
        }

        let ceiling = u32::from(self.policy.port_ceiling);
        let after_max = self
            .registry
            .max_tenant_port_below(self.policy.port_ceiling)
            .map(|p| u32::from(p) + 1)
            .unwrap_or(0);
        let mut candidate = after_max
            .max(u32::from(self.policy.first_tenant_port))
            .max(MIN_TENANT_PORT);

        while candidate < ceiling {
            if self.registry.port_holder(candidate as u16).is_none() {
                tracing::debug!(port = candidate, "Allocated tenant port");
                return Ok(candidate as u16);
            }
            candidate += 1;
        }

        Err(ProvisionError::OutOfRange {
            resource: Resource::Port,
            value: candidate,
            min: MIN_TENANT_PORT,
            max: ceiling.saturating_sub(1),
        })
    }

    /// Validate `explicit`, or return one past the highest assigned namespace.
    pub fn allocate_cache_namespace(&self, explicit: Option<u32>) -> Result<u8, ProvisionError> {
        let max = u32::from(self.policy.max_cache_namespace);
        let value = match explicit {
            Some(value) => value,
            None => self
                .registry
                .max_namespace()
                .map(|n| u32::from(n) + 1)
                .unwrap_or(0),
        };

        if value > max {
            return Err(ProvisionError::OutOfRange {
                resource: Resource::CacheNamespace,
                value,
                min: 0,
                max,
            });
        }

        let namespace = value as u8;
        if let Some(holder) = self.registry.namespace_holder(namespace) {
            return Err(ProvisionError::Conflict {
                resource: Resource::CacheNamespace,
                value,
                holder: holder.to_string(),
            });
        }

        tracing::debug!(namespace, explicit = explicit.is_some(), "Allocated cache namespace");
        Ok(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::{Document, DocumentKind};
    use crate::domain::registry::RegistryRules;
    use crate::domain::routing::DocumentRootPattern;
    use std::collections::BTreeSet;

    fn registry(compose: &str, nginx: &str) -> Registry {
        let topology = Document::parse("docker-compose.yml", DocumentKind::Topology, compose);
        let routing = Document::parse("nginx.conf", DocumentKind::Routing, nginx);
        let rules = RegistryRules {
            worker_prefix: "worker-".to_string(),
            document_root: DocumentRootPattern::new("/var/www/{name}/public").unwrap(),
        };
        Registry::from_documents(&topology, &routing, &BTreeSet::new(), &rules).unwrap()
    }

    fn two_tenants() -> Registry {
        registry(
            "services:\n  worker-app1:\n    environment:\n      APP_PORT: 80\n      REDIS_DB: 0\n  worker-app2:\n    environment:\n      APP_PORT: 8081\n      REDIS_DB: 1\n  php:\n    ports:\n      - \"9000:9000\"\n",
            "http {\n}\n",
        )
    }

    #[test]
    fn auto_allocation_continues_after_highest_tenant() {
        let registry = two_tenants();
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        assert_eq!(allocator.allocate_port(None).unwrap(), 8082);
        assert_eq!(allocator.allocate_cache_namespace(None).unwrap(), 2);
    }

    #[test]
    fn auto_allocation_is_idempotent() {
        let registry = two_tenants();
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        let first = (allocator.allocate_port(None).unwrap(), allocator.allocate_cache_namespace(None).unwrap());
        let second = (allocator.allocate_port(None).unwrap(), allocator.allocate_cache_namespace(None).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn empty_registry_starts_at_policy_defaults() {
        let registry = registry("services:\n  router:\n    image: nginx\n", "http {\n}\n");
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        assert_eq!(allocator.allocate_port(None).unwrap(), 8081);
        assert_eq!(allocator.allocate_cache_namespace(None).unwrap(), 0);
    }

    #[test]
    fn auto_port_skips_ports_bound_by_infrastructure() {
        let registry = registry(
            "services:\n  worker-app1:\n    environment:\n      APP_PORT: 8081\n  mail:\n    ports:\n      - \"8082:8025\"\n",
            "http {\n}\n",
        );
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        assert_eq!(allocator.allocate_port(None).unwrap(), 8083);
    }

    #[test]
    fn ports_at_or_above_ceiling_do_not_raise_the_maximum() {
        let registry = registry(
            "services:\n  worker-app1:\n    environment:\n      APP_PORT: 8081\n  worker-admin:\n    environment:\n      APP_PORT: 9443\n",
            "http {\n}\n",
        );
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        assert_eq!(allocator.allocate_port(None).unwrap(), 8082);
    }

    #[test]
    fn exhausted_port_pool_is_out_of_range() {
        let registry = two_tenants();
        let policy = AllocationPolicy {
            first_tenant_port: 8081,
            port_ceiling: 8082,
            max_cache_namespace: 15,
        };
        let allocator = ResourceAllocator::new(&policy, &registry);

        assert!(matches!(
            allocator.allocate_port(None),
            Err(ProvisionError::OutOfRange { resource: Resource::Port, .. })
        ));
    }

    #[test]
    fn explicit_values_in_use_conflict() {
        let registry = two_tenants();
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        match allocator.allocate_port(Some(8081)) {
            Err(ProvisionError::Conflict { holder, value, .. }) => {
                assert_eq!(value, 8081);
                assert_eq!(holder, "tenant 'app2'");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(matches!(
            allocator.allocate_port(Some(9000)),
            Err(ProvisionError::Conflict { .. })
        ));
        assert!(matches!(
            allocator.allocate_cache_namespace(Some(0)),
            Err(ProvisionError::Conflict { resource: Resource::CacheNamespace, .. })
        ));
    }

    #[test]
    fn explicit_values_outside_bounds_are_out_of_range() {
        let registry = two_tenants();
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        for port in [0, 80, 1023, 65536, 100_000] {
            assert!(
                matches!(allocator.allocate_port(Some(port)), Err(ProvisionError::OutOfRange { .. })),
                "port {port}"
            );
        }
        assert!(matches!(
            allocator.allocate_cache_namespace(Some(16)),
            Err(ProvisionError::OutOfRange { .. })
        ));
        assert_eq!(allocator.allocate_port(Some(9443)).unwrap(), 9443);
        assert_eq!(allocator.allocate_cache_namespace(Some(15)).unwrap(), 15);
    }

    #[test]
    fn namespace_pool_exhaustion_is_out_of_range() {
        let registry = registry(
            "services:\n  worker-full:\n    environment:\n      REDIS_DB: 15\n",
            "http {\n}\n",
        );
        let policy = AllocationPolicy::default();
        let allocator = ResourceAllocator::new(&policy, &registry);

        assert!(matches!(
            allocator.allocate_cache_namespace(None),
            Err(ProvisionError::OutOfRange { value: 16, .. })
        ));
    }
}
