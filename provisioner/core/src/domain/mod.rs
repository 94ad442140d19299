// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure provisioning types. Nothing in this layer touches the filesystem.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Tenant identity, document model, registry index and allocation rules

pub mod tenant;
pub mod provisioning;
pub mod document;
pub mod topology;
pub mod routing;
pub mod registry;
pub mod allocation;
pub mod config;

pub use tenant::{Tenant, TenantName};
pub use provisioning::{Artifact, ProvisionError, ProvisionReport, ProvisionState, Resource};
pub use document::{Anchor, Document, DocumentKind, Section, SectionKind, TenantBlock};
pub use registry::{Registry, TenantRecord};
pub use allocation::{AllocationPolicy, ResourceAllocator};
pub use config::{CommitMode, ProvisionerConfig};
