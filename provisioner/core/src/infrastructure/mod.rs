// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! Filesystem adapters for the provisioning engine.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Reading documents, backups and staged writes, locking, templates, scaffolds

pub mod registry_reader;
pub mod document_store;
pub mod lock;
pub mod template_engine;
pub mod scaffold;

pub use registry_reader::{RegistryReader, RegistrySnapshot};
pub use document_store::{DocumentStore, StagedWrite};
pub use lock::ProvisionLock;
pub use template_engine::{TemplateEngine, TenantTemplateContext};
pub use scaffold::{ScaffoldGenerator, StagedScaffold};
