// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `tenancy-core`: Tenant Provisioning Engine
//!
//! Provisions additional tenants into a shared runtime topology (routing
//! front-end, relational database, cache/queue broker, execution pool) by
//! extending the two configuration documents that describe it.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Tenant`, `Document`, `Registry`, `ResourceAllocator`, `ProvisionError` |
//! | [`application`] | Application | `IdentityValidator`, `ProvisioningWorkflow`, tenant inventory |
//! | [`infrastructure`] | Infrastructure | registry reader, backups and staged writes, advisory lock, templates, scaffold |
//!
//! The configuration documents are the only registry. Every run re-reads them,
//! derives an in-memory index, and never persists allocations anywhere else.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
