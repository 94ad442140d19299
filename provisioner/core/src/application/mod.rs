// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod identity;
pub mod provision;
pub mod inventory;

// Re-export use cases for convenience
pub use identity::IdentityValidator;
pub use provision::{ProvisionRequest, ProvisioningWorkflow};
pub use inventory::{TenantInventory, TenantListing};
