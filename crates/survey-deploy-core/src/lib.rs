// crates/survey-deploy-core/src/lib.rs
// ============================================================================
// Module: Survey Deploy Core Library
// Description: Public API surface for deployment documents and queries.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{interfaces, model, runtime}
// ============================================================================

//! ## Overview
//! Survey Deploy core owns two tightly coupled pieces: a per-asset deployment
//! document with atomic merge-writes, and a validator that turns untrusted
//! submission list parameters into a permission-scoped query. Storage engines
//! and submission backends integrate through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod interfaces;
pub mod model;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use interfaces::BackendError;
pub use interfaces::DeploymentRowStore;
pub use interfaces::DocumentRow;
pub use interfaces::MergeReceipt;
pub use interfaces::PermissionFilterProvider;
pub use interfaces::StoreError;
pub use interfaces::SubmissionCounter;
pub use model::*;
pub use runtime::BackfillAuditEvent;
pub use runtime::DeploymentAuditEvent;
pub use runtime::DeploymentAuditSink;
pub use runtime::DeploymentBackend;
pub use runtime::DeploymentError;
pub use runtime::DeploymentHandle;
pub use runtime::FileAuditSink;
pub use runtime::InMemoryDeploymentStore;
pub use runtime::NoopAuditSink;
pub use runtime::QueryAuditEvent;
pub use runtime::StderrAuditSink;
pub use runtime::SubmissionRecord;
pub use runtime::Submissions;
pub use runtime::validate_submission_list_params;
