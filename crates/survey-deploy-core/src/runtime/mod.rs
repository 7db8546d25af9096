// crates/survey-deploy-core/src/runtime/mod.rs
// ============================================================================
// Module: Survey Deploy Runtime
// Description: Deployment handles, query validation, and backend glue.
// Purpose: Implement the operations built on top of the core interfaces.
// Dependencies: crate::{interfaces, model}
// ============================================================================

//! ## Overview
//! Runtime components wire the model and interfaces together: the
//! [`DeploymentHandle`] caches and merges documents, the validator normalizes
//! submission parameters, and [`DeploymentBackend`] composes both for
//! concrete backends.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod backend;
pub mod deployment;
pub mod store;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::BackfillAuditEvent;
pub use audit::DeploymentAuditEvent;
pub use audit::DeploymentAuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::QueryAuditEvent;
pub use audit::StderrAuditSink;
pub use backend::DeploymentBackend;
pub use backend::SubmissionRecord;
pub use backend::Submissions;
pub use deployment::DeploymentError;
pub use deployment::DeploymentHandle;
pub use store::InMemoryDeploymentStore;
pub use validator::validate_submission_list_params;
