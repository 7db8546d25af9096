// crates/survey-deploy-core/src/model/mod.rs
// ============================================================================
// Module: Survey Deploy Core Types
// Description: Deployment documents, submission queries, and error types.
// Purpose: Provide stable, serializable types shared by stores and backends.
// Dependencies: base64, serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Core types are storage-agnostic. They define what a deployment document
//! is, what a normalized submission query looks like, and how failures are
//! classified.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod document;
pub mod errors;
pub mod extended_json;
pub mod identifiers;
pub mod query;
pub mod timestamp;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use document::DeploymentDocument;
pub use document::DeploymentStatus;
pub use document::DocumentUpdates;
pub use document::KEY_ACTIVE;
pub use document::KEY_BACKEND;
pub use document::KEY_IDENTIFIER;
pub use document::KEY_STATUS;
pub use document::KEY_VERSION;
pub use document::is_falsy;
pub use errors::AbstractOperationError;
pub use errors::AuthorizationResolutionError;
pub use errors::ClientInputError;
pub use errors::ParamField;
pub use errors::SubmissionQueryError;
pub use extended_json::Binary;
pub use extended_json::ExtendedJsonError;
pub use extended_json::ExtendedValue;
pub use extended_json::ObjectId;
pub use identifiers::AssetUid;
pub use identifiers::PrincipalId;
pub use identifiers::SubmissionId;
pub use query::CountQuery;
pub use query::FormatMode;
pub use query::INSTANCE_ID_FIELDNAME;
pub use query::ListQuery;
pub use query::PermissionFilter;
pub use query::RawSubmissionParams;
pub use query::SortDirection;
pub use query::SortKey;
pub use query::SortSpec;
pub use query::SubmissionQuery;
pub use timestamp::Timestamp;
