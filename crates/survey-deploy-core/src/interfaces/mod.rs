// crates/survey-deploy-core/src/interfaces/mod.rs
// ============================================================================
// Module: Survey Deploy Interfaces
// Description: Contracts for permission resolution, row storage, and counting.
// Purpose: Define the seams between this core and its external collaborators.
// Dependencies: crate::model, thiserror
// ============================================================================

//! ## Overview
//! Interfaces describe the collaborators this core relies on without
//! committing to a storage engine or a permission model:
//! - [`PermissionFilterProvider`] turns a principal into a visibility filter.
//! - [`DeploymentRowStore`] owns the durable asset row and its atomic merge.
//! - [`SubmissionCounter`] is the optional counting capability of a backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::model::AbstractOperationError;
use crate::model::AssetUid;
use crate::model::AuthorizationResolutionError;
use crate::model::DeploymentDocument;
use crate::model::DocumentUpdates;
use crate::model::PermissionFilter;
use crate::model::PrincipalId;
use crate::model::SubmissionQuery;
use crate::model::SubmissionQueryError;
use crate::model::Timestamp;

// ============================================================================
// SECTION: Permission Provider
// ============================================================================

/// Computes the visibility filter for a principal on an asset.
///
/// Implementations must behave as a synchronous, side-effect-free lookup.
pub trait PermissionFilterProvider {
    /// Resolves the filter fragment constraining visible submissions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationResolutionError`] when the principal reference
    /// is malformed.
    fn resolve(
        &self,
        asset: &AssetUid,
        principal: &PrincipalId,
    ) -> Result<PermissionFilter, AuthorizationResolutionError>;
}

impl<F> PermissionFilterProvider for F
where
    F: Fn(&AssetUid, &PrincipalId) -> Result<PermissionFilter, AuthorizationResolutionError>,
{
    fn resolve(
        &self,
        asset: &AssetUid,
        principal: &PrincipalId,
    ) -> Result<PermissionFilter, AuthorizationResolutionError> {
        self(asset, principal)
    }
}

// ============================================================================
// SECTION: Row Store
// ============================================================================

/// Deployment row store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("deployment store io error: {0}")]
    Io(String),
    /// Stored document could not be decoded.
    #[error("deployment store corruption: {0}")]
    Corrupt(String),
    /// Store rejected the request as invalid.
    #[error("deployment store invalid data: {0}")]
    Invalid(String),
    /// Store engine error.
    #[error("deployment store error: {0}")]
    Store(String),
}

/// Snapshot of a stored asset row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    /// Last committed deployment document.
    pub document: DeploymentDocument,
    /// Timestamp of the last committed merge, if any.
    pub modified_at: Option<Timestamp>,
}

/// Result of an atomic merge or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReceipt {
    /// Timestamp stamped inside the merge transaction.
    pub modified_at: Timestamp,
    /// Number of rows updated; zero when the asset no longer exists.
    pub rows_affected: usize,
}

impl MergeReceipt {
    /// Returns true when the asset row was updated.
    #[must_use]
    pub const fn applied(&self) -> bool {
        self.rows_affected > 0
    }
}

/// Durable owner of per-asset deployment rows.
///
/// # Invariants
/// - `merge` locks the row, merges server-side, and stamps the timestamp as
///   one atomic unit; concurrent merges on one asset are serialized.
/// - A merge against a missing asset affects zero rows and is not an error.
pub trait DeploymentRowStore: Send + Sync {
    /// Creates the asset row with an empty document if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row cannot be written.
    fn create(&self, asset: &AssetUid) -> Result<(), StoreError>;

    /// Loads the last committed row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row cannot be read or decoded.
    fn load(&self, asset: &AssetUid) -> Result<Option<DocumentRow>, StoreError>;

    /// Atomically merges top-level updates into the stored document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails; nothing is applied.
    fn merge(&self, asset: &AssetUid, updates: &DocumentUpdates)
    -> Result<MergeReceipt, StoreError>;

    /// Atomically resets the stored document to empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction fails.
    fn clear(&self, asset: &AssetUid) -> Result<MergeReceipt, StoreError>;

    /// Removes the asset row, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row cannot be removed.
    fn delete(&self, asset: &AssetUid) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Backend Capabilities
// ============================================================================

/// Deployment backend errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Submission parameters failed validation.
    #[error(transparent)]
    Query(#[from] SubmissionQueryError),
    /// Requested capability is not wired for this backend.
    #[error(transparent)]
    Abstract(#[from] AbstractOperationError),
    /// Deployment row storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Submission engine failed.
    #[error("submission backend error: {0}")]
    Backend(String),
}

/// Counting capability supplied by concrete backends.
pub trait SubmissionCounter {
    /// Counts submissions matching a count-only query.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the submission engine fails.
    fn count_submissions(&self, query: &SubmissionQuery) -> Result<u64, BackendError>;
}
