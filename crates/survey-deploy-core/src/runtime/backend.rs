// crates/survey-deploy-core/src/runtime/backend.rs
// ============================================================================
// Module: Deployment Backend Contract
// Description: Trait composing the deployment handle and query validator.
// Purpose: Give concrete submission backends one shared surface.
// Dependencies: crate::{interfaces, model, runtime}, serde_json
// ============================================================================

//! ## Overview
//! [`DeploymentBackend`] is implemented by concrete submission backends. A
//! backend supplies its deployment handle, its permission provider, and the
//! plural submission fetch; document access, validation, and single-record
//! lookup come for free. Counting is an optional capability exposed through
//! [`DeploymentBackend::submission_counter`]; without it,
//! [`DeploymentBackend::calculated_submission_count`] fails with
//! [`AbstractOperationError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::interfaces::BackendError;
use crate::interfaces::MergeReceipt;
use crate::interfaces::PermissionFilterProvider;
use crate::interfaces::StoreError;
use crate::interfaces::SubmissionCounter;
use crate::model::AbstractOperationError;
use crate::model::DeploymentStatus;
use crate::model::DocumentUpdates;
use crate::model::FormatMode;
use crate::model::PrincipalId;
use crate::model::RawSubmissionParams;
use crate::model::SubmissionId;
use crate::model::SubmissionQuery;
use crate::model::SubmissionQueryError;
use crate::runtime::audit::QueryAuditEvent;
use crate::runtime::audit::QueryAuditEventParams;
use crate::runtime::deployment::DeploymentError;
use crate::runtime::deployment::DeploymentHandle;
use crate::runtime::validator::validate_submission_list_params;

// ============================================================================
// SECTION: Records
// ============================================================================

/// One submission as returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionRecord {
    /// Structured JSON record.
    Structured(Value),
    /// Serialized text instance.
    Text(String),
}

/// Lazy sequence of submissions.
pub type Submissions<'a> = Box<dyn Iterator<Item = SubmissionRecord> + 'a>;

// ============================================================================
// SECTION: Backend Contract
// ============================================================================

/// Contract shared by concrete submission backends.
pub trait DeploymentBackend {
    /// Returns the deployment handle for the backend's asset.
    fn deployment(&self) -> &DeploymentHandle;

    /// Returns the permission provider used to scope queries.
    fn permissions(&self) -> &dyn PermissionFilterProvider;

    /// Fetches submissions matching `params`.
    ///
    /// Implementations validate `params` through
    /// [`DeploymentBackend::validate_submission_list_params`] and must AND the
    /// resulting permission filter into the executed query.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when validation or the submission engine
    /// fails.
    fn get_submissions(
        &self,
        principal: &PrincipalId,
        format: FormatMode,
        params: &RawSubmissionParams,
    ) -> Result<Submissions<'_>, BackendError>;

    /// Returns the counting capability, if the backend provides one.
    fn submission_counter(&self) -> Option<&dyn SubmissionCounter> {
        None
    }

    /// Compatibility shim for a legacy permission flag; inert by default.
    ///
    /// Callers may invoke this unconditionally regardless of backend.
    fn remove_legacy_permission_flag(&self, _principal: &PrincipalId) {}

    /// Reads a dotted path from the deployment document.
    fn get_data(&self, dotted_path: Option<&str>, default: Value) -> Value {
        self.deployment().get_data(dotted_path, default)
    }

    /// Atomically merges top-level updates into the deployment document.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Store`] when the merge transaction fails.
    fn save(&self, updates: &DocumentUpdates) -> Result<MergeReceipt, BackendError> {
        self.deployment().save(updates).map_err(deployment_error)
    }

    /// Stores a new synchronization status.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Store`] when the merge transaction fails.
    fn set_status(&self, status: DeploymentStatus) -> Result<MergeReceipt, BackendError> {
        self.deployment().set_status(status).map_err(deployment_error)
    }

    /// Backend label, if set.
    fn backend(&self) -> Option<String> {
        self.deployment().backend()
    }

    /// Backend-side identifier, if set.
    fn identifier(&self) -> Option<String> {
        self.deployment().identifier()
    }

    /// Whether the deployment is active.
    fn active(&self) -> bool {
        self.deployment().active()
    }

    /// Deployed version identifier, if set.
    fn version_id(&self) -> Option<String> {
        self.deployment().version_id()
    }

    /// Synchronization status, if set to a known value.
    fn status(&self) -> Option<DeploymentStatus> {
        self.deployment().status()
    }

    /// Stored status value without interpretation, if set.
    fn status_text(&self) -> Option<String> {
        self.deployment().status_text()
    }

    /// Validates raw submission list parameters for this backend's asset.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionQueryError`] as described by
    /// [`validate_submission_list_params`].
    fn validate_submission_list_params(
        &self,
        principal: &PrincipalId,
        format: FormatMode,
        count_only: bool,
        params: &RawSubmissionParams,
    ) -> Result<SubmissionQuery, SubmissionQueryError> {
        let deployment = self.deployment();
        let result = validate_submission_list_params(
            deployment.asset(),
            self.permissions(),
            principal,
            format,
            count_only,
            params,
        );
        let (outcome, field) = match &result {
            Ok(_) => ("accepted", None),
            Err(SubmissionQueryError::Client(error)) => ("rejected", Some(error.field().as_str())),
            Err(SubmissionQueryError::Authorization(_)) => ("fault", None),
        };
        deployment.audit_sink().record_query(&QueryAuditEvent::new(QueryAuditEventParams {
            asset_uid: deployment.asset().clone(),
            format,
            count_only,
            outcome,
            field,
        }));
        result
    }

    /// Fetches one submission by id; `Ok(None)` when it is not visible.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when validation or the submission engine
    /// fails. A missing submission is not an error.
    fn get_submission(
        &self,
        id: SubmissionId,
        principal: &PrincipalId,
        format: FormatMode,
        params: &RawSubmissionParams,
    ) -> Result<Option<SubmissionRecord>, BackendError> {
        let params = params.clone().with_instance_ids(&[id]);
        let mut submissions = self.get_submissions(principal, format, &params)?;
        Ok(submissions.next())
    }

    /// Counts submissions visible to `principal` that match `params`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Abstract`] when the backend has no counting
    /// capability, or validation/engine errors otherwise.
    fn calculated_submission_count(
        &self,
        principal: &PrincipalId,
        params: &RawSubmissionParams,
    ) -> Result<u64, BackendError> {
        let counter = self.submission_counter().ok_or(AbstractOperationError {
            operation: "calculated_submission_count",
        })?;
        let query =
            self.validate_submission_list_params(principal, FormatMode::Structured, true, params)?;
        counter.count_submissions(&query)
    }
}

/// Maps deployment handle errors into backend errors.
fn deployment_error(error: DeploymentError) -> BackendError {
    match error {
        DeploymentError::Store(error) => BackendError::Store(error),
        DeploymentError::NotFound(asset) => {
            BackendError::Store(StoreError::Invalid(format!("asset not found: {asset}")))
        }
    }
}
