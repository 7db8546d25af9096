// crates/survey-deploy-core/tests/deployment_backend.rs
// ============================================================================
// Module: Deployment Backend Contract Tests
// Description: Default trait behavior for concrete submission backends.
// Purpose: Validate single-record lookup, counting capability, and auditing.
// ============================================================================

//! ## Overview
//! A small in-process backend implements only the required methods of
//! [`DeploymentBackend`] and relies on the provided defaults for the rest.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;
use survey_deploy_core::AssetUid;
use survey_deploy_core::AuthorizationResolutionError;
use survey_deploy_core::BackendError;
use survey_deploy_core::ClientInputError;
use survey_deploy_core::DeploymentAuditEvent;
use survey_deploy_core::DeploymentAuditSink;
use survey_deploy_core::DeploymentBackend;
use survey_deploy_core::DeploymentHandle;
use survey_deploy_core::DeploymentStatus;
use survey_deploy_core::FormatMode;
use survey_deploy_core::InMemoryDeploymentStore;
use survey_deploy_core::PermissionFilter;
use survey_deploy_core::PermissionFilterProvider;
use survey_deploy_core::PrincipalId;
use survey_deploy_core::QueryAuditEvent;
use survey_deploy_core::RawSubmissionParams;
use survey_deploy_core::SubmissionCounter;
use survey_deploy_core::SubmissionId;
use survey_deploy_core::SubmissionQuery;
use survey_deploy_core::SubmissionQueryError;
use survey_deploy_core::SubmissionRecord;
use survey_deploy_core::Submissions;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Audit sink capturing event labels.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl DeploymentAuditSink for RecordingSink {
    fn record(&self, event: &DeploymentAuditEvent) {
        self.events.lock().unwrap().push(format!("{}:{}", event.event, event.outcome));
    }

    fn record_query(&self, event: &QueryAuditEvent) {
        let field = event.field.unwrap_or("-");
        self.events.lock().unwrap().push(format!("{}:{}:{field}", event.event, event.outcome));
    }
}

/// Grants every principal except `ghost` an unrestricted view.
struct OpenPermissions;

impl PermissionFilterProvider for OpenPermissions {
    fn resolve(
        &self,
        _asset: &AssetUid,
        principal: &PrincipalId,
    ) -> Result<PermissionFilter, AuthorizationResolutionError> {
        if principal.as_str() == "ghost" {
            return Err(AuthorizationResolutionError("ghost".to_string()));
        }
        Ok(PermissionFilter::default())
    }
}

/// Counts stored submissions restricted by instance ids.
struct RecordCounter {
    ids: Vec<u64>,
}

impl SubmissionCounter for RecordCounter {
    fn count_submissions(&self, query: &SubmissionQuery) -> Result<u64, BackendError> {
        assert!(query.is_count_only());
        let restrict = query.instance_id_filter();
        let visible = self
            .ids
            .iter()
            .filter(|id| restrict.is_empty() || restrict.iter().any(|wanted| wanted.get() == **id))
            .count();
        Ok(u64::try_from(visible).unwrap())
    }
}

/// Backend over a fixed list of submissions.
struct ListBackend {
    handle: DeploymentHandle,
    permissions: OpenPermissions,
    records: Vec<(u64, Value)>,
    counter: Option<RecordCounter>,
}

impl ListBackend {
    fn new(sink: Arc<RecordingSink>, counting: bool) -> Self {
        let store = Arc::new(InMemoryDeploymentStore::new());
        let handle = DeploymentHandle::create(AssetUid::new("aBcD"), store, sink).unwrap();
        let records = vec![
            (1, json!({"_id": 1, "q1": "yes"})),
            (2, json!({"_id": 2, "q1": "no"})),
            (3, json!({"_id": 3, "q1": "maybe"})),
        ];
        let counter = counting.then(|| RecordCounter {
            ids: records.iter().map(|(id, _)| *id).collect(),
        });
        Self {
            handle,
            permissions: OpenPermissions,
            records,
            counter,
        }
    }
}

impl DeploymentBackend for ListBackend {
    fn deployment(&self) -> &DeploymentHandle {
        &self.handle
    }

    fn permissions(&self) -> &dyn PermissionFilterProvider {
        &self.permissions
    }

    fn get_submissions(
        &self,
        principal: &PrincipalId,
        format: FormatMode,
        params: &RawSubmissionParams,
    ) -> Result<Submissions<'_>, BackendError> {
        let query = self.validate_submission_list_params(principal, format, false, params)?;
        let restrict: Vec<u64> = query.instance_id_filter().iter().map(|id| id.get()).collect();
        let start = usize::try_from(query.start().unwrap_or(0)).unwrap();
        let limit = query.limit().map_or(usize::MAX, |limit| usize::try_from(limit).unwrap());
        let iter = self
            .records
            .iter()
            .filter(move |(id, _)| restrict.is_empty() || restrict.contains(id))
            .skip(start)
            .take(limit)
            .map(move |(id, record)| match format {
                FormatMode::Structured => SubmissionRecord::Structured(record.clone()),
                FormatMode::Text => SubmissionRecord::Text(format!("<instance id=\"{id}\"/>")),
            });
        Ok(Box::new(iter))
    }

    fn submission_counter(&self) -> Option<&dyn SubmissionCounter> {
        self.counter.as_ref().map(|counter| counter as &dyn SubmissionCounter)
    }
}

fn alice() -> PrincipalId {
    PrincipalId::new("alice")
}

// ============================================================================
// SECTION: Single-Record Lookup
// ============================================================================

#[test]
fn get_submission_returns_matching_record() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    let record = backend
        .get_submission(SubmissionId::new(2), &alice(), FormatMode::Structured, &RawSubmissionParams::default())
        .unwrap();
    assert_eq!(record, Some(SubmissionRecord::Structured(json!({"_id": 2, "q1": "no"}))));
}

#[test]
fn get_submission_missing_is_none() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    let record = backend
        .get_submission(SubmissionId::new(99), &alice(), FormatMode::Text, &RawSubmissionParams::default())
        .unwrap();
    assert_eq!(record, None);
}

#[test]
fn get_submission_overrides_caller_instance_ids() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    let params = RawSubmissionParams::from_pairs([("instance_ids", "garbage")]);
    let record = backend
        .get_submission(SubmissionId::new(3), &alice(), FormatMode::Text, &params)
        .unwrap();
    assert_eq!(record, Some(SubmissionRecord::Text("<instance id=\"3\"/>".to_string())));
}

#[test]
fn get_submission_propagates_client_errors() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    let params = RawSubmissionParams::from_pairs([("count", "1")]);
    let error = backend
        .get_submission(SubmissionId::new(1), &alice(), FormatMode::Structured, &params)
        .unwrap_err();
    assert_eq!(error, BackendError::Query(SubmissionQueryError::Client(ClientInputError::CountNotSupported)));
}

// ============================================================================
// SECTION: Counting Capability
// ============================================================================

#[test]
fn count_without_capability_is_abstract() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    let error = backend.calculated_submission_count(&alice(), &RawSubmissionParams::default()).unwrap_err();
    match error {
        BackendError::Abstract(inner) => assert_eq!(inner.operation, "calculated_submission_count"),
        other => panic!("expected abstract operation error, got {other:?}"),
    }
}

#[test]
fn count_with_capability_ignores_pagination() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), true);
    let params = RawSubmissionParams::from_pairs([("limit", "0"), ("start", "x")]);
    assert_eq!(backend.calculated_submission_count(&alice(), &params).unwrap(), 3);

    let params: RawSubmissionParams = serde_json::from_value(json!({"instance_ids": [1, 3]})).unwrap();
    assert_eq!(backend.calculated_submission_count(&alice(), &params).unwrap(), 2);
}

#[test]
fn count_surfaces_authorization_faults() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), true);
    let error = backend
        .calculated_submission_count(&PrincipalId::new("ghost"), &RawSubmissionParams::default())
        .unwrap_err();
    assert!(matches!(error, BackendError::Query(SubmissionQueryError::Authorization(_))));
}

// ============================================================================
// SECTION: Document Delegation and Audit
// ============================================================================

#[test]
fn legacy_permission_flag_removal_is_inert() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    backend.save(&serde_json::from_value(json!({"active": true})).unwrap()).unwrap();
    let before = backend.get_data(None, Value::Null);
    backend.remove_legacy_permission_flag(&alice());
    assert_eq!(backend.get_data(None, Value::Null), before);
}

#[test]
fn document_accessors_delegate_to_handle() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    backend
        .save(&serde_json::from_value(json!({"backend": "mock", "version": "v9"})).unwrap())
        .unwrap();
    backend.set_status(DeploymentStatus::Synced).unwrap();
    assert_eq!(backend.backend().as_deref(), Some("mock"));
    assert_eq!(backend.version_id().as_deref(), Some("v9"));
    assert_eq!(backend.status(), Some(DeploymentStatus::Synced));
    assert_eq!(backend.identifier(), None);
    assert!(!backend.active());
}

#[test]
fn unrecognized_status_is_exposed_as_raw_text() {
    let backend = ListBackend::new(Arc::new(RecordingSink::default()), false);
    backend.save(&serde_json::from_value(json!({"status": "archived"})).unwrap()).unwrap();
    assert_eq!(backend.status(), None);
    assert_eq!(backend.status_text().as_deref(), Some("archived"));
}

#[test]
fn audit_sink_sees_writes_and_query_outcomes() {
    let sink = Arc::new(RecordingSink::default());
    let backend = ListBackend::new(Arc::clone(&sink), false);
    backend.save(&serde_json::from_value(json!({"active": true})).unwrap()).unwrap();
    let _ = backend
        .get_submissions(&alice(), FormatMode::Structured, &RawSubmissionParams::default())
        .unwrap()
        .count();
    let _ = backend.get_submissions(
        &alice(),
        FormatMode::Text,
        &RawSubmissionParams::from_pairs([("sort", "{}")]),
    );
    assert_eq!(
        sink.events(),
        [
            "deployment_merge:applied",
            "submission_query:accepted:-",
            "submission_query:rejected:sort",
        ]
    );
}
