// crates/survey-deploy-core/tests/submission_query_validation.rs
// ============================================================================
// Module: Submission Query Validation Tests
// Description: Ordered checks, format rules, and permission scoping.
// Purpose: Pin client-visible error keys and messages for list parameters.
// ============================================================================

//! ## Overview
//! Drives [`validate_submission_list_params`] with raw parameters in both
//! formats and both modes, asserting the normalized query or the keyed
//! client error.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::cell::Cell;

use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;
use survey_deploy_core::AssetUid;
use survey_deploy_core::AuthorizationResolutionError;
use survey_deploy_core::ClientInputError;
use survey_deploy_core::ExtendedValue;
use survey_deploy_core::FormatMode;
use survey_deploy_core::ParamField;
use survey_deploy_core::PermissionFilter;
use survey_deploy_core::PrincipalId;
use survey_deploy_core::RawSubmissionParams;
use survey_deploy_core::SortDirection;
use survey_deploy_core::SubmissionId;
use survey_deploy_core::SubmissionQuery;
use survey_deploy_core::SubmissionQueryError;
use survey_deploy_core::validate_submission_list_params;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn owner_filter(_asset: &AssetUid, principal: &PrincipalId) -> Result<PermissionFilter, AuthorizationResolutionError> {
    Ok(PermissionFilter::new(json!({"_submitted_by": principal.as_str()})))
}

fn open_filter(_asset: &AssetUid, _principal: &PrincipalId) -> Result<PermissionFilter, AuthorizationResolutionError> {
    Ok(PermissionFilter::default())
}

fn validate(
    format: FormatMode,
    count_only: bool,
    params: &RawSubmissionParams,
) -> Result<SubmissionQuery, SubmissionQueryError> {
    validate_submission_list_params(
        &AssetUid::new("aXyZ"),
        &owner_filter,
        &PrincipalId::new("alice"),
        format,
        count_only,
        params,
    )
}

fn client_error(result: Result<SubmissionQuery, SubmissionQueryError>) -> ClientInputError {
    match result {
        Err(SubmissionQueryError::Client(error)) => error,
        other => panic!("expected client error, got {other:?}"),
    }
}

fn params(value: Value) -> RawSubmissionParams {
    serde_json::from_value(value).expect("raw params")
}

// ============================================================================
// SECTION: Forbidden and Format-Specific Parameters
// ============================================================================

#[test]
fn count_param_is_rejected_in_every_mode() {
    let raw = RawSubmissionParams::from_pairs([("count", "1")]);
    for format in [FormatMode::Structured, FormatMode::Text] {
        for count_only in [false, true] {
            let error = client_error(validate(format, count_only, &raw));
            assert_eq!(error, ClientInputError::CountNotSupported);
            assert_eq!(
                error.to_field_map().get("count").map(String::as_str),
                Some("This param is not implemented. Use `count` property of the response instead.")
            );
        }
    }
}

#[test]
fn explicit_null_count_is_still_rejected() {
    let raw = params(json!({"count": null}));
    assert_eq!(client_error(validate(FormatMode::Structured, false, &raw)), ClientInputError::CountNotSupported);
}

#[test]
fn text_format_rejects_sort_but_structured_accepts_it() {
    let raw = RawSubmissionParams::from_pairs([("sort", r#"{"_id": -1}"#)]);
    let error = client_error(validate(FormatMode::Text, false, &raw));
    assert_eq!(error.field(), ParamField::Sort);
    assert_eq!(error.message(), "This param is not supported in `XML` format");

    let query = validate(FormatMode::Structured, false, &raw).unwrap();
    let sort = query.sort_spec().unwrap();
    assert_eq!(sort.keys().len(), 1);
    assert_eq!(sort.keys()[0].field, "_id");
    assert_eq!(sort.keys()[0].direction, SortDirection::Descending);
}

#[test]
fn text_format_rejects_fields() {
    let raw = RawSubmissionParams::from_pairs([("fields", r#"["a"]"#)]);
    let error = client_error(validate(FormatMode::Text, false, &raw));
    assert_eq!(error, ClientInputError::FieldsNotSupportedInText);
    assert_eq!(error.message(), "This is not supported in `XML` format");
}

#[test]
fn text_format_count_only_ignores_sort_and_fields() {
    let raw = RawSubmissionParams::from_pairs([("sort", "not json"), ("fields", "also not json")]);
    let query = validate(FormatMode::Text, true, &raw).unwrap();
    assert!(query.is_count_only());
}

// ============================================================================
// SECTION: Filter and Instance Ids
// ============================================================================

#[test]
fn malformed_query_is_keyed_to_query() {
    let raw = RawSubmissionParams::from_pairs([("query", "{not json")]);
    let error = client_error(validate(FormatMode::Structured, false, &raw));
    assert_eq!(error.field(), ParamField::Query);
    assert_eq!(error.message(), "Value must be valid JSON.");
}

#[test]
fn decoded_query_object_is_accepted() {
    let raw = params(json!({"query": {"age": {"$gt": 3}}}));
    let query = validate(FormatMode::Structured, false, &raw).unwrap();
    assert_eq!(query.filter_expression().to_json(), json!({"age": {"$gt": 3}}));
}

#[test]
fn query_date_literal_becomes_datetime() {
    let raw = RawSubmissionParams::from_pairs([(
        "query",
        r#"{"_submission_time": {"$gte": {"$date": "2024-01-02T03:04:05Z"}}}"#,
    )]);
    let query = validate(FormatMode::Structured, false, &raw).unwrap();
    let outer = query.filter_expression().as_object().unwrap();
    let (_, inner) = &outer[0];
    let (operator, literal) = &inner.as_object().unwrap()[0];
    assert_eq!(operator, "$gte");
    assert!(matches!(literal, ExtendedValue::DateTime(_)));
}

#[test]
fn query_literal_wrappers_resolve_or_fail_as_query_errors() {
    let raw = RawSubmissionParams::from_pairs([(
        "query",
        r#"{"_uuid": {"$uuid": "00112233-4455-6677-8899-aabbccddeeff"}, "ref": {"$oid": "507f1f77bcf86cd799439011"}}"#,
    )]);
    let query = validate(FormatMode::Structured, false, &raw).unwrap();
    let entries = query.filter_expression().as_object().unwrap();
    assert!(matches!(entries[0].1, ExtendedValue::Binary(_)));
    assert!(matches!(entries[1].1, ExtendedValue::ObjectId(_)));

    for bad in [r#"{"ref": {"$oid": "xyz"}}"#, r#"{"at": {"$date": true}}"#] {
        let raw = RawSubmissionParams::from_pairs([("query", bad)]);
        let error = client_error(validate(FormatMode::Structured, false, &raw));
        assert_eq!(error.field(), ParamField::Query);
    }
}

#[test]
fn instance_ids_must_be_a_list() {
    for raw in [params(json!({"instance_ids": 5})), params(json!({"instance_ids": "1,2"}))] {
        let error = client_error(validate(FormatMode::Structured, false, &raw));
        assert_eq!(error, ClientInputError::InstanceIdsNotList);
        assert_eq!(error.message(), "Value must be a list.");
    }
}

#[test]
fn instance_ids_entries_are_coerced() {
    let raw = params(json!({"instance_ids": [1, "2", " 3 "]}));
    let query = validate(FormatMode::Structured, false, &raw).unwrap();
    assert_eq!(query.instance_id_filter(), &[SubmissionId::new(1), SubmissionId::new(2), SubmissionId::new(3)]);

    let raw = params(json!({"instance_ids": [1, "two"]}));
    assert_eq!(client_error(validate(FormatMode::Structured, false, &raw)), ClientInputError::InvalidInstanceId);
}

// ============================================================================
// SECTION: Count-Only Mode
// ============================================================================

#[test]
fn count_only_ignores_pagination_and_sort() {
    let raw = RawSubmissionParams::from_pairs([
        ("start", "not-a-number"),
        ("limit", "0"),
        ("sort", "{"),
        ("fields", "nope"),
        ("query", r#"{"a": 1}"#),
    ]);
    let query = validate(FormatMode::Structured, true, &raw).unwrap();
    assert!(query.is_count_only());
    assert_eq!(query.start(), None);
    assert_eq!(query.limit(), None);
    assert_eq!(query.sort_spec(), None);
    assert_eq!(query.field_projection(), None);
    assert_eq!(query.filter_expression().to_json(), json!({"a": 1}));
    assert_eq!(query.permission_filter().as_value(), &json!({"_submitted_by": "alice"}));
}

#[test]
fn count_only_serializes_without_list_keys() {
    let query = validate(FormatMode::Structured, true, &RawSubmissionParams::default()).unwrap();
    let value = serde_json::to_value(&query).unwrap();
    let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["query", "instance_ids", "permission_filters"]);
}

// ============================================================================
// SECTION: Pagination
// ============================================================================

#[test]
fn limit_zero_fails_and_one_succeeds() {
    let error = client_error(validate(FormatMode::Structured, false, &RawSubmissionParams::from_pairs([("limit", "0")])));
    assert_eq!(error.field(), ParamField::Limit);
    assert_eq!(error.message(), "A positive integer is required.");

    let query = validate(FormatMode::Structured, false, &RawSubmissionParams::from_pairs([("limit", "1")])).unwrap();
    assert_eq!(query.limit(), Some(1));
}

#[test]
fn negative_start_is_rejected() {
    let error = client_error(validate(FormatMode::Structured, false, &RawSubmissionParams::from_pairs([("start", "-5")])));
    assert_eq!(
        error,
        ClientInputError::NotAPositiveInteger {
            field: ParamField::Start
        }
    );
}

#[test]
fn defaults_apply_when_pagination_is_absent() {
    let query = validate(FormatMode::Structured, false, &RawSubmissionParams::default()).unwrap();
    assert_eq!(query.start(), Some(0));
    assert_eq!(query.limit(), None);
    assert!(query.sort_spec().unwrap().is_empty());
    assert!(query.field_projection().unwrap().is_empty());
    assert!(query.instance_id_filter().is_empty());
    assert_eq!(query.filter_expression().to_json(), json!({}));
}

#[test]
fn end_to_end_list_query() {
    let raw = RawSubmissionParams::from_pairs([("start", "0"), ("limit", "25"), ("query", r#"{"a":1}"#)]);
    let query = validate_submission_list_params(
        &AssetUid::new("aXyZ"),
        &open_filter,
        &PrincipalId::new("bob"),
        FormatMode::Structured,
        false,
        &raw,
    )
    .unwrap();
    assert_eq!(
        serde_json::to_value(&query).unwrap(),
        json!({
            "query": {"a": 1},
            "start": 0,
            "limit": 25,
            "sort": {},
            "fields": [],
            "instance_ids": [],
            "permission_filters": {}
        })
    );
}

#[test]
fn fields_projection_preserves_order() {
    let raw = RawSubmissionParams::from_pairs([("fields", r#"["b", "a", "_id"]"#)]);
    let query = validate(FormatMode::Structured, false, &raw).unwrap();
    assert_eq!(query.field_projection().unwrap(), ["b", "a", "_id"]);

    let raw = RawSubmissionParams::from_pairs([("fields", r#"{"a": 1}"#)]);
    assert_eq!(client_error(validate(FormatMode::Structured, false, &raw)), ClientInputError::InvalidFieldProjection);
}

// ============================================================================
// SECTION: Ordering and Authorization
// ============================================================================

#[test]
fn first_failure_wins_in_check_order() {
    let raw = RawSubmissionParams::from_pairs([("query", "{bad"), ("instance_ids", "nope"), ("limit", "0")]);
    assert_eq!(client_error(validate(FormatMode::Structured, false, &raw)).field(), ParamField::Query);

    let raw = RawSubmissionParams::from_pairs([("instance_ids", "nope"), ("limit", "0")]);
    assert_eq!(client_error(validate(FormatMode::Structured, false, &raw)).field(), ParamField::InstanceIds);
}

#[test]
fn authorization_failure_is_not_a_client_error() {
    let failing = |_: &AssetUid, principal: &PrincipalId| -> Result<PermissionFilter, AuthorizationResolutionError> {
        Err(AuthorizationResolutionError(format!("unknown principal {principal}")))
    };
    let result = validate_submission_list_params(
        &AssetUid::new("aXyZ"),
        &failing,
        &PrincipalId::new("ghost"),
        FormatMode::Structured,
        false,
        &RawSubmissionParams::default(),
    );
    let error = result.unwrap_err();
    assert!(!error.is_client_error());
    assert!(error.as_client_error().is_none());
    assert!(matches!(error, SubmissionQueryError::Authorization(_)));
}

#[test]
fn client_errors_short_circuit_before_permission_lookup() {
    let calls = Cell::new(0_u32);
    let counting = |_: &AssetUid, _: &PrincipalId| -> Result<PermissionFilter, AuthorizationResolutionError> {
        calls.set(calls.get() + 1);
        Ok(PermissionFilter::default())
    };
    let raw = RawSubmissionParams::from_pairs([("query", "{bad")]);
    let result = validate_submission_list_params(
        &AssetUid::new("aXyZ"),
        &counting,
        &PrincipalId::new("alice"),
        FormatMode::Structured,
        false,
        &raw,
    );
    assert!(result.is_err());
    assert_eq!(calls.get(), 0);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn any_positive_limit_round_trips(limit in 1_u64 .. 1_000_000) {
        let raw = RawSubmissionParams::from_pairs([("limit", limit.to_string())]);
        let query = validate(FormatMode::Structured, false, &raw).unwrap();
        prop_assert_eq!(query.limit(), Some(limit));
    }

    #[test]
    fn count_only_never_reads_pagination(start in ".{0,8}", limit in ".{0,8}") {
        let raw = RawSubmissionParams::from_pairs([("start", start), ("limit", limit)]);
        let query = validate(FormatMode::Text, true, &raw).unwrap();
        prop_assert!(query.is_count_only());
    }
}
