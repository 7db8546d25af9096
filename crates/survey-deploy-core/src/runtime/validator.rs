// crates/survey-deploy-core/src/runtime/validator.rs
// ============================================================================
// Module: Submission Query Validator
// Description: Normalizes raw submission list parameters into a query.
// Purpose: Apply format rules, type coercion, and permission scoping once.
// Dependencies: crate::{interfaces, model}, serde_json
// ============================================================================

//! ## Overview
//! [`validate_submission_list_params`] is a pure pipeline. Checks run in a
//! fixed order and the first failure wins:
//! 1. forbidden `count` parameter
//! 2. text-format rejection of `sort` and `fields` (list mode only)
//! 3. `query` parsing
//! 4. `instance_ids` shape
//! 5. permission resolution (the only external call)
//! 6. count-only short-circuit
//! 7. `sort`, `start`, `limit`, `fields`
//!
//! Client errors are keyed by parameter. A malformed principal surfaces as
//! [`AuthorizationResolutionError`] and is never downgraded to a client
//! error.
//!
//! [`AuthorizationResolutionError`]: crate::model::AuthorizationResolutionError

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::num::NonZeroU64;

use serde_json::Value;

use crate::interfaces::PermissionFilterProvider;
use crate::model::AssetUid;
use crate::model::ClientInputError;
use crate::model::CountQuery;
use crate::model::ExtendedValue;
use crate::model::FormatMode;
use crate::model::ListQuery;
use crate::model::ParamField;
use crate::model::PrincipalId;
use crate::model::RawSubmissionParams;
use crate::model::SortDirection;
use crate::model::SortKey;
use crate::model::SortSpec;
use crate::model::SubmissionId;
use crate::model::SubmissionQuery;
use crate::model::SubmissionQueryError;
use crate::model::extended_json;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates raw submission list parameters for `asset`.
///
/// When `count_only` is set, `start`, `limit`, `sort`, and `fields` are
/// ignored entirely and a [`SubmissionQuery::Count`] is returned.
///
/// # Errors
///
/// Returns [`SubmissionQueryError::Client`] for user-correctable input and
/// [`SubmissionQueryError::Authorization`] when the principal cannot be
/// resolved.
pub fn validate_submission_list_params<P>(
    asset: &AssetUid,
    permissions: &P,
    principal: &PrincipalId,
    format: FormatMode,
    count_only: bool,
    params: &RawSubmissionParams,
) -> Result<SubmissionQuery, SubmissionQueryError>
where
    P: PermissionFilterProvider + ?Sized,
{
    if params.count.is_some() {
        return Err(ClientInputError::CountNotSupported.into());
    }

    if !count_only && format == FormatMode::Text {
        if params.sort.is_some() {
            return Err(ClientInputError::SortNotSupportedInText.into());
        }
        if params.fields.is_some() {
            return Err(ClientInputError::FieldsNotSupportedInText.into());
        }
    }

    let filter_expression = parse_filter(params.query.as_ref())?;
    let instance_id_filter = parse_instance_ids(params.instance_ids.as_ref())?;

    let permission_filter = permissions.resolve(asset, principal)?;

    if count_only {
        return Ok(SubmissionQuery::Count(CountQuery {
            filter_expression,
            instance_id_filter,
            permission_filter,
        }));
    }

    let sort_spec = parse_sort(params.sort.as_ref())?;
    let start = parse_start(params.start.as_ref())?;
    let limit = parse_limit(params.limit.as_ref())?;
    let field_projection = parse_fields(params.fields.as_ref())?;

    Ok(SubmissionQuery::List(ListQuery {
        filter_expression,
        start,
        limit,
        sort_spec,
        field_projection,
        instance_id_filter,
        permission_filter,
    }))
}

// ============================================================================
// SECTION: Parameter Parsers
// ============================================================================

/// Parses a JSON-valued parameter, accepting JSON text or decoded JSON.
fn parse_json_param(field: ParamField, value: &Value) -> Result<ExtendedValue, ClientInputError> {
    let parsed = match value {
        Value::String(text) => extended_json::parse(text),
        other => extended_json::from_json(other.clone()),
    };
    parsed.map_err(|err| ClientInputError::InvalidJson {
        field,
        detail: err.to_string(),
    })
}

/// Parses `query`; absent or null means the empty filter.
fn parse_filter(value: Option<&Value>) -> Result<ExtendedValue, ClientInputError> {
    match value {
        None | Some(Value::Null) => Ok(ExtendedValue::empty_object()),
        Some(value) => parse_json_param(ParamField::Query, value),
    }
}

/// Parses `instance_ids`; the value must be a list of non-negative integers.
fn parse_instance_ids(value: Option<&Value>) -> Result<Vec<SubmissionId>, ClientInputError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                coerce_non_negative(item)
                    .map(SubmissionId::new)
                    .ok_or(ClientInputError::InvalidInstanceId)
            })
            .collect(),
        Some(_) => Err(ClientInputError::InstanceIdsNotList),
    }
}

/// Parses `sort` into an ordered field-to-direction mapping.
fn parse_sort(value: Option<&Value>) -> Result<SortSpec, ClientInputError> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(SortSpec::default()),
        Some(value) => parse_json_param(ParamField::Sort, value)?,
    };
    let entries = parsed.as_object().ok_or(ClientInputError::InvalidSortSpec)?;
    let keys = entries
        .iter()
        .map(|(field, direction)| {
            sort_direction(direction)
                .map(|direction| SortKey {
                    field: field.clone(),
                    direction,
                })
                .ok_or(ClientInputError::InvalidSortSpec)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SortSpec::new(keys))
}

/// Maps a sort direction literal to a [`SortDirection`].
fn sort_direction(value: &ExtendedValue) -> Option<SortDirection> {
    if let Some(number) = value.as_i64() {
        return match number {
            1 => Some(SortDirection::Ascending),
            -1 => Some(SortDirection::Descending),
            _ => None,
        };
    }
    match value.as_str()?.to_ascii_lowercase().as_str() {
        "asc" | "ascending" => Some(SortDirection::Ascending),
        "desc" | "descending" => Some(SortDirection::Descending),
        _ => None,
    }
}

/// Parses `start`; absent means zero.
fn parse_start(value: Option<&Value>) -> Result<u64, ClientInputError> {
    match value {
        None => Ok(0),
        Some(value) => coerce_non_negative(value).ok_or(ClientInputError::NotAPositiveInteger {
            field: ParamField::Start,
        }),
    }
}

/// Parses `limit`; absent or null means unbounded and zero is rejected.
fn parse_limit(value: Option<&Value>) -> Result<Option<NonZeroU64>, ClientInputError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_non_negative(value)
            .and_then(NonZeroU64::new)
            .map(Some)
            .ok_or(ClientInputError::NotAPositiveInteger {
                field: ParamField::Limit,
            }),
    }
}

/// Parses `fields` into an ordered projection.
fn parse_fields(value: Option<&Value>) -> Result<Vec<String>, ClientInputError> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(value) => parse_json_param(ParamField::Fields, value)?,
    };
    let items = parsed.as_array().ok_or(ClientInputError::InvalidFieldProjection)?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or(ClientInputError::InvalidFieldProjection))
        .collect()
}

/// Coerces a JSON integer or integer string to a non-negative integer.
///
/// Booleans, fractional numbers, and non-numeric strings are rejected.
fn coerce_non_negative(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => {
            text.trim().parse::<i128>().ok().and_then(|parsed| u64::try_from(parsed).ok())
        }
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
