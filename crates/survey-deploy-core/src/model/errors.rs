// crates/survey-deploy-core/src/model/errors.rs
// ============================================================================
// Module: Survey Deploy Errors
// Description: Client input, authorization resolution, and capability errors.
// Purpose: Keep user-correctable failures distinct from internal faults.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`ClientInputError`] is the only error a caller can fix by changing
//! request parameters; each variant is keyed by the offending parameter.
//! [`AuthorizationResolutionError`] means the principal reference itself is
//! malformed and must surface as an internal fault. The two never collapse
//! into each other: [`SubmissionQueryError`] keeps them as separate variants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Parameter Fields
// ============================================================================

/// Request parameter names referenced by client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamField {
    /// `count`.
    Count,
    /// `start`.
    Start,
    /// `limit`.
    Limit,
    /// `sort`.
    Sort,
    /// `fields`.
    Fields,
    /// `query`.
    Query,
    /// `instance_ids`.
    InstanceIds,
}

impl ParamField {
    /// Returns the wire name of the parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Start => "start",
            Self::Limit => "limit",
            Self::Sort => "sort",
            Self::Fields => "fields",
            Self::Query => "query",
            Self::InstanceIds => "instance_ids",
        }
    }
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Client Input Errors
// ============================================================================

const MSG_COUNT: &str =
    "This param is not implemented. Use `count` property of the response instead.";
const MSG_SORT_TEXT: &str = "This param is not supported in `XML` format";
const MSG_FIELDS_TEXT: &str = "This is not supported in `XML` format";
const MSG_INVALID_JSON: &str = "Value must be valid JSON.";
const MSG_NOT_LIST: &str = "Value must be a list.";
const MSG_INSTANCE_ID: &str = "Value must be a list of non-negative integers.";
const MSG_POSITIVE_INT: &str = "A positive integer is required.";
const MSG_SORT_SPEC: &str = "Value must map field names to 1 or -1.";
const MSG_FIELD_PROJECTION: &str = "Value must be a list of field names.";

/// User-correctable request parameter error.
///
/// # Invariants
/// - Every variant maps to exactly one [`ParamField`].
/// - Messages never echo raw parameter payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientInputError {
    /// `count` was supplied as a request parameter.
    #[error("count: {}", MSG_COUNT)]
    CountNotSupported,
    /// `sort` was supplied with text serialization.
    #[error("sort: {}", MSG_SORT_TEXT)]
    SortNotSupportedInText,
    /// `fields` was supplied with text serialization.
    #[error("fields: {}", MSG_FIELDS_TEXT)]
    FieldsNotSupportedInText,
    /// A JSON-valued parameter failed to parse.
    #[error("{field}: {}", MSG_INVALID_JSON)]
    InvalidJson {
        /// Offending parameter.
        field: ParamField,
        /// Parser diagnostic.
        detail: String,
    },
    /// `instance_ids` was not a list.
    #[error("instance_ids: {}", MSG_NOT_LIST)]
    InstanceIdsNotList,
    /// `instance_ids` contained a non-integer entry.
    #[error("instance_ids: {}", MSG_INSTANCE_ID)]
    InvalidInstanceId,
    /// `start` or `limit` failed integer coercion.
    #[error("{field}: {}", MSG_POSITIVE_INT)]
    NotAPositiveInteger {
        /// Offending parameter.
        field: ParamField,
    },
    /// `sort` parsed but is not a field-to-direction object.
    #[error("sort: {}", MSG_SORT_SPEC)]
    InvalidSortSpec,
    /// `fields` parsed but is not a list of field names.
    #[error("fields: {}", MSG_FIELD_PROJECTION)]
    InvalidFieldProjection,
}

impl ClientInputError {
    /// Returns the offending parameter.
    #[must_use]
    pub const fn field(&self) -> ParamField {
        match self {
            Self::CountNotSupported => ParamField::Count,
            Self::SortNotSupportedInText | Self::InvalidSortSpec => ParamField::Sort,
            Self::FieldsNotSupportedInText | Self::InvalidFieldProjection => ParamField::Fields,
            Self::InvalidJson {
                field, ..
            }
            | Self::NotAPositiveInteger {
                field,
            } => *field,
            Self::InstanceIdsNotList | Self::InvalidInstanceId => ParamField::InstanceIds,
        }
    }

    /// Returns the human-readable message for the offending parameter.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::CountNotSupported => MSG_COUNT,
            Self::SortNotSupportedInText => MSG_SORT_TEXT,
            Self::FieldsNotSupportedInText => MSG_FIELDS_TEXT,
            Self::InvalidJson {
                ..
            } => MSG_INVALID_JSON,
            Self::InstanceIdsNotList => MSG_NOT_LIST,
            Self::InvalidInstanceId => MSG_INSTANCE_ID,
            Self::NotAPositiveInteger {
                ..
            } => MSG_POSITIVE_INT,
            Self::InvalidSortSpec => MSG_SORT_SPEC,
            Self::InvalidFieldProjection => MSG_FIELD_PROJECTION,
        }
    }

    /// Returns the field-to-message mapping exposed to clients.
    #[must_use]
    pub fn to_field_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.field().as_str().to_string(), self.message().to_string())])
    }
}

// ============================================================================
// SECTION: Internal Faults
// ============================================================================

/// Requesting principal reference could not be resolved.
///
/// # Invariants
/// - Indicates a caller defect; never reported as a client input error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid requesting principal: {0}")]
pub struct AuthorizationResolutionError(pub String);

/// Capability invoked on a backend that does not provide it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} is not implemented by this deployment backend")]
pub struct AbstractOperationError {
    /// Name of the missing operation.
    pub operation: &'static str,
}

// ============================================================================
// SECTION: Validation Outcome
// ============================================================================

/// Submission query validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionQueryError {
    /// Caller can correct the request.
    #[error("invalid submission parameters: {0}")]
    Client(#[from] ClientInputError),
    /// Internal fault while resolving permissions.
    #[error(transparent)]
    Authorization(#[from] AuthorizationResolutionError),
}

impl SubmissionQueryError {
    /// Returns true when the caller can correct the request.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Client(_))
    }

    /// Returns the client error when present.
    #[must_use]
    pub const fn as_client_error(&self) -> Option<&ClientInputError> {
        match self {
            Self::Client(error) => Some(error),
            Self::Authorization(_) => None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_prefixes_message_with_field() {
        let err = ClientInputError::NotAPositiveInteger {
            field: ParamField::Limit,
        };
        assert_eq!(err.to_string(), "limit: A positive integer is required.");
        assert!(err.source().is_none());
    }

    #[test]
    fn display_agrees_with_field_and_message_for_every_variant() {
        let all = [
            ClientInputError::CountNotSupported,
            ClientInputError::SortNotSupportedInText,
            ClientInputError::FieldsNotSupportedInText,
            ClientInputError::InvalidJson {
                field: ParamField::Query,
                detail: "EOF while parsing".to_string(),
            },
            ClientInputError::InstanceIdsNotList,
            ClientInputError::InvalidInstanceId,
            ClientInputError::NotAPositiveInteger {
                field: ParamField::Start,
            },
            ClientInputError::InvalidSortSpec,
            ClientInputError::InvalidFieldProjection,
        ];
        for err in all {
            assert_eq!(err.to_string(), format!("{}: {}", err.field(), err.message()));
        }
    }

    #[test]
    fn parse_detail_is_not_echoed() {
        let err = ClientInputError::InvalidJson {
            field: ParamField::Sort,
            detail: "secret payload".to_string(),
        };
        assert!(!err.to_string().contains("secret payload"));
    }
}
