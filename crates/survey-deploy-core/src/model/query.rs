// crates/survey-deploy-core/src/model/query.rs
// ============================================================================
// Module: Submission Query Model
// Description: Raw request parameters and the normalized submission query.
// Purpose: Give the validator a typed input boundary and a typed output.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`RawSubmissionParams`] captures loosely typed request parameters exactly
//! as received, distinguishing "absent" from "present but null". The
//! validator turns it into a [`SubmissionQuery`], which is either a count-only
//! descriptor or a full list descriptor. Count-only queries have no
//! pagination, sort, or projection fields at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeMap;
use serde_json::Value;

use crate::model::extended_json::ExtendedValue;
use crate::model::identifiers::SubmissionId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Field name holding the submission primary key in the corpus.
pub const INSTANCE_ID_FIELDNAME: &str = "_id";

// ============================================================================
// SECTION: Format Mode
// ============================================================================

/// Serialization format requested for submission payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FormatMode {
    /// Structured JSON records.
    #[default]
    #[serde(rename = "json")]
    Structured,
    /// XML text instances.
    #[serde(rename = "xml")]
    Text,
}

impl FormatMode {
    /// Returns the wire label used in request parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "json",
            Self::Text => "xml",
        }
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Raw Parameters
// ============================================================================

/// Untrusted submission list parameters.
///
/// # Invariants
/// - `None` means the key was absent; `Some(Value::Null)` means it was sent.
/// - No coercion happens here; the validator owns every type check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSubmissionParams {
    /// Forbidden `count` parameter.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub count: Option<Value>,
    /// Offset into the result set.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub start: Option<Value>,
    /// Maximum number of records.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub limit: Option<Value>,
    /// Sort specification, object or JSON text.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    /// Field projection, list or JSON text.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    /// Filter expression, object or JSON text.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Submission id restriction.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub instance_ids: Option<Value>,
}

impl RawSubmissionParams {
    /// Builds parameters from string key/value pairs such as a URL query.
    ///
    /// Unknown keys are ignored; a repeated key keeps its last value.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = Some(Value::String(value.into()));
            match key.as_ref() {
                "count" => params.count = value,
                "start" => params.start = value,
                "limit" => params.limit = value,
                "sort" => params.sort = value,
                "fields" => params.fields = value,
                "query" => params.query = value,
                "instance_ids" => params.instance_ids = value,
                _ => {}
            }
        }
        params
    }

    /// Returns a copy restricted to the given submission ids.
    #[must_use]
    pub fn with_instance_ids(mut self, ids: &[SubmissionId]) -> Self {
        self.instance_ids = Some(Value::Array(ids.iter().map(|id| Value::from(id.get())).collect()));
        self
    }
}

/// Deserializes a present field, keeping explicit `null` as `Some(Null)`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ============================================================================
// SECTION: Sort Specification
// ============================================================================

/// Sort direction for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Ascending order (`1`).
    Ascending,
    /// Descending order (`-1`).
    Descending,
}

impl SortDirection {
    /// Returns the numeric direction used by document stores.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Single sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    /// Field path.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Ordered sort specification; serializes as `{field: 1 | -1, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(Vec<SortKey>);

impl SortSpec {
    /// Creates a sort specification from ordered keys.
    #[must_use]
    pub const fn new(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }

    /// Returns the ordered keys.
    #[must_use]
    pub fn keys(&self) -> &[SortKey] {
        &self.0
    }

    /// Returns true when no ordering was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SortSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for key in &self.0 {
            map.serialize_entry(&key.field, &key.direction.as_i64())?;
        }
        map.end()
    }
}

// ============================================================================
// SECTION: Permission Filter
// ============================================================================

/// Opaque visibility constraint produced by the permission provider.
///
/// # Invariants
/// - Backends must AND this fragment into every executed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionFilter(Value);

impl PermissionFilter {
    /// Wraps a provider-specific filter fragment.
    #[must_use]
    pub const fn new(fragment: Value) -> Self {
        Self(fragment)
    }

    /// Returns the raw fragment.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

impl Default for PermissionFilter {
    fn default() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }
}

// ============================================================================
// SECTION: Submission Query
// ============================================================================

/// Minimal descriptor used for result counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountQuery {
    /// Filter expression.
    #[serde(rename = "query")]
    pub(crate) filter_expression: ExtendedValue,
    /// Submission id restriction.
    #[serde(rename = "instance_ids")]
    pub(crate) instance_id_filter: Vec<SubmissionId>,
    /// Visibility constraint.
    #[serde(rename = "permission_filters")]
    pub(crate) permission_filter: PermissionFilter,
}

/// Full descriptor used for paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListQuery {
    /// Filter expression.
    #[serde(rename = "query")]
    pub(crate) filter_expression: ExtendedValue,
    /// Offset into the result set.
    pub(crate) start: u64,
    /// Optional page size; absent means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) limit: Option<NonZeroU64>,
    /// Ordering.
    #[serde(rename = "sort")]
    pub(crate) sort_spec: SortSpec,
    /// Projected fields; empty means all.
    #[serde(rename = "fields")]
    pub(crate) field_projection: Vec<String>,
    /// Submission id restriction.
    #[serde(rename = "instance_ids")]
    pub(crate) instance_id_filter: Vec<SubmissionId>,
    /// Visibility constraint.
    #[serde(rename = "permission_filters")]
    pub(crate) permission_filter: PermissionFilter,
}

/// Normalized, permission-scoped submission query.
///
/// # Invariants
/// - `Count` carries no pagination, sort, or projection by construction.
/// - Values are immutable once produced by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubmissionQuery {
    /// Count-only descriptor.
    Count(CountQuery),
    /// Paginated list descriptor.
    List(ListQuery),
}

impl SubmissionQuery {
    /// Returns true for count-only descriptors.
    #[must_use]
    pub const fn is_count_only(&self) -> bool {
        matches!(self, Self::Count(_))
    }

    /// Returns the filter expression.
    #[must_use]
    pub const fn filter_expression(&self) -> &ExtendedValue {
        match self {
            Self::Count(query) => &query.filter_expression,
            Self::List(query) => &query.filter_expression,
        }
    }

    /// Returns the submission id restriction.
    #[must_use]
    pub fn instance_id_filter(&self) -> &[SubmissionId] {
        match self {
            Self::Count(query) => &query.instance_id_filter,
            Self::List(query) => &query.instance_id_filter,
        }
    }

    /// Returns the visibility constraint.
    #[must_use]
    pub const fn permission_filter(&self) -> &PermissionFilter {
        match self {
            Self::Count(query) => &query.permission_filter,
            Self::List(query) => &query.permission_filter,
        }
    }

    /// Returns the offset for list queries.
    #[must_use]
    pub const fn start(&self) -> Option<u64> {
        match self {
            Self::Count(_) => None,
            Self::List(query) => Some(query.start),
        }
    }

    /// Returns the page size for list queries that set one.
    #[must_use]
    pub const fn limit(&self) -> Option<u64> {
        match self {
            Self::Count(_) => None,
            Self::List(query) => match query.limit {
                Some(limit) => Some(limit.get()),
                None => None,
            },
        }
    }

    /// Returns the ordering for list queries.
    #[must_use]
    pub const fn sort_spec(&self) -> Option<&SortSpec> {
        match self {
            Self::Count(_) => None,
            Self::List(query) => Some(&query.sort_spec),
        }
    }

    /// Returns the projection for list queries.
    #[must_use]
    pub fn field_projection(&self) -> Option<&[String]> {
        match self {
            Self::Count(_) => None,
            Self::List(query) => Some(&query.field_projection),
        }
    }
}
