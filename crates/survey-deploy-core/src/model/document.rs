// crates/survey-deploy-core/src/model/document.rs
// ============================================================================
// Module: Deployment Document
// Description: Per-asset JSON deployment document with merge semantics.
// Purpose: Centralize dotted-path reads and top-level merge rules.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`DeploymentDocument`] is the JSON object owned by one asset. Reads walk
//! dotted paths and apply an "empty means absent" policy: a resolved value
//! that is `null`, `false`, zero, an empty string, or an empty collection
//! yields the caller's default. Merges replace top-level keys wholesale and
//! never deep-merge nested objects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Document key holding the backend label.
pub const KEY_BACKEND: &str = "backend";
/// Document key holding the backend-side identifier.
pub const KEY_IDENTIFIER: &str = "identifier";
/// Document key holding the active flag.
pub const KEY_ACTIVE: &str = "active";
/// Document key holding the deployed version identifier.
pub const KEY_VERSION: &str = "version";
/// Document key holding the synchronization status.
pub const KEY_STATUS: &str = "status";

/// Flat top-level updates applied by a merge-write.
pub type DocumentUpdates = Map<String, Value>;

// ============================================================================
// SECTION: Deployment Status
// ============================================================================

/// Synchronization status stored under [`KEY_STATUS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Backend state matches the asset.
    #[serde(rename = "synced")]
    Synced,
    /// Backend state is behind the asset.
    #[serde(rename = "not-synced")]
    NotSynced,
}

impl DeploymentStatus {
    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::NotSynced => "not-synced",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "synced" => Some(Self::Synced),
            "not-synced" => Some(Self::NotSynced),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Document
// ============================================================================

/// JSON deployment document owned by a single asset.
///
/// # Invariants
/// - The root is always a JSON object.
/// - Merges only touch keys present in the update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentDocument(Map<String, Value>);

impl DeploymentDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an existing JSON object.
    #[must_use]
    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builds a document from a JSON value, treating non-objects as empty.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    /// Returns the underlying object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the document and returns the underlying object.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Returns the document as an owned JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Returns true when the document has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a dotted path, falling back to `default`.
    ///
    /// A missing or empty path returns a deep copy of the whole document.
    /// Missing segments, walks through non-objects, and falsy resolved values
    /// all return `default`.
    #[must_use]
    pub fn get(&self, dotted_path: Option<&str>, default: Value) -> Value {
        let Some(path) = dotted_path.filter(|path| !path.is_empty()) else {
            return self.to_value();
        };
        match self.lookup(path) {
            Some(value) if !is_falsy(value) => value.clone(),
            _ => default,
        }
    }

    /// Resolves a dotted path without applying the falsy policy.
    #[must_use]
    pub fn lookup(&self, dotted_path: &str) -> Option<&Value> {
        let mut segments = dotted_path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Applies top-level updates, replacing nested values wholesale.
    pub fn merge(&mut self, updates: &DocumentUpdates) {
        for (key, value) in updates {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl From<Map<String, Value>> for DeploymentDocument {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when a value counts as absent for dotted-path reads.
#[must_use]
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
