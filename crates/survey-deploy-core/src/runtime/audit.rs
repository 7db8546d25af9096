// crates/survey-deploy-core/src/runtime/audit.rs
// ============================================================================
// Module: Deployment Audit Logging
// Description: Structured audit events for merges, queries, and backfills.
// Purpose: Emit redacted JSON-line logs without a hard logging dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events describe what happened, never the payload: merges record the
//! touched keys but not their values, and query validations record the
//! outcome and offending parameter but not the filter text. Deployments pick
//! a sink (stderr, append-only file, or no-op) through configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::model::AssetUid;
use crate::model::FormatMode;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Deployment document audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Asset owning the document.
    pub asset_uid: AssetUid,
    /// Top-level keys touched by the write.
    pub keys: Vec<String>,
    /// Rows updated by the transaction.
    pub rows_affected: usize,
    /// Outcome label: `applied`, `missing`, or `failed`.
    pub outcome: &'static str,
    /// Error message when the write failed.
    pub error: Option<String>,
}

/// Submission query validation audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Asset being queried.
    pub asset_uid: AssetUid,
    /// Requested serialization format.
    pub format: FormatMode,
    /// Whether count-only validation was requested.
    pub count_only: bool,
    /// Outcome label: `accepted`, `rejected`, or `fault`.
    pub outcome: &'static str,
    /// Offending parameter for rejected requests.
    pub field: Option<&'static str>,
}

/// Principal detail backfill audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Whether the job was skipped by configuration.
    pub skipped: bool,
    /// Pages processed.
    pub pages: u64,
    /// Detail rows inserted.
    pub inserted: u64,
}

/// Inputs required to construct a deployment audit event.
pub struct DeploymentAuditEventParams {
    /// Event identifier.
    pub event: &'static str,
    /// Asset owning the document.
    pub asset_uid: AssetUid,
    /// Top-level keys touched by the write.
    pub keys: Vec<String>,
    /// Rows updated by the transaction.
    pub rows_affected: usize,
    /// Outcome label.
    pub outcome: &'static str,
    /// Error message when the write failed.
    pub error: Option<String>,
}

/// Inputs required to construct a query audit event.
pub struct QueryAuditEventParams {
    /// Asset being queried.
    pub asset_uid: AssetUid,
    /// Requested serialization format.
    pub format: FormatMode,
    /// Whether count-only validation was requested.
    pub count_only: bool,
    /// Outcome label.
    pub outcome: &'static str,
    /// Offending parameter for rejected requests.
    pub field: Option<&'static str>,
}

/// Returns the current time in epoch milliseconds.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

impl DeploymentAuditEvent {
    /// Creates a new deployment audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: DeploymentAuditEventParams) -> Self {
        Self {
            event: params.event,
            timestamp_ms: now_ms(),
            asset_uid: params.asset_uid,
            keys: params.keys,
            rows_affected: params.rows_affected,
            outcome: params.outcome,
            error: params.error,
        }
    }
}

impl QueryAuditEvent {
    /// Creates a new query audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: QueryAuditEventParams) -> Self {
        Self {
            event: "submission_query",
            timestamp_ms: now_ms(),
            asset_uid: params.asset_uid,
            format: params.format,
            count_only: params.count_only,
            outcome: params.outcome,
            field: params.field,
        }
    }
}

impl BackfillAuditEvent {
    /// Creates a new backfill audit event with a consistent timestamp.
    #[must_use]
    pub fn new(skipped: bool, pages: u64, inserted: u64) -> Self {
        Self {
            event: "principal_detail_backfill",
            timestamp_ms: now_ms(),
            skipped,
            pages,
            inserted,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for deployment events.
pub trait DeploymentAuditSink: Send + Sync {
    /// Record a deployment document event.
    fn record(&self, event: &DeploymentAuditEvent);

    /// Record a submission query validation event.
    fn record_query(&self, _event: &QueryAuditEvent) {}

    /// Record a backfill job event.
    fn record_backfill(&self, _event: &BackfillAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event line.
    fn write_line<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl DeploymentAuditSink for StderrAuditSink {
    fn record(&self, event: &DeploymentAuditEvent) {
        Self::write_line(event);
    }

    fn record_query(&self, event: &QueryAuditEvent) {
        Self::write_line(event);
    }

    fn record_backfill(&self, event: &BackfillAuditEvent) {
        Self::write_line(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event line.
    fn write_line<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl DeploymentAuditSink for FileAuditSink {
    fn record(&self, event: &DeploymentAuditEvent) {
        self.write_line(event);
    }

    fn record_query(&self, event: &QueryAuditEvent) {
        self.write_line(event);
    }

    fn record_backfill(&self, event: &BackfillAuditEvent) {
        self.write_line(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl DeploymentAuditSink for NoopAuditSink {
    fn record(&self, _event: &DeploymentAuditEvent) {}
}
