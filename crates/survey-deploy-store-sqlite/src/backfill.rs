// crates/survey-deploy-store-sqlite/src/backfill.rs
// ============================================================================
// Module: Principal Detail Backfill
// Description: Paged creation of default detail rows for every principal.
// Purpose: Give principals registered before details existed a blank record.
// Dependencies: survey-deploy-core, rusqlite, serde, serde_json
// ============================================================================

//! ## Overview
//! The backfill walks principals that have no detail row, in primary-key
//! order, one page per transaction, and inserts the blank detail record
//! `{"name": "", "organization": ""}`. Inserts ignore conflicts, so the job
//! can be interrupted and re-run. Deployments with very large principal
//! tables may skip it entirely through configuration and run it later.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::num::NonZeroU32;

use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use survey_deploy_core::BackfillAuditEvent;
use survey_deploy_core::DeploymentAuditSink;

use crate::store::SqliteDeploymentStore;
use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default number of principals handled per transaction.
pub const DEFAULT_BACKFILL_PAGE_SIZE: u32 = 10_000;

/// Backfill job configuration.
///
/// # Invariants
/// - `page_size` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackfillConfig {
    /// Skips the job entirely when set.
    #[serde(default)]
    pub skip_heavy_migrations: bool,
    /// Principals handled per transaction.
    #[serde(default = "default_page_size")]
    pub page_size: NonZeroU32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            skip_heavy_migrations: false,
            page_size: default_page_size(),
        }
    }
}

/// Returns the default backfill page size.
const fn default_page_size() -> NonZeroU32 {
    match NonZeroU32::new(DEFAULT_BACKFILL_PAGE_SIZE) {
        Some(size) => size,
        None => NonZeroU32::MIN,
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Outcome of a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Whether configuration skipped the job.
    pub skipped: bool,
    /// Non-empty pages processed.
    pub pages: u64,
    /// Detail rows inserted.
    pub inserted: u64,
}

// ============================================================================
// SECTION: Job
// ============================================================================

/// Creates blank detail rows for every principal that lacks one.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when a page transaction fails. Pages
/// committed before the failure stay committed.
pub fn backfill_principal_details(
    store: &SqliteDeploymentStore,
    config: &BackfillConfig,
    audit: &dyn DeploymentAuditSink,
) -> Result<BackfillReport, SqliteStoreError> {
    if config.skip_heavy_migrations {
        let report = BackfillReport {
            skipped: true,
            ..BackfillReport::default()
        };
        audit.record_backfill(&BackfillAuditEvent::new(true, 0, 0));
        return Ok(report);
    }

    let blank = json!({"name": "", "organization": ""}).to_string();
    let page_size = i64::from(config.page_size.get());
    let mut report = BackfillReport::default();
    let mut last_pk = 0_i64;
    loop {
        let (page_last_pk, inserted) = store.with_connection(|connection| {
            let tx = connection
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            let pks = {
                let mut statement = tx
                    .prepare(
                        "SELECT p.pk FROM principals p
                         WHERE p.pk > ?1
                           AND NOT EXISTS (
                               SELECT 1 FROM principal_details d WHERE d.principal_pk = p.pk
                           )
                         ORDER BY p.pk
                         LIMIT ?2",
                    )
                    .map_err(db_error)?;
                let rows = statement
                    .query_map(params![last_pk, page_size], |row| row.get::<_, i64>(0))
                    .map_err(db_error)?;
                rows.collect::<Result<Vec<i64>, _>>().map_err(db_error)?
            };
            let mut inserted = 0_u64;
            for pk in &pks {
                let changed = tx
                    .execute(
                        "INSERT OR IGNORE INTO principal_details (principal_pk, data) VALUES (?1, \
                         ?2)",
                        params![pk, blank],
                    )
                    .map_err(db_error)?;
                if changed > 0 {
                    inserted += 1;
                }
            }
            tx.commit().map_err(db_error)?;
            Ok((pks.last().copied(), inserted))
        })?;
        let Some(page_last_pk) = page_last_pk else {
            break;
        };
        report.pages += 1;
        report.inserted += inserted;
        last_pk = page_last_pk;
    }

    audit.record_backfill(&BackfillAuditEvent::new(false, report.pages, report.inserted));
    Ok(report)
}
