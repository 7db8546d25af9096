// crates/survey-deploy-store-sqlite/src/lib.rs
// ============================================================================
// Module: Survey Deploy SQLite Store
// Description: SQLite-backed deployment row store and maintenance jobs.
// Purpose: Provide durable, concurrency-safe deployment document storage.
// Dependencies: survey-deploy-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteDeploymentStore`] implements
//! [`survey_deploy_core::DeploymentRowStore`] on `SQLite`. The crate also
//! hosts the principal detail backfill, which shares the same database.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backfill;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backfill::BackfillConfig;
pub use backfill::BackfillReport;
pub use backfill::DEFAULT_BACKFILL_PAGE_SIZE;
pub use backfill::backfill_principal_details;
pub use store::MAX_UPDATE_BYTES;
pub use store::SqliteDeploymentStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
