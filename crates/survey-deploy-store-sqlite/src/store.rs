// crates/survey-deploy-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Deployment Row Store
// Description: Durable DeploymentRowStore backed by SQLite WAL.
// Purpose: Merge deployment documents server-side under a row write lock.
// Dependencies: survey-deploy-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`DeploymentRowStore`] using `SQLite`.
//! Every merge is one `BEGIN IMMEDIATE` transaction running a single
//! `UPDATE ... json_set(...)` statement, so the database owns the
//! read-modify-write and concurrent merges on one asset serialize on the
//! write lock. Neither side can overwrite a key it did not send.
//!
//! Database contents are untrusted: documents that do not decode to a JSON
//! object fail closed as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde_json::Value;
use survey_deploy_core::AssetUid;
use survey_deploy_core::DeploymentDocument;
use survey_deploy_core::DeploymentRowStore;
use survey_deploy_core::DocumentRow;
use survey_deploy_core::DocumentUpdates;
use survey_deploy_core::MergeReceipt;
use survey_deploy_core::PrincipalId;
use survey_deploy_core::StoreError;
use survey_deploy_core::Timestamp;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 2;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized size of a single merge payload.
pub const MAX_UPDATE_BYTES: usize = 4 * 1024 * 1024;
/// Keys applied per merge statement; keeps `json_set` under the argument cap.
const MERGE_CHUNK_KEYS: usize = 50;
/// Serialized empty document.
const EMPTY_DOCUMENT: &str = "{}";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` deployment store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds and bounds how long a
///   merge waits for another connection's write lock.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default tuning for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates path safety limits without touching the filesystem tree.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the path is unusable.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw deployment document payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored document could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or request.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Store(message)
            }
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps engine errors into store errors.
pub(crate) fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed deployment row store.
///
/// Cloning shares the underlying connection. Separate stores opened on the
/// same file coordinate through `SQLite` locking.
#[derive(Clone)]
pub struct SqliteDeploymentStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded for exclusive use.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDeploymentStore {
    /// Opens an `SQLite`-backed deployment store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        self.with_connection(|connection| {
            connection.query_row("SELECT 1", [], |_| Ok(())).map_err(db_error)
        })
    }

    /// Registers a principal so it participates in detail backfills.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the row cannot be written.
    pub fn register_principal(&self, principal: &PrincipalId) -> Result<(), SqliteStoreError> {
        self.with_connection(|connection| {
            connection
                .execute(
                    "INSERT OR IGNORE INTO principals (principal_id) VALUES (?1)",
                    params![principal.as_str()],
                )
                .map(|_| ())
                .map_err(db_error)
        })
    }

    /// Loads the detail record for a principal, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the row cannot be read or decoded.
    pub fn principal_detail(
        &self,
        principal: &PrincipalId,
    ) -> Result<Option<Value>, SqliteStoreError> {
        let payload: Option<String> = self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT d.data FROM principal_details d
                     JOIN principals p ON p.pk = d.principal_pk
                     WHERE p.principal_id = ?1",
                    params![principal.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error)
        })?;
        payload
            .map(|text| {
                serde_json::from_str(&text).map_err(|err| {
                    SqliteStoreError::Corrupt(format!("principal detail decode failed: {err}"))
                })
            })
            .transpose()
    }

    /// Runs `f` with exclusive access to the connection.
    pub(crate) fn with_connection<T, F>(&self, f: F) -> Result<T, SqliteStoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))?;
        f(&mut guard)
    }

    /// Runs `f` inside an immediate (write-locked) transaction.
    fn write_transaction<T, F>(&self, f: F) -> Result<T, SqliteStoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    {
        self.with_connection(|connection| {
            let tx = connection
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_error)?;
            let result = f(&tx)?;
            tx.commit().map_err(db_error)?;
            Ok(result)
        })
    }

    /// Merges `updates` server-side and stamps the row.
    ///
    /// Large updates run as several chunked statements inside one
    /// transaction; they commit or roll back together.
    fn merge_updates(
        &self,
        asset: &AssetUid,
        updates: &DocumentUpdates,
    ) -> Result<MergeReceipt, SqliteStoreError> {
        let statements = build_merge_statements(updates)?;
        self.write_transaction(|tx| {
            let modified_at = next_modified_at(tx, asset)?;
            let mut rows_affected = 0;
            for (sql, mut values) in statements {
                values.push(SqlValue::Integer(modified_at.as_unix_millis()));
                values.push(SqlValue::Text(asset.as_str().to_string()));
                rows_affected =
                    tx.execute(&sql, params_from_iter(values.iter())).map_err(db_error)?;
                if rows_affected == 0 {
                    break;
                }
            }
            Ok(MergeReceipt {
                modified_at,
                rows_affected,
            })
        })
    }

    /// Resets the stored document to empty and stamps the row.
    fn clear_document(&self, asset: &AssetUid) -> Result<MergeReceipt, SqliteStoreError> {
        self.write_transaction(|tx| {
            let modified_at = next_modified_at(tx, asset)?;
            let rows_affected = tx
                .execute(
                    "UPDATE assets SET deployment_data = ?1, date_modified = ?2 WHERE uid = ?3",
                    params![EMPTY_DOCUMENT, modified_at.as_unix_millis(), asset.as_str()],
                )
                .map_err(db_error)?;
            Ok(MergeReceipt {
                modified_at,
                rows_affected,
            })
        })
    }

    /// Loads and decodes an asset row.
    fn load_row(&self, asset: &AssetUid) -> Result<Option<DocumentRow>, SqliteStoreError> {
        let row: Option<(String, Option<i64>)> = self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT deployment_data, date_modified FROM assets WHERE uid = ?1",
                    params![asset.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_error)
        })?;
        let Some((payload, modified_at)) = row else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&payload).map_err(|err| {
            SqliteStoreError::Corrupt(format!("deployment document decode failed: {err}"))
        })?;
        let Value::Object(map) = value else {
            return Err(SqliteStoreError::Corrupt(
                "deployment document is not a json object".to_string(),
            ));
        };
        Ok(Some(DocumentRow {
            document: DeploymentDocument::from_map(map),
            modified_at: modified_at.map(Timestamp::from_unix_millis),
        }))
    }
}

impl DeploymentRowStore for SqliteDeploymentStore {
    fn create(&self, asset: &AssetUid) -> Result<(), StoreError> {
        self.with_connection(|connection| {
            connection
                .execute(
                    "INSERT OR IGNORE INTO assets (uid, deployment_data) VALUES (?1, ?2)",
                    params![asset.as_str(), EMPTY_DOCUMENT],
                )
                .map(|_| ())
                .map_err(db_error)
        })
        .map_err(StoreError::from)
    }

    fn load(&self, asset: &AssetUid) -> Result<Option<DocumentRow>, StoreError> {
        self.load_row(asset).map_err(StoreError::from)
    }

    fn merge(
        &self,
        asset: &AssetUid,
        updates: &DocumentUpdates,
    ) -> Result<MergeReceipt, StoreError> {
        self.merge_updates(asset, updates).map_err(StoreError::from)
    }

    fn clear(&self, asset: &AssetUid) -> Result<MergeReceipt, StoreError> {
        self.clear_document(asset).map_err(StoreError::from)
    }

    fn delete(&self, asset: &AssetUid) -> Result<bool, StoreError> {
        self.with_connection(|connection| {
            connection
                .execute("DELETE FROM assets WHERE uid = ?1", params![asset.as_str()])
                .map(|rows| rows > 0)
                .map_err(db_error)
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Merge Statement
// ============================================================================

/// Builds the chunked merge statements and their leading bound values.
///
/// Each statement applies at most [`MERGE_CHUNK_KEYS`] keys through one
/// multi-argument `json_set`. The caller appends the timestamp and asset id,
/// which bind to the last two placeholders of every statement.
fn build_merge_statements(
    updates: &DocumentUpdates,
) -> Result<Vec<(String, Vec<SqlValue>)>, SqliteStoreError> {
    let mut total_bytes = 0_usize;
    let mut pairs = Vec::with_capacity(updates.len());
    for (key, value) in updates {
        let path = json_path_for_key(key)?;
        let encoded = serde_json::to_string(value)
            .map_err(|err| SqliteStoreError::Invalid(format!("update encode failed: {err}")))?;
        total_bytes = total_bytes.saturating_add(encoded.len());
        if total_bytes > MAX_UPDATE_BYTES {
            return Err(SqliteStoreError::Invalid(format!(
                "merge payload exceeds size limit (max {MAX_UPDATE_BYTES} bytes)"
            )));
        }
        pairs.push((path, encoded));
    }
    if pairs.is_empty() {
        return Ok(vec![merge_statement(&[])]);
    }
    Ok(pairs.chunks(MERGE_CHUNK_KEYS).map(merge_statement).collect())
}

/// Builds one `UPDATE` applying `pairs` of (path, encoded value).
fn merge_statement(pairs: &[(String, String)]) -> (String, Vec<SqlValue>) {
    let mut values = Vec::with_capacity(pairs.len() * 2 + 2);
    let mut arguments = String::new();
    for (path, encoded) in pairs {
        let path_slot = values.len() + 1;
        let value_slot = values.len() + 2;
        let _ = write!(arguments, ", ?{path_slot}, json(?{value_slot})");
        values.push(SqlValue::Text(path.clone()));
        values.push(SqlValue::Text(encoded.clone()));
    }
    let expression = if arguments.is_empty() {
        "COALESCE(deployment_data, '{}')".to_string()
    } else {
        format!("json_set(COALESCE(deployment_data, '{{}}'){arguments})")
    };
    let stamp_slot = values.len() + 1;
    let uid_slot = values.len() + 2;
    let sql = format!(
        "UPDATE assets SET deployment_data = {expression}, date_modified = ?{stamp_slot} WHERE \
         uid = ?{uid_slot}"
    );
    (sql, values)
}

/// Returns the JSON path addressing a top-level key.
///
/// `SQLite` copies quoted path labels into the document without unescaping
/// them consistently, so quotes, backslashes, and control characters are
/// rejected.
fn json_path_for_key(key: &str) -> Result<String, SqliteStoreError> {
    if key.chars().any(|ch| ch == '"' || ch == '\\' || ch.is_control()) {
        return Err(SqliteStoreError::Invalid(
            "deployment document keys must not contain quotes, backslashes, or control characters"
                .to_string(),
        ));
    }
    Ok(format!("$.\"{key}\""))
}

/// Returns a timestamp no earlier than the row's previous stamp.
fn next_modified_at(tx: &Transaction<'_>, asset: &AssetUid) -> Result<Timestamp, SqliteStoreError> {
    let previous: Option<Option<i64>> = tx
        .query_row(
            "SELECT date_modified FROM assets WHERE uid = ?1",
            params![asset.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    let now = Timestamp::now();
    Ok(match previous.flatten() {
        Some(previous) => now.max(Timestamp::from_unix_millis(previous)),
        None => now,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    Ok(())
}

/// Creates the principal tables introduced in schema version 2.
const PRINCIPAL_TABLES: &str = "CREATE TABLE IF NOT EXISTS principals (
        pk INTEGER PRIMARY KEY AUTOINCREMENT,
        principal_id TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS principal_details (
        principal_pk INTEGER PRIMARY KEY,
        data TEXT NOT NULL,
        FOREIGN KEY (principal_pk) REFERENCES principals(pk) ON DELETE CASCADE
    );";

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS assets (
                    uid TEXT PRIMARY KEY,
                    deployment_data TEXT NOT NULL DEFAULT '{}',
                    date_modified INTEGER
                );",
            )
            .map_err(db_error)?;
            tx.execute_batch(PRINCIPAL_TABLES).map_err(db_error)?;
        }
        Some(1) => {
            tx.execute_batch(PRINCIPAL_TABLES).map_err(db_error)?;
            tx.execute("UPDATE store_meta SET version = ?1", params![SCHEMA_VERSION])
                .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
