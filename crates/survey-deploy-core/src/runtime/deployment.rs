// crates/survey-deploy-core/src/runtime/deployment.rs
// ============================================================================
// Module: Deployment Handle
// Description: In-process handle over one asset's deployment document.
// Purpose: Pair a cached document copy with atomic store merges.
// Dependencies: crate::{interfaces, model, runtime::audit}, serde_json
// ============================================================================

//! ## Overview
//! A [`DeploymentHandle`] caches the last document it loaded or wrote.
//! Reads are served from the cache and never wait on the store's row lock,
//! so they may trail a merge committed through another handle. Writes go
//! through [`DeploymentRowStore::merge`], and only after the store commits
//! does the handle fold the same updates into its cache and adopt the
//! committed timestamp. Writes through one handle hold a writer lock across
//! the store call and the cache update, so the cache applies them in commit
//! order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde_json::Value;
use thiserror::Error;

use crate::interfaces::DeploymentRowStore;
use crate::interfaces::MergeReceipt;
use crate::interfaces::StoreError;
use crate::model::AssetUid;
use crate::model::DeploymentDocument;
use crate::model::DeploymentStatus;
use crate::model::DocumentUpdates;
use crate::model::KEY_ACTIVE;
use crate::model::KEY_BACKEND;
use crate::model::KEY_IDENTIFIER;
use crate::model::KEY_STATUS;
use crate::model::KEY_VERSION;
use crate::model::Timestamp;
use crate::model::is_falsy;
use crate::runtime::audit::DeploymentAuditEvent;
use crate::runtime::audit::DeploymentAuditEventParams;
use crate::runtime::audit::DeploymentAuditSink;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Deployment handle errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeploymentError {
    /// Asset row does not exist.
    #[error("asset not found: {0}")]
    NotFound(AssetUid),
    /// Underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Cached document state.
#[derive(Debug, Clone, Default)]
struct CachedDocument {
    /// Last loaded or written document.
    document: DeploymentDocument,
    /// Timestamp of the last committed write seen by this handle.
    modified_at: Option<Timestamp>,
}

/// Handle over one asset's deployment document.
///
/// # Invariants
/// - Callers never receive a reference into the cache; reads return copies.
/// - The cache only changes after the store commits.
/// - Writes through one handle reach the cache in the order they committed.
pub struct DeploymentHandle {
    /// Owning asset.
    asset: AssetUid,
    /// Durable row store.
    store: Arc<dyn DeploymentRowStore>,
    /// Audit sink for write events.
    audit: Arc<dyn DeploymentAuditSink>,
    /// Cached document copy.
    cache: RwLock<CachedDocument>,
    /// Serializes writers across the store call and the cache update.
    writer: Mutex<()>,
}

impl DeploymentHandle {
    /// Creates the asset row (empty document) and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError`] when the row cannot be created or loaded.
    pub fn create(
        asset: AssetUid,
        store: Arc<dyn DeploymentRowStore>,
        audit: Arc<dyn DeploymentAuditSink>,
    ) -> Result<Self, DeploymentError> {
        store.create(&asset)?;
        Self::open(asset, store, audit)
    }

    /// Opens a handle over an existing asset row.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::NotFound`] when the row does not exist.
    pub fn open(
        asset: AssetUid,
        store: Arc<dyn DeploymentRowStore>,
        audit: Arc<dyn DeploymentAuditSink>,
    ) -> Result<Self, DeploymentError> {
        let row = store.load(&asset)?.ok_or_else(|| DeploymentError::NotFound(asset.clone()))?;
        Ok(Self {
            asset,
            store,
            audit,
            cache: RwLock::new(CachedDocument {
                document: row.document,
                modified_at: row.modified_at,
            }),
            writer: Mutex::new(()),
        })
    }

    /// Returns the owning asset.
    #[must_use]
    pub const fn asset(&self) -> &AssetUid {
        &self.asset
    }

    /// Returns the audit sink shared with backends built on this handle.
    #[must_use]
    pub fn audit_sink(&self) -> &dyn DeploymentAuditSink {
        self.audit.as_ref()
    }

    /// Reads a dotted path from the cached document.
    ///
    /// Without a path the whole document is returned as a deep copy. Missing
    /// paths and falsy values (`null`, `false`, `0`, `""`, `[]`, `{}`) yield
    /// `default`.
    #[must_use]
    pub fn get_data(&self, dotted_path: Option<&str>, default: Value) -> Value {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.document.get(dotted_path, default)
    }

    /// Returns an independent copy of the cached document.
    #[must_use]
    pub fn document(&self) -> DeploymentDocument {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).document.clone()
    }

    /// Returns the timestamp of the last committed write seen by this handle.
    #[must_use]
    pub fn modified_at(&self) -> Option<Timestamp> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).modified_at
    }

    /// Atomically merges `updates` into the stored document, then the cache.
    ///
    /// A merge against a deleted asset affects zero rows and still succeeds;
    /// check [`MergeReceipt::applied`] when existence matters. The cached
    /// timestamp only moves when a row was actually updated.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError`] when the store transaction fails; the cache
    /// is left untouched in that case.
    pub fn save(&self, updates: &DocumentUpdates) -> Result<MergeReceipt, DeploymentError> {
        let keys: Vec<String> = updates.keys().cloned().collect();
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let receipt = match self.store.merge(&self.asset, updates) {
            Ok(receipt) => receipt,
            Err(err) => {
                self.record("deployment_merge", keys, 0, Some(&err));
                return Err(err.into());
            }
        };
        {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.document.merge(updates);
            if receipt.applied() {
                cache.modified_at = Some(receipt.modified_at);
            }
        }
        self.record("deployment_merge", keys, receipt.rows_affected, None);
        Ok(receipt)
    }

    /// Stores a new synchronization status.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError`] when the store transaction fails.
    pub fn set_status(&self, status: DeploymentStatus) -> Result<MergeReceipt, DeploymentError> {
        let mut updates = DocumentUpdates::new();
        updates.insert(KEY_STATUS.to_string(), Value::String(status.as_str().to_string()));
        self.save(&updates)
    }

    /// Resets the document to empty, as on asset deletion or detachment.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError`] when the store transaction fails.
    pub fn delete(&self) -> Result<MergeReceipt, DeploymentError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let receipt = match self.store.clear(&self.asset) {
            Ok(receipt) => receipt,
            Err(err) => {
                self.record("deployment_clear", Vec::new(), 0, Some(&err));
                return Err(err.into());
            }
        };
        {
            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.document.clear();
            if receipt.applied() {
                cache.modified_at = Some(receipt.modified_at);
            }
        }
        self.record("deployment_clear", Vec::new(), receipt.rows_affected, None);
        Ok(receipt)
    }

    /// Reloads the cache from the store; returns false if the row is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError`] when the row cannot be read.
    pub fn refresh(&self) -> Result<bool, DeploymentError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(row) = self.store.load(&self.asset)? else {
            return Ok(false);
        };
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.document = row.document;
        cache.modified_at = row.modified_at;
        drop(cache);
        Ok(true)
    }

    /// Backend label, if set.
    #[must_use]
    pub fn backend(&self) -> Option<String> {
        value_to_string(self.get_data(Some(KEY_BACKEND), Value::Null))
    }

    /// Backend-side identifier, if set.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        value_to_string(self.get_data(Some(KEY_IDENTIFIER), Value::Null))
    }

    /// Whether the deployment is active; defaults to `false`.
    #[must_use]
    pub fn active(&self) -> bool {
        !is_falsy(&self.get_data(Some(KEY_ACTIVE), Value::Bool(false)))
    }

    /// Deployed version identifier, if set.
    #[must_use]
    pub fn version_id(&self) -> Option<String> {
        value_to_string(self.get_data(Some(KEY_VERSION), Value::Null))
    }

    /// Synchronization status, if set to a known value.
    ///
    /// A stored string other than `synced` or `not-synced` reads as `None`;
    /// use [`DeploymentHandle::status_text`] for the stored value as-is.
    #[must_use]
    pub fn status(&self) -> Option<DeploymentStatus> {
        self.status_text().as_deref().and_then(DeploymentStatus::parse)
    }

    /// Stored status value without interpretation, if set.
    #[must_use]
    pub fn status_text(&self) -> Option<String> {
        value_to_string(self.get_data(Some(KEY_STATUS), Value::Null))
    }

    /// Emits a write audit event.
    fn record(
        &self,
        event: &'static str,
        keys: Vec<String>,
        rows_affected: usize,
        error: Option<&StoreError>,
    ) {
        let outcome = match (error, rows_affected) {
            (Some(_), _) => "failed",
            (None, 0) => "missing",
            (None, _) => "applied",
        };
        self.audit.record(&DeploymentAuditEvent::new(DeploymentAuditEventParams {
            event,
            asset_uid: self.asset.clone(),
            keys,
            rows_affected,
            outcome,
            error: error.map(ToString::to_string),
        }));
    }
}

/// Renders scalar document values as strings; `null` becomes `None`.
fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}
