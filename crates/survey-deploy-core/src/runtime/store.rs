// crates/survey-deploy-core/src/runtime/store.rs
// ============================================================================
// Module: Survey Deploy In-Memory Store
// Description: Simple in-memory deployment row store for tests and examples.
// Purpose: Provide per-asset serialized merges without external deps.
// Dependencies: crate::{interfaces, model}
// ============================================================================

//! ## Overview
//! [`InMemoryDeploymentStore`] keeps one mutex per asset row, so merges on
//! the same asset are serialized while merges on different assets proceed
//! independently. The asset map itself is only locked long enough to find or
//! insert a row. Deletion marks the row dead under its own lock, so a merge
//! that found the row just before a delete still reports zero rows. It is
//! not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use crate::interfaces::DeploymentRowStore;
use crate::interfaces::DocumentRow;
use crate::interfaces::MergeReceipt;
use crate::interfaces::StoreError;
use crate::model::AssetUid;
use crate::model::DeploymentDocument;
use crate::model::DocumentUpdates;
use crate::model::Timestamp;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Asset row plus its liveness flag.
#[derive(Debug)]
struct RowSlot {
    /// Stored row contents.
    row: DocumentRow,
    /// False once the row has been deleted.
    live: bool,
}

/// Shared, individually locked asset row.
type SharedRow = Arc<Mutex<RowSlot>>;

/// In-memory deployment row store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeploymentStore {
    /// Asset rows keyed by asset id.
    rows: Arc<RwLock<BTreeMap<AssetUid, SharedRow>>>,
}

impl InMemoryDeploymentStore {
    /// Creates a new in-memory deployment store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the row for `asset` if it exists.
    fn row(&self, asset: &AssetUid) -> Result<Option<SharedRow>, StoreError> {
        let guard = self
            .rows
            .read()
            .map_err(|_| StoreError::Store("deployment store map lock poisoned".to_string()))?;
        Ok(guard.get(asset).cloned())
    }

    /// Applies `mutate` under the row lock and stamps the row.
    fn update<F>(&self, asset: &AssetUid, mutate: F) -> Result<MergeReceipt, StoreError>
    where
        F: FnOnce(&mut DeploymentDocument),
    {
        match self.row(asset)? {
            Some(row) => apply(&row, mutate),
            None => Ok(missing_receipt()),
        }
    }
}

/// Applies `mutate` to a live row; a deleted row affects nothing.
fn apply<F>(row: &SharedRow, mutate: F) -> Result<MergeReceipt, StoreError>
where
    F: FnOnce(&mut DeploymentDocument),
{
    let mut guard =
        row.lock().map_err(|_| StoreError::Store("deployment row lock poisoned".to_string()))?;
    if !guard.live {
        return Ok(missing_receipt());
    }
    let modified_at = guard
        .row
        .modified_at
        .map_or_else(Timestamp::now, |previous| Timestamp::now().max(previous));
    mutate(&mut guard.row.document);
    guard.row.modified_at = Some(modified_at);
    drop(guard);
    Ok(MergeReceipt {
        modified_at,
        rows_affected: 1,
    })
}

/// Receipt for a write that found no row.
fn missing_receipt() -> MergeReceipt {
    MergeReceipt {
        modified_at: Timestamp::now(),
        rows_affected: 0,
    }
}

impl DeploymentRowStore for InMemoryDeploymentStore {
    fn create(&self, asset: &AssetUid) -> Result<(), StoreError> {
        let mut guard = self
            .rows
            .write()
            .map_err(|_| StoreError::Store("deployment store map lock poisoned".to_string()))?;
        guard.entry(asset.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(RowSlot {
                row: DocumentRow {
                    document: DeploymentDocument::new(),
                    modified_at: None,
                },
                live: true,
            }))
        });
        drop(guard);
        Ok(())
    }

    fn load(&self, asset: &AssetUid) -> Result<Option<DocumentRow>, StoreError> {
        let Some(row) = self.row(asset)? else {
            return Ok(None);
        };
        let guard = row
            .lock()
            .map_err(|_| StoreError::Store("deployment row lock poisoned".to_string()))?;
        Ok(guard.live.then(|| guard.row.clone()))
    }

    fn merge(
        &self,
        asset: &AssetUid,
        updates: &DocumentUpdates,
    ) -> Result<MergeReceipt, StoreError> {
        self.update(asset, |document| document.merge(updates))
    }

    fn clear(&self, asset: &AssetUid) -> Result<MergeReceipt, StoreError> {
        self.update(asset, DeploymentDocument::clear)
    }

    fn delete(&self, asset: &AssetUid) -> Result<bool, StoreError> {
        let mut guard = self
            .rows
            .write()
            .map_err(|_| StoreError::Store("deployment store map lock poisoned".to_string()))?;
        let removed = guard.remove(asset);
        drop(guard);
        let Some(row) = removed else {
            return Ok(false);
        };
        row.lock()
            .map_err(|_| StoreError::Store("deployment row lock poisoned".to_string()))?
            .live = false;
        Ok(true)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use serde_json::json;

    use super::*;

    #[test]
    fn merge_racing_a_delete_reports_zero_rows() {
        let store = InMemoryDeploymentStore::new();
        let asset = AssetUid::new("raced");
        store.create(&asset).unwrap();
        let stale = store.row(&asset).unwrap().unwrap();
        assert!(store.delete(&asset).unwrap());

        let receipt = apply(&stale, |document| {
            document.merge(&DocumentUpdates::from_iter([("active".to_string(), json!(true))]));
        })
        .unwrap();
        assert_eq!(receipt.rows_affected, 0);
        assert!(stale.lock().unwrap().row.document.is_empty());
        assert_eq!(store.load(&asset).unwrap(), None);
    }

    #[test]
    fn recreated_asset_starts_empty() {
        let store = InMemoryDeploymentStore::new();
        let asset = AssetUid::new("again");
        store.create(&asset).unwrap();
        store
            .merge(&asset, &DocumentUpdates::from_iter([("k".to_string(), json!(1))]))
            .unwrap();
        store.delete(&asset).unwrap();
        store.create(&asset).unwrap();
        let row = store.load(&asset).unwrap().unwrap();
        assert!(row.document.is_empty());
        assert_eq!(row.modified_at, None);
    }
}
