use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::errors::LedgerError;
use super::value_objects::{StockCounter, StockMutation};

// ============================================================================
// Stock Store - Row-Locked Counter Persistence
// ============================================================================
//
// `mutate` is one unit of work: take the exclusive lock on a single
// ingredient row, apply the mutation to a working copy, and commit the copy
// only if the mutation succeeded. Failing to get the lock in time is a
// LockConflict, which the ledger treats as transient.
//
// ============================================================================

#[async_trait]
pub trait StockStore: Send + Sync {
    async fn insert(&self, counter: StockCounter) -> Result<(), LedgerError>;

    async fn get(&self, ingredient_id: Uuid) -> Result<StockCounter, LedgerError>;

    async fn mutate(
        &self,
        ingredient_id: Uuid,
        mutation: StockMutation,
    ) -> Result<StockCounter, LedgerError>;
}

pub struct InMemoryStockStore {
    rows: RwLock<HashMap<Uuid, Arc<Mutex<StockCounter>>>>,
    lock_timeout: Duration,
}

impl InMemoryStockStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    async fn row(&self, ingredient_id: Uuid) -> Result<Arc<Mutex<StockCounter>>, LedgerError> {
        self.rows
            .read()
            .await
            .get(&ingredient_id)
            .cloned()
            .ok_or(LedgerError::IngredientNotFound(ingredient_id))
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn insert(&self, counter: StockCounter) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&counter.ingredient_id) {
            return Err(LedgerError::DuplicateIngredient(counter.ingredient_id));
        }
        rows.insert(counter.ingredient_id, Arc::new(Mutex::new(counter)));
        Ok(())
    }

    async fn get(&self, ingredient_id: Uuid) -> Result<StockCounter, LedgerError> {
        let row = self.row(ingredient_id).await?;
        let counter = row.lock().await;
        Ok(counter.clone())
    }

    async fn mutate(
        &self,
        ingredient_id: Uuid,
        mutation: StockMutation,
    ) -> Result<StockCounter, LedgerError> {
        let row = self.row(ingredient_id).await?;

        let mut committed = tokio::time::timeout(self.lock_timeout, row.lock())
            .await
            .map_err(|_| LedgerError::LockConflict {
                ingredient_id,
                reason: format!("row lock not acquired within {:?}", self.lock_timeout),
            })?;

        let mut working = committed.clone();
        mutation.apply(&mut working)?;
        *committed = working.clone();

        tracing::debug!(
            ingredient_id = %ingredient_id,
            operation = mutation.operation(),
            quantity = working.quantity,
            max_quantity = working.max_quantity,
            "Committed stock mutation"
        );

        Ok(working)
    }
}
