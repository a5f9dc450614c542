use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, CancelSignal, RetryConfig, RetryError};

use super::errors::LedgerError;
use super::store::StockStore;
use super::value_objects::{RecipeLine, StockCounter, StockMutation};

// ============================================================================
// Stock Ledger
// ============================================================================
//
// Caller-facing deduct/return. Each call is one logical attempt: the store's
// locked unit of work is retried on lock conflicts only, up to the configured
// budget, with linear backoff plus jitter between attempts. Business failures
// (insufficient stock, unknown ingredient) are never retried.
//
// ============================================================================

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn StockStore>,
    retry: RetryConfig,
    cancel: CancelSignal,
    metrics: Arc<Metrics>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn StockStore>, retry: RetryConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            retry,
            cancel: CancelSignal::never(),
            metrics,
        }
    }

    /// A ledger whose retry sleeps abort when `cancel` fires
    pub fn with_cancel(&self, cancel: CancelSignal) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub async fn register(&self, counter: StockCounter) -> Result<(), LedgerError> {
        tracing::info!(
            ingredient_id = %counter.ingredient_id,
            name = %counter.name,
            quantity = counter.quantity,
            "Registering ingredient"
        );
        self.store.insert(counter).await
    }

    pub async fn level(&self, ingredient_id: Uuid) -> Result<StockCounter, LedgerError> {
        self.store.get(ingredient_id).await
    }

    pub async fn deduct(&self, ingredient_id: Uuid, quantity: u64) -> Result<StockCounter, LedgerError> {
        self.apply(ingredient_id, StockMutation::Deduct(quantity)).await
    }

    pub async fn return_stock(&self, ingredient_id: Uuid, quantity: u64) -> Result<StockCounter, LedgerError> {
        self.apply(ingredient_id, StockMutation::Return(quantity)).await
    }

    /// Deduct every line or none of them.
    ///
    /// Lines are merged per ingredient and taken in ingredient-id order. If
    /// one deduction fails, the ones already committed are returned before
    /// the error is surfaced.
    pub async fn deduct_lines(&self, lines: &[RecipeLine]) -> Result<(), LedgerError> {
        let merged = merge_lines(lines)?;
        let mut committed: Vec<(Uuid, u64)> = Vec::with_capacity(merged.len());

        for (&ingredient_id, &quantity) in &merged {
            if let Err(err) = self.deduct(ingredient_id, quantity).await {
                for (done_id, done_qty) in committed {
                    if let Err(undo) = self.return_stock(done_id, done_qty).await {
                        tracing::warn!(
                            ingredient_id = %done_id,
                            quantity = done_qty,
                            error = %undo,
                            "Failed to compensate partial deduction"
                        );
                    }
                }
                return Err(err);
            }
            committed.push((ingredient_id, quantity));
        }

        Ok(())
    }

    /// Return every line, attempting all of them even if some fail; reports
    /// the first failure.
    pub async fn return_lines(&self, lines: &[RecipeLine]) -> Result<(), LedgerError> {
        let mut first_failure = None;

        for (ingredient_id, quantity) in merge_lines(lines)? {
            if let Err(err) = self.return_stock(ingredient_id, quantity).await {
                tracing::warn!(
                    ingredient_id = %ingredient_id,
                    quantity = quantity,
                    error = %err,
                    "Failed to return stock"
                );
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn apply(&self, ingredient_id: Uuid, mutation: StockMutation) -> Result<StockCounter, LedgerError> {
        let operation = mutation.operation();

        if matches!(mutation, StockMutation::Deduct(0) | StockMutation::Return(0)) {
            return Err(LedgerError::InvalidQuantity { ingredient_id, quantity: 0 });
        }

        let outcome = retry_on_transient(&self.retry, &self.cancel, |attempt| async move {
            self.metrics.record_ledger_attempt(operation);
            tracing::debug!(
                ingredient_id = %ingredient_id,
                operation = operation,
                attempt = attempt,
                "Attempting stock mutation"
            );
            self.store.mutate(ingredient_id, mutation).await
        })
        .await;

        let error = match outcome {
            Ok(counter) => return Ok(counter),
            Err(RetryError::Permanent(err)) => err,
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::error!(
                    ingredient_id = %ingredient_id,
                    operation = operation,
                    attempts = attempts,
                    error = %last,
                    "Stock mutation exhausted its retry budget"
                );
                LedgerError::ConcurrencyExhausted {
                    ingredient_id,
                    attempts,
                    last: Box::new(last),
                }
            }
            Err(RetryError::Interrupted { attempts }) => {
                LedgerError::Interrupted { ingredient_id, attempts }
            }
        };

        self.metrics.record_ledger_failure(operation, error.kind());
        Err(error)
    }
}

fn merge_lines(lines: &[RecipeLine]) -> Result<BTreeMap<Uuid, u64>, LedgerError> {
    let mut merged = BTreeMap::new();
    for line in lines.iter().filter(|line| line.quantity > 0) {
        let total = merged.entry(line.ingredient_id).or_insert(0u64);
        *total = total.checked_add(line.quantity).ok_or(LedgerError::InvalidQuantity {
            ingredient_id: line.ingredient_id,
            quantity: line.quantity,
        })?;
    }
    Ok(merged)
}
