//! [`StockEngine`]: the only writer of stock transactions.
//!
//! Each movement runs as a read-compute-commit cycle against a
//! [`LedgerStore`]. Validation always uses the record as read in the current
//! attempt, and the commit is conditional on that read's version; a lost race
//! restarts the cycle from a fresh read under the engine's [`RetryPolicy`].
//! The commit is the only externally visible effect, so a movement that is
//! dropped or fails before it returns leaves the ledger untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  cache::ProductIndex,
  history::HistoryCursor,
  record::{InventoryRecord, NewInventoryRecord, RecordUpdate, StockPolicy},
  retry::RetryPolicy,
  store::{LedgerStore, StoreResultExt as _},
  transaction::{Memo, NewStockTransaction, StockTransaction, TimeRange, TransactionKind},
};

/// Both legs of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
  pub outbound: StockTransaction,
  pub inbound:  StockTransaction,
}

#[derive(Debug, Clone)]
pub struct StockEngine<S> {
  store: S,
  retry: RetryPolicy,
  index: ProductIndex,
}

fn require_positive(quantity: i64) -> Result<()> {
  if quantity > 0 {
    Ok(())
  } else {
    Err(Error::InvalidQuantity { quantity, reason: "must be positive" })
  }
}

impl<S: LedgerStore> StockEngine<S> {
  pub fn new(store: S) -> Self {
    Self { store, retry: RetryPolicy::default(), index: ProductIndex::new() }
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn product_index(&self) -> &ProductIndex { &self.index }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn get(&self, inventory_id: Uuid) -> Result<InventoryRecord> {
    self
      .store
      .get(inventory_id)
      .await
      .into_ledger()?
      .ok_or(Error::RecordNotFound(inventory_id))
  }

  /// Resolve a product to its record through the side-cache.
  pub async fn get_by_product(&self, product_id: Uuid) -> Result<InventoryRecord> {
    self
      .index
      .resolve(&self.store, product_id)
      .await?
      .ok_or(Error::ProductNotFound(product_id))
  }

  /// Committed transactions for a record, oldest first, fetched lazily.
  pub fn history(&self, inventory_id: Uuid, range: TimeRange) -> HistoryCursor<'_, S> {
    HistoryCursor::new(&self.store, inventory_id, range)
  }

  async fn get_active(&self, inventory_id: Uuid) -> Result<InventoryRecord> {
    let record = self.get(inventory_id).await?;
    record.ensure_active()?;
    Ok(record)
  }

  // ── Provisioning ──────────────────────────────────────────────────────

  /// Create an empty record for a product at a location.
  pub async fn provision(&self, input: NewInventoryRecord) -> Result<InventoryRecord> {
    let record = self.store.create_record(input).await.into_ledger()?;
    info!(
      inventory_id = %record.inventory_id,
      product_id = %record.product_id,
      location = %record.location,
      "inventory record provisioned"
    );
    Ok(record)
  }

  pub async fn update_policy(
    &self,
    inventory_id: Uuid,
    policy: StockPolicy,
  ) -> Result<InventoryRecord> {
    policy.validate()?;
    let policy = &policy;
    self
      .retry
      .run(move |_| async move {
        let record = self.get(inventory_id).await?;
        self
          .store
          .update_policy(inventory_id, record.version, policy.clone())
          .await
          .into_ledger()
      })
      .await
  }

  /// Soft-retire a record. Retiring an inactive record is a no-op.
  pub async fn retire(&self, inventory_id: Uuid) -> Result<InventoryRecord> {
    self.set_active(inventory_id, false).await
  }

  pub async fn reactivate(&self, inventory_id: Uuid) -> Result<InventoryRecord> {
    self.set_active(inventory_id, true).await
  }

  /// Flip the active flag. Either direction can change which record
  /// `get_by_product` picks, so the product's index entry is dropped.
  async fn set_active(&self, inventory_id: Uuid, active: bool) -> Result<InventoryRecord> {
    let record = self
      .retry
      .run(move |_| async move {
        let record = self.get(inventory_id).await?;
        if record.active == active {
          return Ok(record);
        }
        self
          .store
          .set_active(inventory_id, record.version, active)
          .await
          .into_ledger()
      })
      .await?;
    self.index.invalidate(record.product_id);
    Ok(record)
  }

  // ── Movements ─────────────────────────────────────────────────────────

  /// Book `quantity` units into stock.
  pub async fn receive(
    &self,
    inventory_id: Uuid,
    quantity: i64,
    memo: Memo,
  ) -> Result<StockTransaction> {
    require_positive(quantity)?;
    let memo = &memo;
    let txn = self
      .retry
      .run(move |attempt| async move {
        let record = self.get_active(inventory_id).await?;
        let target = record.quantity.checked_add(quantity).ok_or(
          Error::InvalidQuantity { quantity, reason: "quantity would overflow" },
        )?;
        debug!(%inventory_id, attempt, version = record.version, "receive");
        self
          .store
          .commit(
            RecordUpdate::from_record(&record, target),
            NewStockTransaction::new(TransactionKind::Receive, quantity, memo.clone()),
          )
          .await
          .into_ledger()
      })
      .await?;
    log_committed(&txn);
    Ok(txn)
  }

  /// Take `quantity` units out of stock for an order.
  pub async fn issue(
    &self,
    inventory_id: Uuid,
    quantity: i64,
    memo: Memo,
  ) -> Result<StockTransaction> {
    self.decrease(inventory_id, quantity, TransactionKind::Issue, memo).await
  }

  /// Write off `quantity` damaged units.
  pub async fn record_damage(
    &self,
    inventory_id: Uuid,
    quantity: i64,
    memo: Memo,
  ) -> Result<StockTransaction> {
    self.decrease(inventory_id, quantity, TransactionKind::Damage, memo).await
  }

  /// Write off `quantity` units that went missing.
  pub async fn record_loss(
    &self,
    inventory_id: Uuid,
    quantity: i64,
    memo: Memo,
  ) -> Result<StockTransaction> {
    self.decrease(inventory_id, quantity, TransactionKind::Loss, memo).await
  }

  async fn decrease(
    &self,
    inventory_id: Uuid,
    quantity: i64,
    kind: TransactionKind,
    memo: Memo,
  ) -> Result<StockTransaction> {
    require_positive(quantity)?;
    let memo = &memo;
    let txn = self
      .retry
      .run(move |attempt| async move {
        let record = self.get_active(inventory_id).await?;
        if record.quantity < quantity {
          return Err(Error::InsufficientStock {
            available: record.quantity,
            requested: quantity,
          });
        }
        debug!(%inventory_id, %kind, attempt, version = record.version, "decrease");
        self
          .store
          .commit(
            RecordUpdate::from_record(&record, record.quantity - quantity),
            NewStockTransaction::new(kind, -quantity, memo.clone()),
          )
          .await
          .into_ledger()
      })
      .await?;
    log_committed(&txn);
    Ok(txn)
  }

  /// Set the quantity to an absolute, counted value. An adjustment to the
  /// current quantity still writes a zero-delta transaction.
  pub async fn adjust(
    &self,
    inventory_id: Uuid,
    target_quantity: i64,
    reason: impl Into<String>,
  ) -> Result<StockTransaction> {
    if target_quantity < 0 {
      return Err(Error::InvalidQuantity {
        quantity: target_quantity,
        reason:   "adjustment target must not be negative",
      });
    }
    let memo = &Memo::new().with_notes(reason);
    let txn = self
      .retry
      .run(move |attempt| async move {
        let record = self.get_active(inventory_id).await?;
        let delta = target_quantity - record.quantity;
        debug!(%inventory_id, attempt, delta, version = record.version, "adjust");
        self
          .store
          .commit(
            RecordUpdate::from_record(&record, target_quantity),
            NewStockTransaction::new(TransactionKind::Adjustment, delta, memo.clone()),
          )
          .await
          .into_ledger()
      })
      .await?;
    log_committed(&txn);
    Ok(txn)
  }

  /// Move `quantity` units between two records as one linked pair of
  /// transactions. Both records are read in ascending id order regardless
  /// of direction, and committed together or not at all.
  pub async fn transfer(
    &self,
    from_id: Uuid,
    to_id: Uuid,
    quantity: i64,
    memo: Memo,
  ) -> Result<TransferReceipt> {
    if quantity <= 0 {
      return Err(Error::invalid_argument(format!(
        "transfer quantity must be positive (got {quantity})"
      )));
    }
    if from_id == to_id {
      return Err(Error::invalid_argument(
        "cannot transfer stock to the same record",
      ));
    }

    let memo = &memo;
    let (outbound, inbound) = self
      .retry
      .run(move |attempt| async move {
        let (from, to) = self.get_pair(from_id, to_id).await?;
        if from.quantity < quantity {
          return Err(Error::InsufficientStock {
            available: from.quantity,
            requested: quantity,
          });
        }
        let target = to.quantity.checked_add(quantity).ok_or(
          Error::InvalidQuantity { quantity, reason: "quantity would overflow" },
        )?;
        debug!(
          %from_id, %to_id, attempt,
          from_version = from.version, to_version = to.version,
          "transfer"
        );
        self
          .store
          .commit_pair(
            RecordUpdate::from_record(&from, from.quantity - quantity),
            NewStockTransaction::new(TransactionKind::TransferOut, -quantity, memo.clone()),
            RecordUpdate::from_record(&to, target),
            NewStockTransaction::new(TransactionKind::TransferIn, quantity, memo.clone()),
          )
          .await
          .into_ledger()
      })
      .await?;

    info!(
      %from_id,
      %to_id,
      quantity,
      outbound = %outbound.transaction_id,
      inbound = %inbound.transaction_id,
      "transfer committed"
    );
    Ok(TransferReceipt { outbound, inbound })
  }

  /// Read both transfer records lowest id first, returned as `(from, to)`.
  async fn get_pair(
    &self,
    from_id: Uuid,
    to_id: Uuid,
  ) -> Result<(InventoryRecord, InventoryRecord)> {
    if from_id < to_id {
      let from = self.get_active(from_id).await?;
      let to = self.get_active(to_id).await?;
      Ok((from, to))
    } else {
      let to = self.get_active(to_id).await?;
      let from = self.get_active(from_id).await?;
      Ok((from, to))
    }
  }
}

fn log_committed(txn: &StockTransaction) {
  info!(
    inventory_id = %txn.inventory_id,
    kind = %txn.kind,
    delta = txn.quantity_delta,
    quantity = txn.resulting_quantity,
    transaction_id = %txn.transaction_id,
    "stock movement committed"
  );
}
