//! In-memory [`LedgerStore`].
//!
//! Intended for tests and embedding. All state lives behind one lock, so
//! every commit is trivially atomic; [`Fault`] injection lets tests force the
//! failure paths a real backend can hit mid-commit.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  record::{InventoryRecord, NewInventoryRecord, RecordUpdate, StockPolicy},
  store::{LedgerStore, check_commit},
  transaction::{NewStockTransaction, StockTransaction, TimeRange},
};

/// A one-shot failure armed with [`MemoryStore::inject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
  /// The next `commit_pair` fails after its first leg has been staged.
  BetweenTransferLegs,
  /// The next `n` commits report a version conflict without writing.
  StaleVersion(u32),
  /// The next write fails as if the backend were unreachable.
  Unavailable,
}

#[derive(Debug, Default)]
struct Ledger {
  records:       HashMap<Uuid, InventoryRecord>,
  /// Ordered by `sequence`.
  transactions:  Vec<StockTransaction>,
  last_sequence: i64,
}

/// Cloning is cheap and shares the underlying ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  ledger: Arc<RwLock<Ledger>>,
  fault:  Arc<Mutex<Option<Fault>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Arm a fault; it replaces any fault that has not fired yet.
  pub fn inject(&self, fault: Fault) {
    if let Ok(mut slot) = self.fault.lock() {
      *slot = Some(fault);
    }
  }

  /// Every committed transaction across all records, in sequence order.
  pub fn all_transactions(&self) -> Result<Vec<StockTransaction>> {
    Ok(self.read()?.transactions.clone())
  }

  /// Synchronous snapshot of one record.
  pub fn record(&self, inventory_id: Uuid) -> Result<Option<InventoryRecord>> {
    Ok(self.read()?.records.get(&inventory_id).cloned())
  }

  fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Ledger>> {
    self
      .ledger
      .read()
      .map_err(|_| Error::store_unavailable("ledger lock poisoned"))
  }

  fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Ledger>> {
    self
      .ledger
      .write()
      .map_err(|_| Error::store_unavailable("ledger lock poisoned"))
  }

  /// Consume the armed fault if `applies` says it is relevant to this call.
  fn take_fault(&self, applies: impl Fn(Fault) -> bool) -> Option<Fault> {
    let mut slot = self.fault.lock().ok()?;
    let fault = (*slot).filter(|f| applies(*f))?;
    *slot = match fault {
      Fault::StaleVersion(n) if n > 1 => Some(Fault::StaleVersion(n - 1)),
      _ => None,
    };
    Some(fault)
  }

  /// Fail the write up front if an `Unavailable` or `StaleVersion` fault is
  /// armed.
  fn check_write_fault(&self, update: &RecordUpdate) -> Result<()> {
    match self.take_fault(|f| !matches!(f, Fault::BetweenTransferLegs)) {
      Some(Fault::Unavailable) => {
        Err(Error::store_unavailable("injected: store unavailable"))
      }
      Some(Fault::StaleVersion(_)) => Err(Error::Conflict {
        inventory_id: update.inventory_id,
        expected:     update.expected_version,
      }),
      _ => Ok(()),
    }
  }

  /// Mutate a record under the version guard, bumping version and timestamp.
  fn guarded_update(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    mutate: impl FnOnce(&mut InventoryRecord),
  ) -> Result<InventoryRecord> {
    let mut ledger = self.write()?;
    let record = ledger
      .records
      .get_mut(&inventory_id)
      .ok_or(Error::RecordNotFound(inventory_id))?;
    if record.version != expected_version {
      return Err(Error::Conflict { inventory_id, expected: expected_version });
    }
    mutate(record);
    record.version += 1;
    record.last_modified = Utc::now();
    Ok(record.clone())
  }
}

// ─── Staging ─────────────────────────────────────────────────────────────────

/// Validate one leg against the current ledger without touching it. Returns
/// the record and transaction that would be installed.
fn stage(
  ledger: &Ledger,
  update: RecordUpdate,
  input: NewStockTransaction,
  sequence: i64,
  now: DateTime<Utc>,
) -> Result<(InventoryRecord, StockTransaction)> {
  let current = ledger
    .records
    .get(&update.inventory_id)
    .ok_or(Error::RecordNotFound(update.inventory_id))?;

  if current.version != update.expected_version {
    return Err(Error::Conflict {
      inventory_id: update.inventory_id,
      expected:     update.expected_version,
    });
  }
  check_commit(current, &update, &input)?;

  let mut record = current.clone();
  record.quantity = update.quantity;
  record.version += 1;
  record.last_modified = now;

  let transaction = StockTransaction {
    transaction_id: Uuid::new_v4(),
    sequence,
    inventory_id: update.inventory_id,
    kind: input.kind,
    quantity_delta: input.quantity_delta,
    resulting_quantity: update.quantity,
    unit_cost_at_transaction: record.unit_cost,
    reference: input.memo.reference,
    notes: input.memo.notes,
    linked_transaction_id: None,
    created_at: now,
  };

  Ok((record, transaction))
}

fn install(
  ledger: &mut Ledger,
  record: InventoryRecord,
  transaction: StockTransaction,
) {
  ledger.last_sequence = ledger.last_sequence.max(transaction.sequence);
  ledger.records.insert(record.inventory_id, record);
  ledger.transactions.push(transaction);
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for MemoryStore {
  type Error = Error;

  async fn create_record(&self, input: NewInventoryRecord) -> Result<InventoryRecord> {
    input.validate()?;
    let mut ledger = self.write()?;

    let duplicate = ledger.records.values().any(|r| {
      r.product_id == input.product_id && r.location == input.location
    });
    if duplicate {
      return Err(Error::invalid_argument(format!(
        "product {} is already stocked at {:?}",
        input.product_id, input.location
      )));
    }

    let record = input.into_record(Utc::now());
    ledger.records.insert(record.inventory_id, record.clone());
    Ok(record)
  }

  async fn update_policy(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    policy: StockPolicy,
  ) -> Result<InventoryRecord> {
    policy.validate()?;
    self.guarded_update(inventory_id, expected_version, |r| policy.apply_to(r))
  }

  async fn set_active(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    active: bool,
  ) -> Result<InventoryRecord> {
    self.guarded_update(inventory_id, expected_version, |r| r.active = active)
  }

  async fn get(&self, inventory_id: Uuid) -> Result<Option<InventoryRecord>> {
    tokio::task::yield_now().await;
    Ok(self.read()?.records.get(&inventory_id).cloned())
  }

  async fn get_by_product(&self, product_id: Uuid) -> Result<Option<InventoryRecord>> {
    let records = self.list_by_product(product_id).await?;
    let active = records.iter().find(|r| r.active).cloned();
    Ok(active.or_else(|| records.into_iter().next()))
  }

  async fn list_by_product(&self, product_id: Uuid) -> Result<Vec<InventoryRecord>> {
    let mut records: Vec<_> = self
      .read()?
      .records
      .values()
      .filter(|r| r.product_id == product_id)
      .cloned()
      .collect();
    records.sort_by_key(|r| (r.created_at, r.inventory_id));
    Ok(records)
  }

  async fn list_records(&self, include_inactive: bool) -> Result<Vec<InventoryRecord>> {
    let mut records: Vec<_> = self
      .read()?
      .records
      .values()
      .filter(|r| include_inactive || r.active)
      .cloned()
      .collect();
    records.sort_by_key(|r| (r.created_at, r.inventory_id));
    Ok(records)
  }

  async fn list_low_stock(&self) -> Result<Vec<InventoryRecord>> {
    let mut records = self.list_records(false).await?;
    records.retain(InventoryRecord::is_at_or_below_reorder_point);
    Ok(records)
  }

  async fn commit(
    &self,
    update: RecordUpdate,
    transaction: NewStockTransaction,
  ) -> Result<StockTransaction> {
    tokio::task::yield_now().await;
    self.check_write_fault(&update)?;

    let mut ledger = self.write()?;
    let sequence = ledger.last_sequence + 1;
    let (record, committed) =
      stage(&ledger, update, transaction, sequence, Utc::now())?;
    install(&mut ledger, record, committed.clone());
    Ok(committed)
  }

  async fn commit_pair(
    &self,
    update_a: RecordUpdate,
    transaction_a: NewStockTransaction,
    update_b: RecordUpdate,
    transaction_b: NewStockTransaction,
  ) -> Result<(StockTransaction, StockTransaction)> {
    if update_a.inventory_id == update_b.inventory_id {
      return Err(Error::invalid_argument(
        "both legs of a pair target the same record",
      ));
    }
    tokio::task::yield_now().await;
    self.check_write_fault(&update_a)?;

    let mut ledger = self.write()?;
    let now = Utc::now();
    let sequence = ledger.last_sequence + 1;

    // Stage in ascending id order; nothing is installed until both pass.
    let a_first = update_a.inventory_id < update_b.inventory_id;
    let (first, second) = if a_first {
      ((update_a, transaction_a), (update_b, transaction_b))
    } else {
      ((update_b, transaction_b), (update_a, transaction_a))
    };

    let (first_record, mut first_txn) =
      stage(&ledger, first.0, first.1, sequence, now)?;

    if self
      .take_fault(|f| matches!(f, Fault::BetweenTransferLegs))
      .is_some()
    {
      return Err(Error::store_unavailable(
        "injected: failure between transfer legs",
      ));
    }

    let (second_record, mut second_txn) =
      stage(&ledger, second.0, second.1, sequence + 1, now)?;

    first_txn.linked_transaction_id = Some(second_txn.transaction_id);
    second_txn.linked_transaction_id = Some(first_txn.transaction_id);

    install(&mut ledger, first_record, first_txn.clone());
    install(&mut ledger, second_record, second_txn.clone());

    Ok(if a_first {
      (first_txn, second_txn)
    } else {
      (second_txn, first_txn)
    })
  }

  async fn history_page(
    &self,
    inventory_id: Uuid,
    range: TimeRange,
    after: Option<i64>,
    limit: usize,
  ) -> Result<Vec<StockTransaction>> {
    let after = after.unwrap_or(i64::MIN);
    Ok(
      self
        .read()?
        .transactions
        .iter()
        .filter(|t| t.inventory_id == inventory_id)
        .filter(|t| t.sequence > after && t.is_within(&range))
        .take(limit)
        .cloned()
        .collect(),
    )
  }

  async fn quantity_at(&self, inventory_id: Uuid, at: DateTime<Utc>) -> Result<i64> {
    Ok(
      self
        .read()?
        .transactions
        .iter()
        .rev()
        .find(|t| t.inventory_id == inventory_id && t.created_at <= at)
        .map_or(0, |t| t.resulting_quantity),
    )
  }
}
