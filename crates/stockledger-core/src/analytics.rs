//! Read-only figures derived from the ledger.
//!
//! Nothing here takes a lock or writes: every figure is computed on demand
//! from committed records and transactions, so the only failure besides
//! store I/O is an unknown id.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  history::HistoryCursor,
  record::InventoryRecord,
  store::{LedgerStore, StoreResultExt as _},
  transaction::{StockTransaction, TimeRange},
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// Which threshold marks a record as low on stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", content = "threshold", rename_all = "snake_case")]
pub enum LowStockPolicy {
  /// `quantity <= reorder_point`.
  #[default]
  ReorderPoint,
  /// `quantity <= minimum_level`; records without a minimum never qualify.
  MinimumLevel,
  /// `quantity <= n` regardless of the record's own policy.
  AtOrBelow(i64),
}

impl LowStockPolicy {
  pub fn is_low(&self, record: &InventoryRecord) -> bool {
    match *self {
      Self::ReorderPoint => record.is_at_or_below_reorder_point(),
      Self::MinimumLevel => {
        record.minimum_level.is_some_and(|min| record.quantity <= min)
      }
      Self::AtOrBelow(n) => record.quantity <= n,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderSuggestion {
  pub record:             InventoryRecord,
  /// `reorder_quantity`, raised to fill up to `maximum_level` when one is set.
  pub suggested_quantity: i64,
}

/// All per-record figures over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
  pub inventory_id:      Uuid,
  pub window:            TimeRange,
  pub quantity:          i64,
  pub stock_value:       Decimal,
  pub turnover_rate:     f64,
  pub days_of_inventory: Option<f64>,
  pub transaction_count: usize,
}

// ─── Pure helpers ────────────────────────────────────────────────────────────

/// Units moved out through issues and outbound transfers, divided by the
/// average on-hand quantity. The average samples `opening` and the
/// `resulting_quantity` after every transaction in `window_txns`.
pub fn turnover(opening: i64, window_txns: &[StockTransaction]) -> f64 {
  let outflow: i64 = window_txns
    .iter()
    .filter(|t| t.kind.counts_toward_turnover())
    .map(|t| t.quantity_delta.abs())
    .sum();
  if outflow == 0 {
    return 0.0;
  }

  let samples = window_txns.len() as f64 + 1.0;
  let total: i64 = opening
    + window_txns.iter().map(|t| t.resulting_quantity).sum::<i64>();
  let average = total as f64 / samples;

  if average > 0.0 { outflow as f64 / average } else { 0.0 }
}

/// Window length in days divided by turnover; `None` when nothing turned
/// over.
pub fn days_of_inventory(window: &TimeRange, turnover_rate: f64) -> Option<f64> {
  (turnover_rate > 0.0).then(|| window.length_days() / turnover_rate)
}

// ─── Analytics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Analytics<S> {
  store: S,
}

impl<S: LedgerStore> Analytics<S> {
  pub fn new(store: S) -> Self { Self { store } }

  async fn record(&self, inventory_id: Uuid) -> Result<InventoryRecord> {
    self
      .store
      .get(inventory_id)
      .await
      .into_ledger()?
      .ok_or(Error::RecordNotFound(inventory_id))
  }

  async fn window_transactions(
    &self,
    inventory_id: Uuid,
    window: TimeRange,
  ) -> Result<Vec<StockTransaction>> {
    HistoryCursor::new(&self.store, inventory_id, window).collect().await
  }

  /// Quantity immediately before `window` opens.
  async fn opening_quantity(&self, inventory_id: Uuid, window: &TimeRange) -> Result<i64> {
    match window.start.checked_sub_signed(TimeDelta::nanoseconds(1)) {
      Some(before) => self.store.quantity_at(inventory_id, before).await.into_ledger(),
      None => Ok(0),
    }
  }

  /// Active records that are low on stock under `policy`.
  pub async fn low_stock(&self, policy: LowStockPolicy) -> Result<Vec<InventoryRecord>> {
    match policy {
      LowStockPolicy::ReorderPoint => self.store.list_low_stock().await.into_ledger(),
      _ => {
        let mut records = self.store.list_records(false).await.into_ledger()?;
        records.retain(|r| policy.is_low(r));
        Ok(records)
      }
    }
  }

  pub async fn stock_value(&self, inventory_id: Uuid) -> Result<Decimal> {
    Ok(self.record(inventory_id).await?.stock_value())
  }

  /// Stock value of a product summed over all of its locations.
  pub async fn total_stock_value(&self, product_id: Uuid) -> Result<Decimal> {
    let records = self.store.list_by_product(product_id).await.into_ledger()?;
    if records.is_empty() {
      return Err(Error::ProductNotFound(product_id));
    }
    Ok(records.iter().map(InventoryRecord::stock_value).sum())
  }

  pub async fn turnover_rate(&self, inventory_id: Uuid, window: TimeRange) -> Result<f64> {
    self.record(inventory_id).await?;
    let opening = self.opening_quantity(inventory_id, &window).await?;
    let txns = self.window_transactions(inventory_id, window).await?;
    Ok(turnover(opening, &txns))
  }

  pub async fn days_of_inventory(
    &self,
    inventory_id: Uuid,
    window: TimeRange,
  ) -> Result<Option<f64>> {
    let rate = self.turnover_rate(inventory_id, window).await?;
    Ok(days_of_inventory(&window, rate))
  }

  pub async fn transaction_count(&self, inventory_id: Uuid, window: TimeRange) -> Result<usize> {
    self.record(inventory_id).await?;
    Ok(self.window_transactions(inventory_id, window).await?.len())
  }

  /// Point-in-time quantity reconstructed from `resulting_quantity`.
  pub async fn quantity_at(&self, inventory_id: Uuid, at: DateTime<Utc>) -> Result<i64> {
    self.record(inventory_id).await?;
    self.store.quantity_at(inventory_id, at).await.into_ledger()
  }

  /// A restock proposal for every record at or below its reorder point.
  pub async fn reorder_suggestions(&self) -> Result<Vec<ReorderSuggestion>> {
    let low = self.store.list_low_stock().await.into_ledger()?;
    Ok(
      low
        .into_iter()
        .map(|record| {
          let fill = record.maximum_level.map_or(0, |max| max - record.quantity);
          let suggested_quantity = record.reorder_quantity.max(fill).max(0);
          ReorderSuggestion { record, suggested_quantity }
        })
        .filter(|s| s.suggested_quantity > 0)
        .collect(),
    )
  }

  pub async fn summary(&self, inventory_id: Uuid, window: TimeRange) -> Result<InventorySummary> {
    let record = self.record(inventory_id).await?;
    let opening = self.opening_quantity(inventory_id, &window).await?;
    let txns = self.window_transactions(inventory_id, window).await?;
    let turnover_rate = turnover(opening, &txns);

    Ok(InventorySummary {
      inventory_id,
      window,
      quantity: record.quantity,
      stock_value: record.stock_value(),
      turnover_rate,
      days_of_inventory: days_of_inventory(&window, turnover_rate),
      transaction_count: txns.len(),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::Duration as ChronoDuration;

  use super::*;
  use crate::{
    engine::StockEngine,
    memory::MemoryStore,
    record::{NewInventoryRecord, StockPolicy},
    retry::RetryPolicy,
    transaction::{Memo, TransactionKind},
  };

  fn txn(kind: TransactionKind, delta: i64, resulting: i64) -> StockTransaction {
    StockTransaction {
      transaction_id: Uuid::new_v4(),
      sequence: 0,
      inventory_id: Uuid::nil(),
      kind,
      quantity_delta: delta,
      resulting_quantity: resulting,
      unit_cost_at_transaction: Decimal::ZERO,
      reference: None,
      notes: None,
      linked_transaction_id: None,
      created_at: Utc::now(),
    }
  }

  async fn setup(policy: StockPolicy) -> (StockEngine<MemoryStore>, Analytics<MemoryStore>, Uuid) {
    let store = MemoryStore::new();
    let engine = StockEngine::new(store.clone())
      .with_retry_policy(RetryPolicy::new().with_initial_delay(Duration::from_millis(1)));
    let record = engine
      .provision(NewInventoryRecord::new(Uuid::new_v4(), "main").with_policy(policy))
      .await
      .unwrap();
    (engine, Analytics::new(store), record.inventory_id)
  }

  #[test]
  fn turnover_samples_opening_and_each_transaction() {
    // Opening 10, issue 4 -> 6, receive 4 -> 10, issue 6 -> 4.
    let txns = vec![
      txn(TransactionKind::Issue, -4, 6),
      txn(TransactionKind::Receive, 4, 10),
      txn(TransactionKind::Issue, -6, 4),
    ];
    let rate = turnover(10, &txns);
    // outflow 10 over average (10 + 6 + 10 + 4) / 4 = 7.5
    assert!((rate - 10.0 / 7.5).abs() < 1e-9);
  }

  #[test]
  fn damage_and_adjustments_do_not_count_as_turnover() {
    let txns = vec![
      txn(TransactionKind::Damage, -2, 8),
      txn(TransactionKind::Adjustment, -3, 5),
    ];
    assert_eq!(turnover(10, &txns), 0.0);
  }

  #[test]
  fn days_of_inventory_is_none_without_turnover() {
    let window = TimeRange::trailing_days(Utc::now(), 30).unwrap();
    assert_eq!(days_of_inventory(&window, 0.0), None);
    let days = days_of_inventory(&window, 2.0).unwrap();
    assert!((days - 15.0).abs() < 1e-6);
  }

  #[tokio::test]
  async fn stock_value_multiplies_quantity_by_unit_cost() {
    let policy = StockPolicy { unit_cost: Decimal::new(1250, 2), ..StockPolicy::default() };
    let (engine, analytics, id) = setup(policy).await;
    engine.receive(id, 4, Memo::new()).await.unwrap();
    assert_eq!(analytics.stock_value(id).await.unwrap(), Decimal::new(5000, 2));
  }

  #[tokio::test]
  async fn total_stock_value_sums_every_location_of_a_product() {
    let store = MemoryStore::new();
    let engine = StockEngine::new(store.clone());
    let analytics = Analytics::new(store);
    let product = Uuid::new_v4();
    let costed = |unit_cost| StockPolicy { unit_cost, ..StockPolicy::default() };

    let main = engine
      .provision(NewInventoryRecord::new(product, "main").with_policy(costed(Decimal::new(250, 2))))
      .await
      .unwrap();
    let annex = engine
      .provision(NewInventoryRecord::new(product, "annex").with_policy(costed(Decimal::new(400, 2))))
      .await
      .unwrap();
    let other = engine
      .provision(NewInventoryRecord::new(Uuid::new_v4(), "main").with_policy(costed(Decimal::ONE)))
      .await
      .unwrap();
    engine.receive(main.inventory_id, 10, Memo::new()).await.unwrap();
    engine.receive(annex.inventory_id, 3, Memo::new()).await.unwrap();
    engine.receive(other.inventory_id, 100, Memo::new()).await.unwrap();

    // 10 x 2.50 + 3 x 4.00
    assert_eq!(analytics.total_stock_value(product).await.unwrap(), Decimal::new(3700, 2));
  }

  #[tokio::test]
  async fn window_figures_follow_the_ledger() {
    let (engine, analytics, id) = setup(StockPolicy::default()).await;
    let window_start = Utc::now();
    engine.receive(id, 10, Memo::new()).await.unwrap();
    engine.issue(id, 5, Memo::new()).await.unwrap();
    engine.adjust(id, 5, "count").await.unwrap();
    let window = TimeRange::new(window_start, Utc::now() + ChronoDuration::seconds(1));

    assert_eq!(analytics.transaction_count(id, window).await.unwrap(), 3);

    // outflow 5 over average (0 + 10 + 5 + 5) / 4 = 5
    let rate = analytics.turnover_rate(id, window).await.unwrap();
    assert!((rate - 1.0).abs() < 1e-9);
    let days = analytics.days_of_inventory(id, window).await.unwrap().unwrap();
    assert!((days - window.length_days()).abs() < 1e-9);

    let summary = analytics.summary(id, window).await.unwrap();
    assert_eq!(summary.quantity, 5);
    assert_eq!(summary.transaction_count, 3);
  }

  #[tokio::test]
  async fn idle_record_has_no_days_of_inventory() {
    let (engine, analytics, id) = setup(StockPolicy::default()).await;
    engine.receive(id, 10, Memo::new()).await.unwrap();
    let window = TimeRange::trailing_days(Utc::now() + ChronoDuration::seconds(1), 7).unwrap();
    assert_eq!(analytics.days_of_inventory(id, window).await.unwrap(), None);
  }

  #[tokio::test]
  async fn unknown_id_is_not_found() {
    let (_, analytics, _) = setup(StockPolicy::default()).await;
    let missing = Uuid::new_v4();
    assert!(analytics.stock_value(missing).await.unwrap_err().is_not_found());
    assert!(
      analytics
        .turnover_rate(missing, TimeRange::all())
        .await
        .unwrap_err()
        .is_not_found()
    );
    assert!(
      analytics
        .total_stock_value(Uuid::new_v4())
        .await
        .unwrap_err()
        .is_not_found()
    );
  }

  #[tokio::test]
  async fn low_stock_policies() {
    let policy = StockPolicy {
      minimum_level: Some(2),
      maximum_level: Some(20),
      reorder_point: 5,
      reorder_quantity: 8,
      unit_cost: Decimal::ONE,
    };
    let (engine, analytics, id) = setup(policy).await;
    engine.receive(id, 4, Memo::new()).await.unwrap();

    assert_eq!(analytics.low_stock(LowStockPolicy::ReorderPoint).await.unwrap().len(), 1);
    assert!(analytics.low_stock(LowStockPolicy::MinimumLevel).await.unwrap().is_empty());
    assert!(analytics.low_stock(LowStockPolicy::AtOrBelow(3)).await.unwrap().is_empty());

    let suggestions = analytics.reorder_suggestions().await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].suggested_quantity, 16);

    engine.retire(id).await.unwrap();
    assert!(analytics.low_stock(LowStockPolicy::ReorderPoint).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn quantity_at_reconstructs_past_state() {
    let (engine, analytics, id) = setup(StockPolicy::default()).await;
    engine.receive(id, 10, Memo::new()).await.unwrap();
    let midpoint = Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.issue(id, 7, Memo::new()).await.unwrap();

    assert_eq!(analytics.quantity_at(id, midpoint).await.unwrap(), 10);
    assert_eq!(analytics.quantity_at(id, Utc::now()).await.unwrap(), 3);
  }
}
