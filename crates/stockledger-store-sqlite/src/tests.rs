//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use stockledger_core::{
  Error as LedgerError,
  analytics::Analytics,
  engine::StockEngine,
  history::HistoryCursor,
  record::{InventoryRecord, NewInventoryRecord, RecordUpdate, StockPolicy},
  store::LedgerStore,
  transaction::{Memo, NewStockTransaction, TimeRange, TransactionKind},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn provision(s: &SqliteStore, location: &str) -> InventoryRecord {
  let policy = StockPolicy {
    reorder_point: 5,
    reorder_quantity: 20,
    unit_cost: Decimal::new(1250, 2),
    ..StockPolicy::default()
  };
  s.create_record(NewInventoryRecord::new(Uuid::new_v4(), location).with_policy(policy))
    .await
    .unwrap()
}

async fn receive(s: &SqliteStore, record: &InventoryRecord, quantity: i64) -> InventoryRecord {
  s.commit(
    RecordUpdate::from_record(record, record.quantity + quantity),
    NewStockTransaction::new(TransactionKind::Receive, quantity, Memo::new()),
  )
  .await
  .unwrap();
  s.get(record.inventory_id).await.unwrap().unwrap()
}

fn into_ledger(err: Error) -> LedgerError { err.into() }

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_record() {
  let s = store().await;
  let record = provision(&s, "main").await;
  assert_eq!(record.quantity, 0);
  assert_eq!(record.version, 0);
  assert!(record.active);

  let fetched = s.get(record.inventory_id).await.unwrap().unwrap();
  assert_eq!(fetched, record);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_location_is_rejected() {
  let s = store().await;
  let record = provision(&s, "main").await;
  let err = s
    .create_record(NewInventoryRecord::new(record.product_id, "main"))
    .await
    .unwrap_err();
  assert!(matches!(into_ledger(err), LedgerError::InvalidArgument(_)));
}

#[tokio::test]
async fn get_by_product_prefers_oldest_active() {
  let s = store().await;
  let product = Uuid::new_v4();
  let main = s
    .create_record(NewInventoryRecord::new(product, "main"))
    .await
    .unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(2)).await;
  let annex = s
    .create_record(NewInventoryRecord::new(product, "annex"))
    .await
    .unwrap();

  let found = s.get_by_product(product).await.unwrap().unwrap();
  assert_eq!(found.inventory_id, main.inventory_id);

  s.set_active(main.inventory_id, main.version, false).await.unwrap();
  let found = s.get_by_product(product).await.unwrap().unwrap();
  assert_eq!(found.inventory_id, annex.inventory_id);

  assert_eq!(s.list_by_product(product).await.unwrap().len(), 2);
  assert_eq!(s.list_records(false).await.unwrap().len(), 1);
  assert_eq!(s.list_records(true).await.unwrap().len(), 2);
}

#[tokio::test]
async fn policy_update_is_version_guarded() {
  let s = store().await;
  let record = provision(&s, "main").await;
  let policy = StockPolicy {
    minimum_level: Some(1),
    maximum_level: Some(50),
    reorder_point: 10,
    reorder_quantity: 30,
    unit_cost: Decimal::new(999, 2),
  };

  let updated = s
    .update_policy(record.inventory_id, record.version, policy.clone())
    .await
    .unwrap();
  assert_eq!(updated.version, 1);
  assert_eq!(StockPolicy::from(&updated), policy);

  let err = s
    .update_policy(record.inventory_id, record.version, policy)
    .await
    .unwrap_err();
  assert!(into_ledger(err).is_conflict());
}

#[tokio::test]
async fn guarded_write_to_missing_record_is_not_found() {
  let s = store().await;
  let err = s.set_active(Uuid::new_v4(), 0, false).await.unwrap_err();
  assert!(into_ledger(err).is_not_found());
}

// ─── Commits ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_bumps_version_and_appends() {
  let s = store().await;
  let record = provision(&s, "main").await;
  let after = receive(&s, &record, 12).await;

  assert_eq!(after.quantity, 12);
  assert_eq!(after.version, 1);

  let history = HistoryCursor::new(&s, record.inventory_id, TimeRange::all())
    .collect()
    .await
    .unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].kind, TransactionKind::Receive);
  assert_eq!(history[0].resulting_quantity, 12);
  assert_eq!(history[0].unit_cost_at_transaction, Decimal::new(1250, 2));
}

#[tokio::test]
async fn stale_commit_is_a_conflict_and_writes_nothing() {
  let s = store().await;
  let record = provision(&s, "main").await;
  receive(&s, &record, 5).await;

  let err = s
    .commit(
      RecordUpdate::from_record(&record, 3),
      NewStockTransaction::new(TransactionKind::Receive, 3, Memo::new()),
    )
    .await
    .unwrap_err();
  assert!(into_ledger(err).is_conflict());

  let history = HistoryCursor::new(&s, record.inventory_id, TimeRange::all())
    .collect()
    .await
    .unwrap();
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn commit_cannot_go_negative() {
  let s = store().await;
  let record = provision(&s, "main").await;
  let err = s
    .commit(
      RecordUpdate::from_record(&record, -1),
      NewStockTransaction::new(TransactionKind::Issue, -1, Memo::new()),
    )
    .await
    .unwrap_err();
  assert!(matches!(into_ledger(err), LedgerError::InvalidQuantity { .. }));
}

#[tokio::test]
async fn pair_is_linked_and_shares_timestamp() {
  let s = store().await;
  let from = receive(&s, &provision(&s, "a").await, 10).await;
  let to = provision(&s, "b").await;

  let (out, inn) = s
    .commit_pair(
      RecordUpdate::from_record(&from, 6),
      NewStockTransaction::new(TransactionKind::TransferOut, -4, Memo::reference("T-1")),
      RecordUpdate::from_record(&to, 4),
      NewStockTransaction::new(TransactionKind::TransferIn, 4, Memo::reference("T-1")),
    )
    .await
    .unwrap();

  assert_eq!(out.inventory_id, from.inventory_id);
  assert_eq!(inn.inventory_id, to.inventory_id);
  assert_eq!(out.linked_transaction_id, Some(inn.transaction_id));
  assert_eq!(inn.linked_transaction_id, Some(out.transaction_id));
  assert_eq!(out.created_at, inn.created_at);

  let stored = HistoryCursor::new(&s, to.inventory_id, TimeRange::all())
    .collect()
    .await
    .unwrap();
  assert_eq!(stored, vec![inn]);
}

#[tokio::test]
async fn pair_with_stale_second_leg_rolls_back_first() {
  let s = store().await;
  let a = receive(&s, &provision(&s, "a").await, 10).await;
  let b = receive(&s, &provision(&s, "b").await, 10).await;
  // Legs are applied in ascending id order; make the later one stale.
  let (low, high) = if a.inventory_id < b.inventory_id { (a, b) } else { (b, a) };
  let stale_high = RecordUpdate {
    expected_version: high.version - 1,
    ..RecordUpdate::from_record(&high, 12)
  };

  let err = s
    .commit_pair(
      RecordUpdate::from_record(&low, 8),
      NewStockTransaction::new(TransactionKind::TransferOut, -2, Memo::new()),
      stale_high,
      NewStockTransaction::new(TransactionKind::TransferIn, 2, Memo::new()),
    )
    .await
    .unwrap_err();
  assert!(into_ledger(err).is_conflict());

  let low_after = s.get(low.inventory_id).await.unwrap().unwrap();
  assert_eq!(low_after, low);
  let low_history = HistoryCursor::new(&s, low.inventory_id, TimeRange::all())
    .collect()
    .await
    .unwrap();
  assert_eq!(low_history.len(), 1);
}

#[tokio::test]
async fn pair_on_one_record_is_rejected() {
  let s = store().await;
  let record = provision(&s, "main").await;
  let err = s
    .commit_pair(
      RecordUpdate::from_record(&record, 0),
      NewStockTransaction::new(TransactionKind::TransferOut, 0, Memo::new()),
      RecordUpdate::from_record(&record, 0),
      NewStockTransaction::new(TransactionKind::TransferIn, 0, Memo::new()),
    )
    .await
    .unwrap_err();
  assert!(matches!(into_ledger(err), LedgerError::InvalidArgument(_)));
}

// ─── Ledger reads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_pages_resume_by_sequence() {
  let s = store().await;
  let mut record = provision(&s, "main").await;
  for _ in 0..5 {
    record = receive(&s, &record, 1).await;
  }

  let first = s
    .history_page(record.inventory_id, TimeRange::all(), None, 2)
    .await
    .unwrap();
  assert_eq!(first.len(), 2);
  let rest = s
    .history_page(record.inventory_id, TimeRange::all(), Some(first[1].sequence), 10)
    .await
    .unwrap();
  let quantities: Vec<_> = rest.iter().map(|t| t.resulting_quantity).collect();
  assert_eq!(quantities, vec![3, 4, 5]);
}

#[tokio::test]
async fn history_respects_time_range() {
  let s = store().await;
  let record = provision(&s, "main").await;
  receive(&s, &record, 3).await;

  let future = TimeRange::new(Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2));
  let page = s
    .history_page(record.inventory_id, future, None, 10)
    .await
    .unwrap();
  assert!(page.is_empty());
}

#[tokio::test]
async fn quantity_at_replays_resulting_quantity() {
  let s = store().await;
  let record = provision(&s, "main").await;
  let before = Utc::now() - Duration::seconds(1);
  receive(&s, &record, 9).await;

  assert_eq!(s.quantity_at(record.inventory_id, before).await.unwrap(), 0);
  assert_eq!(
    s.quantity_at(record.inventory_id, Utc::now() + Duration::seconds(1))
      .await
      .unwrap(),
    9
  );
}

#[tokio::test]
async fn low_stock_lists_active_records_at_reorder_point() {
  let s = store().await;
  let low = receive(&s, &provision(&s, "low").await, 5).await;
  receive(&s, &provision(&s, "full").await, 50).await;
  let retired = provision(&s, "retired").await;
  s.set_active(retired.inventory_id, retired.version, false).await.unwrap();

  let listed = s.list_low_stock().await.unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].inventory_id, low.inventory_id);
}

// ─── Through the engine ──────────────────────────────────────────────────────

#[tokio::test]
async fn engine_runs_movements_on_sqlite() {
  let s = store().await;
  let engine = StockEngine::new(s.clone());
  let a = engine
    .provision(NewInventoryRecord::new(Uuid::new_v4(), "a"))
    .await
    .unwrap();
  let b = engine
    .provision(NewInventoryRecord::new(Uuid::new_v4(), "b"))
    .await
    .unwrap();

  engine.receive(a.inventory_id, 100, Memo::reference("PO-1")).await.unwrap();
  engine.issue(a.inventory_id, 30, Memo::reference("SO-1")).await.unwrap();
  engine.transfer(a.inventory_id, b.inventory_id, 20, Memo::new()).await.unwrap();
  engine.adjust(b.inventory_id, 18, "cycle count").await.unwrap();

  assert_eq!(engine.get(a.inventory_id).await.unwrap().quantity, 50);
  assert_eq!(engine.get(b.inventory_id).await.unwrap().quantity, 18);

  let err = engine.issue(b.inventory_id, 19, Memo::new()).await.unwrap_err();
  assert!(matches!(err, LedgerError::InsufficientStock { available: 18, requested: 19 }));

  let analytics = Analytics::new(s);
  let window = TimeRange::new(Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1));
  assert_eq!(analytics.transaction_count(a.inventory_id, window).await.unwrap(), 3);
  assert!(analytics.turnover_rate(a.inventory_id, window).await.unwrap() > 0.0);
}
