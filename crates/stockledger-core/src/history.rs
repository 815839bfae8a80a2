//! Lazy, restartable iteration over a record's committed transactions.
//!
//! The cursor holds no store-side state: its position is the `sequence` of
//! the last transaction it handed out. Committed transactions never change,
//! so a cursor can be dropped and resumed later from
//! [`HistoryCursor::position`] without missing or repeating rows, even while
//! writers keep appending.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::{
  Result,
  store::{DEFAULT_PAGE_SIZE, LedgerStore, StoreResultExt as _},
  transaction::{StockTransaction, TimeRange},
};

pub struct HistoryCursor<'a, S> {
  store:        &'a S,
  inventory_id: Uuid,
  range:        TimeRange,
  after:        Option<i64>,
  page_size:    usize,
  buffer:       VecDeque<StockTransaction>,
  exhausted:    bool,
}

impl<'a, S: LedgerStore> HistoryCursor<'a, S> {
  pub fn new(store: &'a S, inventory_id: Uuid, range: TimeRange) -> Self {
    Self {
      store,
      inventory_id,
      range,
      after: None,
      page_size: DEFAULT_PAGE_SIZE,
      buffer: VecDeque::new(),
      exhausted: false,
    }
  }

  /// Resume after the transaction with sequence `position`.
  pub fn starting_after(mut self, position: Option<i64>) -> Self {
    self.after = position;
    self.buffer.clear();
    self.exhausted = false;
    self
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  /// Sequence of the last transaction returned by [`Self::next`].
  pub fn position(&self) -> Option<i64> { self.after }

  /// The next transaction in ascending order, fetching a page when the
  /// local buffer runs dry.
  pub async fn next(&mut self) -> Result<Option<StockTransaction>> {
    if self.buffer.is_empty() && !self.exhausted {
      let page = self
        .store
        .history_page(self.inventory_id, self.range, self.after, self.page_size)
        .await
        .into_ledger()?;
      self.exhausted = page.len() < self.page_size;
      self.buffer.extend(page);
    }

    let next = self.buffer.pop_front();
    if let Some(txn) = &next {
      self.after = Some(txn.sequence);
    }
    Ok(next)
  }

  /// Drain the remaining transactions.
  pub async fn collect(mut self) -> Result<Vec<StockTransaction>> {
    let mut out = Vec::new();
    while let Some(txn) = self.next().await? {
      out.push(txn);
    }
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    memory::MemoryStore,
    record::{NewInventoryRecord, RecordUpdate},
    transaction::{Memo, NewStockTransaction, TransactionKind},
  };

  async fn store_with_receipts(count: i64) -> (MemoryStore, Uuid) {
    let store = MemoryStore::new();
    let record = store
      .create_record(NewInventoryRecord::new(Uuid::new_v4(), "main"))
      .await
      .unwrap();
    for _ in 0..count {
      let current = store.get(record.inventory_id).await.unwrap().unwrap();
      store
        .commit(
          RecordUpdate::from_record(&current, current.quantity + 1),
          NewStockTransaction::new(TransactionKind::Receive, 1, Memo::new()),
        )
        .await
        .unwrap();
    }
    (store, record.inventory_id)
  }

  #[tokio::test]
  async fn pages_through_everything_in_order() {
    let (store, id) = store_with_receipts(7).await;
    let all = HistoryCursor::new(&store, id, TimeRange::all())
      .with_page_size(3)
      .collect()
      .await
      .unwrap();

    assert_eq!(all.len(), 7);
    assert!(all.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert!(all.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    let quantities: Vec<_> = all.iter().map(|t| t.resulting_quantity).collect();
    assert_eq!(quantities, (1..=7).collect::<Vec<_>>());
  }

  #[tokio::test]
  async fn resumes_from_saved_position() {
    let (store, id) = store_with_receipts(5).await;
    let mut cursor =
      HistoryCursor::new(&store, id, TimeRange::all()).with_page_size(2);
    cursor.next().await.unwrap();
    cursor.next().await.unwrap();
    let saved = cursor.position();
    drop(cursor);

    let rest = HistoryCursor::new(&store, id, TimeRange::all())
      .starting_after(saved)
      .collect()
      .await
      .unwrap();
    let quantities: Vec<_> = rest.iter().map(|t| t.resulting_quantity).collect();
    assert_eq!(quantities, vec![3, 4, 5]);
  }

  #[tokio::test]
  async fn sees_rows_committed_after_creation() {
    let (store, id) = store_with_receipts(1).await;
    let mut cursor = HistoryCursor::new(&store, id, TimeRange::all());
    assert!(cursor.next().await.unwrap().is_some());

    let current = store.get(id).await.unwrap().unwrap();
    store
      .commit(
        RecordUpdate::from_record(&current, 0),
        NewStockTransaction::new(TransactionKind::Issue, -1, Memo::new()),
      )
      .await
      .unwrap();

    // The first page was short, so the cursor considers itself drained.
    assert!(cursor.next().await.unwrap().is_none());
    let resumed = HistoryCursor::new(&store, id, TimeRange::all())
      .starting_after(cursor.position())
      .collect()
      .await
      .unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].kind, TransactionKind::Issue);
  }
}
