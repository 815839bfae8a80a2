//! [`SqliteStore`]: the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use stockledger_core::{
  Error as LedgerError,
  record::{InventoryRecord, NewInventoryRecord, RecordUpdate, StockPolicy},
  store::{LedgerStore, check_commit},
  transaction::{NewStockTransaction, StockTransaction, TimeRange},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    RECORD_COLUMNS, RawRecord, RawTransaction, TRANSACTION_COLUMNS, encode_bound,
    encode_decimal, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A stock ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted and every
/// call is serialised onto its thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_owned();
    debug!(path = %path.display(), "opening sqlite ledger");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread. `f` reports ledger and decode failures
  /// through the crate error; only transport failures surface from `call`.
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  async fn query_records(
    &self,
    filter: &'static str,
    params: Vec<Value>,
  ) -> Result<Vec<InventoryRecord>> {
    self
      .with_conn(move |conn| {
        let sql = format!(
          "SELECT {RECORD_COLUMNS} FROM inventory_records {filter}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(
            rusqlite::params_from_iter(params),
            RawRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
      })
      .await
  }
}

/// Microsecond-truncated so the value handed back equals the stored value.
fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Connection-thread helpers ───────────────────────────────────────────────

fn select_record(
  conn: &rusqlite::Connection,
  inventory_id: Uuid,
) -> Result<Option<InventoryRecord>> {
  let sql =
    format!("SELECT {RECORD_COLUMNS} FROM inventory_records WHERE inventory_id = ?1");
  conn
    .query_row(&sql, rusqlite::params![encode_uuid(inventory_id)], RawRecord::from_row)
    .optional()?
    .map(RawRecord::into_record)
    .transpose()
}

/// Resolve the outcome of a version-guarded `UPDATE` that touched `changed`
/// rows into the updated record, a conflict, or not-found.
fn finish_guarded(
  conn: &rusqlite::Connection,
  inventory_id: Uuid,
  expected_version: i64,
  changed: usize,
) -> Result<InventoryRecord> {
  match select_record(conn, inventory_id)? {
    None => Err(LedgerError::RecordNotFound(inventory_id).into()),
    Some(_) if changed == 0 => {
      debug!(%inventory_id, expected_version, "version conflict");
      Err(LedgerError::Conflict { inventory_id, expected: expected_version }.into())
    }
    Some(record) => Ok(record),
  }
}

/// One leg of a commit, paired with the id its transaction will carry and
/// the id of its linked leg, if any.
struct Leg {
  update:         RecordUpdate,
  input:          NewStockTransaction,
  transaction_id: Uuid,
  linked_id:      Option<Uuid>,
}

/// Apply every leg inside one SQLite transaction, in ascending record order.
/// Any failure drops the transaction and rolls back what was staged. `at` is
/// taken on the connection thread, so `created_at` never decreases along
/// `sequence`.
fn apply_legs(
  conn: &mut rusqlite::Connection,
  mut legs: Vec<Leg>,
  at: DateTime<Utc>,
) -> Result<Vec<StockTransaction>> {
  legs.sort_by_key(|leg| leg.update.inventory_id);
  let tx = conn.transaction()?;
  let mut committed = Vec::with_capacity(legs.len());

  for leg in legs {
    let inventory_id = leg.update.inventory_id;
    let expected = leg.update.expected_version;
    let current = select_record(&tx, inventory_id)?
      .ok_or(LedgerError::RecordNotFound(inventory_id))?;
    if current.version != expected {
      debug!(%inventory_id, expected, actual = current.version, "version conflict");
      return Err(LedgerError::Conflict { inventory_id, expected }.into());
    }
    check_commit(&current, &leg.update, &leg.input)?;

    let changed = tx.execute(
      "UPDATE inventory_records
          SET quantity = ?1, version = version + 1, last_modified = ?2
        WHERE inventory_id = ?3 AND version = ?4",
      rusqlite::params![leg.update.quantity, encode_dt(at), encode_uuid(inventory_id), expected],
    )?;
    if changed == 0 {
      return Err(LedgerError::Conflict { inventory_id, expected }.into());
    }

    tx.execute(
      "INSERT INTO stock_transactions (
         transaction_id, inventory_id, kind, quantity_delta, resulting_quantity,
         unit_cost_at_transaction, reference, notes, linked_transaction_id,
         created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      rusqlite::params![
        encode_uuid(leg.transaction_id),
        encode_uuid(inventory_id),
        leg.input.kind.as_ref(),
        leg.input.quantity_delta,
        leg.update.quantity,
        encode_decimal(current.unit_cost),
        leg.input.memo.reference,
        leg.input.memo.notes,
        leg.linked_id.map(encode_uuid),
        encode_dt(at),
      ],
    )?;

    committed.push(StockTransaction {
      transaction_id: leg.transaction_id,
      sequence: tx.last_insert_rowid(),
      inventory_id,
      kind: leg.input.kind,
      quantity_delta: leg.input.quantity_delta,
      resulting_quantity: leg.update.quantity,
      unit_cost_at_transaction: current.unit_cost,
      reference: leg.input.memo.reference,
      notes: leg.input.memo.notes,
      linked_transaction_id: leg.linked_id,
      created_at: at,
    });
  }

  tx.commit()?;
  Ok(committed)
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = crate::Error;

  // ── Provisioning ──────────────────────────────────────────────────────

  async fn create_record(&self, input: NewInventoryRecord) -> Result<InventoryRecord> {
    input.validate()?;
    let record = input.into_record(now());
    let inserted = record.clone();

    self
      .with_conn(move |conn| {
        let duplicate = conn
          .query_row(
            "SELECT 1 FROM inventory_records WHERE product_id = ?1 AND location = ?2",
            rusqlite::params![encode_uuid(record.product_id), record.location],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if duplicate {
          return Err(
            LedgerError::invalid_argument(format!(
              "product {} is already stocked at {:?}",
              record.product_id, record.location
            ))
            .into(),
          );
        }

        conn.execute(
          "INSERT INTO inventory_records (
             inventory_id, product_id, location, quantity,
             minimum_level, maximum_level, reorder_point, reorder_quantity,
             unit_cost, version, created_at, last_modified, active
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          rusqlite::params![
            encode_uuid(record.inventory_id),
            encode_uuid(record.product_id),
            record.location,
            record.quantity,
            record.minimum_level,
            record.maximum_level,
            record.reorder_point,
            record.reorder_quantity,
            encode_decimal(record.unit_cost),
            record.version,
            encode_dt(record.created_at),
            encode_dt(record.last_modified),
            record.active,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(inserted)
  }

  async fn update_policy(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    policy: StockPolicy,
  ) -> Result<InventoryRecord> {
    policy.validate()?;
    let at = now();

    self
      .with_conn(move |conn| {
        let changed = conn.execute(
          "UPDATE inventory_records
              SET minimum_level = ?1, maximum_level = ?2, reorder_point = ?3,
                  reorder_quantity = ?4, unit_cost = ?5,
                  version = version + 1, last_modified = ?6
            WHERE inventory_id = ?7 AND version = ?8",
          rusqlite::params![
            policy.minimum_level,
            policy.maximum_level,
            policy.reorder_point,
            policy.reorder_quantity,
            encode_decimal(policy.unit_cost),
            encode_dt(at),
            encode_uuid(inventory_id),
            expected_version,
          ],
        )?;
        finish_guarded(conn, inventory_id, expected_version, changed)
      })
      .await
  }

  async fn set_active(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    active: bool,
  ) -> Result<InventoryRecord> {
    let at = now();

    self
      .with_conn(move |conn| {
        let changed = conn.execute(
          "UPDATE inventory_records
              SET active = ?1, version = version + 1, last_modified = ?2
            WHERE inventory_id = ?3 AND version = ?4",
          rusqlite::params![active, encode_dt(at), encode_uuid(inventory_id), expected_version],
        )?;
        finish_guarded(conn, inventory_id, expected_version, changed)
      })
      .await
  }

  // ── Record reads ──────────────────────────────────────────────────────

  async fn get(&self, inventory_id: Uuid) -> Result<Option<InventoryRecord>> {
    self.with_conn(move |conn| select_record(conn, inventory_id)).await
  }

  async fn get_by_product(&self, product_id: Uuid) -> Result<Option<InventoryRecord>> {
    let mut records = self
      .query_records(
        "WHERE product_id = ?1
         ORDER BY active DESC, created_at, inventory_id
         LIMIT 1",
        vec![Value::from(encode_uuid(product_id))],
      )
      .await?;
    Ok(records.pop())
  }

  async fn list_by_product(&self, product_id: Uuid) -> Result<Vec<InventoryRecord>> {
    self
      .query_records(
        "WHERE product_id = ?1 ORDER BY created_at, inventory_id",
        vec![Value::from(encode_uuid(product_id))],
      )
      .await
  }

  async fn list_records(&self, include_inactive: bool) -> Result<Vec<InventoryRecord>> {
    self
      .query_records(
        "WHERE ?1 OR active = 1 ORDER BY created_at, inventory_id",
        vec![Value::from(include_inactive)],
      )
      .await
  }

  async fn list_low_stock(&self) -> Result<Vec<InventoryRecord>> {
    self
      .query_records(
        "WHERE active = 1 AND quantity <= reorder_point
         ORDER BY created_at, inventory_id",
        Vec::new(),
      )
      .await
  }

  // ── Ledger writes ─────────────────────────────────────────────────────

  async fn commit(
    &self,
    update: RecordUpdate,
    transaction: NewStockTransaction,
  ) -> Result<StockTransaction> {
    let legs = vec![Leg {
      update,
      input: transaction,
      transaction_id: Uuid::new_v4(),
      linked_id: None,
    }];
    let mut committed = self.with_conn(move |conn| apply_legs(conn, legs, now())).await?;
    committed
      .pop()
      .ok_or_else(|| LedgerError::store_unavailable("commit produced no transaction").into())
  }

  async fn commit_pair(
    &self,
    update_a: RecordUpdate,
    transaction_a: NewStockTransaction,
    update_b: RecordUpdate,
    transaction_b: NewStockTransaction,
  ) -> Result<(StockTransaction, StockTransaction)> {
    if update_a.inventory_id == update_b.inventory_id {
      return Err(
        LedgerError::invalid_argument("both legs of a pair target the same record").into(),
      );
    }

    let (id_a, id_b) = (Uuid::new_v4(), Uuid::new_v4());
    let legs = vec![
      Leg {
        update:         update_a,
        input:          transaction_a,
        transaction_id: id_a,
        linked_id:      Some(id_b),
      },
      Leg {
        update:         update_b,
        input:          transaction_b,
        transaction_id: id_b,
        linked_id:      Some(id_a),
      },
    ];
    let committed = self.with_conn(move |conn| apply_legs(conn, legs, now())).await?;
    let mut a = None;
    let mut b = None;
    for txn in committed {
      if txn.transaction_id == id_a {
        a = Some(txn);
      } else {
        b = Some(txn);
      }
    }
    match (a, b) {
      (Some(a), Some(b)) => Ok((a, b)),
      _ => Err(LedgerError::store_unavailable("pair commit lost a leg").into()),
    }
  }

  // ── Ledger reads ──────────────────────────────────────────────────────

  async fn history_page(
    &self,
    inventory_id: Uuid,
    range: TimeRange,
    after: Option<i64>,
    limit: usize,
  ) -> Result<Vec<StockTransaction>> {
    let id_str = encode_uuid(inventory_id);
    let after = after.unwrap_or(0);
    let start = encode_bound(range.start);
    let end = encode_bound(range.end);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    self
      .with_conn(move |conn| {
        let sql = format!(
          "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions
            WHERE inventory_id = ?1 AND sequence > ?2
              AND created_at >= ?3 AND created_at < ?4
            ORDER BY sequence
            LIMIT ?5"
        );
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(
            rusqlite::params![id_str, after, start, end, limit],
            RawTransaction::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawTransaction::into_transaction).collect()
      })
      .await
  }

  async fn quantity_at(&self, inventory_id: Uuid, at: DateTime<Utc>) -> Result<i64> {
    let id_str = encode_uuid(inventory_id);
    let at_str = encode_bound(at);

    self
      .with_conn(move |conn| {
        let quantity: Option<i64> = conn
          .query_row(
            "SELECT resulting_quantity FROM stock_transactions
              WHERE inventory_id = ?1 AND created_at <= ?2
              ORDER BY sequence DESC
              LIMIT 1",
            rusqlite::params![id_str, at_str],
            |r| r.get(0),
          )
          .optional()?;
        Ok(quantity.unwrap_or(0))
      })
      .await
  }
}
