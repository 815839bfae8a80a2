//! SQL schema for the stock ledger SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS inventory_records (
    inventory_id     TEXT PRIMARY KEY,
    product_id       TEXT NOT NULL,
    location         TEXT NOT NULL,
    quantity         INTEGER NOT NULL CHECK (quantity >= 0),
    minimum_level    INTEGER,
    maximum_level    INTEGER,
    reorder_point    INTEGER NOT NULL DEFAULT 0,
    reorder_quantity INTEGER NOT NULL DEFAULT 0,
    unit_cost        TEXT NOT NULL DEFAULT '0',   -- decimal as text
    version          INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,               -- RFC 3339 UTC, microseconds
    last_modified    TEXT NOT NULL,
    active           INTEGER NOT NULL DEFAULT 1,
    UNIQUE (product_id, location)
);

-- Transactions are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS stock_transactions (
    sequence                 INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id           TEXT NOT NULL UNIQUE,
    inventory_id             TEXT NOT NULL REFERENCES inventory_records(inventory_id),
    kind                     TEXT NOT NULL,   -- snake_case TransactionKind
    quantity_delta           INTEGER NOT NULL,
    resulting_quantity       INTEGER NOT NULL CHECK (resulting_quantity >= 0),
    unit_cost_at_transaction TEXT NOT NULL,
    reference                TEXT,
    notes                    TEXT,
    linked_transaction_id    TEXT,
    created_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS records_product_idx      ON inventory_records(product_id);
CREATE INDEX IF NOT EXISTS transactions_record_idx  ON stock_transactions(inventory_id, sequence);
CREATE INDEX IF NOT EXISTS transactions_created_idx ON stock_transactions(inventory_id, created_at);

PRAGMA user_version = 1;
";
