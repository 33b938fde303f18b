use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;

const DB_FILE_NAME: &str = "feebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    tracing::info!(path = %db_path.display(), "workspace database opened");
    Ok(conn)
}

/// Opens an existing workspace database read-only, without migrating it.
/// Returns `None` when the workspace has no database yet.
pub fn open_existing_read_only(workspace: &Path) -> anyhow::Result<Option<Connection>> {
    let db_path = workspace.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Ok(None);
    }
    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    Ok(Some(conn))
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_number TEXT NOT NULL UNIQUE,
            date TEXT NOT NULL,
            student_name TEXT NOT NULL,
            grade TEXT NOT NULL,
            term TEXT NOT NULL,
            admission_number TEXT NOT NULL,
            parent_name TEXT NOT NULL,
            total_amount REAL NOT NULL DEFAULT 0,
            balance_total REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    // Older workspaces lack these columns; add them in place.
    ensure_receipts_payment_method(conn)?;
    ensure_receipts_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_admission ON receipts(admission_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_created ON receipts(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipt_fee_items(
            receipt_id INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            item_id TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            PRIMARY KEY(receipt_id, sort_order),
            FOREIGN KEY(receipt_id) REFERENCES receipts(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipt_balance_payments(
            id TEXT NOT NULL,
            receipt_id INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            item_id TEXT NOT NULL,
            item_name TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            PRIMARY KEY(receipt_id, sort_order),
            FOREIGN KEY(receipt_id) REFERENCES receipts(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_balance_payments_item ON receipt_balance_payments(receipt_id, item_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_receipts_payment_method(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "receipts", "payment_method")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE receipts ADD COLUMN payment_method TEXT NOT NULL DEFAULT 'Cash'",
        [],
    )?;
    Ok(())
}

fn ensure_receipts_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "receipts", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE receipts ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => {
            let value = serde_json::from_str(&text)
                .with_context(|| format!("setting {} is not valid JSON", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, &text),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
