use crate::fees;
use crate::model::{BalancePayment, FeeLine, Receipt, ReceiptDraft};
use rusqlite::{params, Connection, OptionalExtension, Row};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("receipt not found")]
    NotFound,
    #[error("{context}: {source}")]
    Db {
        code: &'static str,
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound => "not_found",
            StoreError::Db { code, .. } => *code,
        }
    }
}

trait DbContext<T> {
    fn db(self, code: &'static str, context: &'static str) -> Result<T, StoreError>;
}

impl<T> DbContext<T> for rusqlite::Result<T> {
    fn db(self, code: &'static str, context: &'static str) -> Result<T, StoreError> {
        self.map_err(|source| StoreError::Db {
            code,
            context,
            source,
        })
    }
}

const RECEIPT_COLUMNS: &str = "id, receipt_number, date, student_name, grade, term,
    admission_number, parent_name, payment_method, total_amount, balance_total,
    created_at, updated_at";

fn receipt_header(row: &Row<'_>) -> rusqlite::Result<Receipt> {
    Ok(Receipt {
        id: row.get(0)?,
        receipt_number: row.get(1)?,
        date: row.get(2)?,
        student_name: row.get(3)?,
        grade: row.get(4)?,
        term: row.get(5)?,
        admission_number: row.get(6)?,
        parent_name: row.get(7)?,
        payment_method: row.get(8)?,
        total_amount: row.get(9)?,
        balance_total: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        fee_items: Vec::new(),
        balance_payments: Vec::new(),
    })
}

fn load_lines(conn: &Connection, receipt: &mut Receipt) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT item_id, description, amount
             FROM receipt_fee_items
             WHERE receipt_id = ?
             ORDER BY sort_order",
        )
        .db("db_query_failed", "prepare fee items")?;
    receipt.fee_items = stmt
        .query_map([receipt.id], |r| {
            Ok(FeeLine {
                id: r.get(0)?,
                description: r.get(1)?,
                amount: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .db("db_query_failed", "load fee items")?;

    let mut stmt = conn
        .prepare_cached(
            "SELECT id, item_id, item_name, amount, description, date
             FROM receipt_balance_payments
             WHERE receipt_id = ?
             ORDER BY sort_order",
        )
        .db("db_query_failed", "prepare balance payments")?;
    receipt.balance_payments = stmt
        .query_map([receipt.id], |r| {
            Ok(BalancePayment {
                id: r.get(0)?,
                item_id: r.get(1)?,
                item_name: r.get(2)?,
                amount: r.get(3)?,
                description: r.get(4)?,
                date: r.get(5)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .db("db_query_failed", "load balance payments")?;
    Ok(())
}

fn load_many(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Receipt>, StoreError> {
    let mut stmt = conn.prepare(sql).db("db_query_failed", "prepare receipts")?;
    let mut receipts = stmt
        .query_map(args, receipt_header)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .db("db_query_failed", "load receipts")?;
    for r in receipts.iter_mut() {
        load_lines(conn, r)?;
    }
    Ok(receipts)
}

fn write_lines(
    tx: &rusqlite::Transaction<'_>,
    receipt_id: i64,
    draft: &ReceiptDraft,
) -> Result<(), StoreError> {
    for (i, line) in draft.fee_items.iter().enumerate() {
        tx.execute(
            "INSERT INTO receipt_fee_items(receipt_id, sort_order, item_id, description, amount)
             VALUES(?, ?, ?, ?, ?)",
            params![receipt_id, i as i64, line.id, line.description, line.amount],
        )
        .db("db_insert_failed", "insert fee item")?;
    }
    for (i, p) in draft.balance_payments.iter().enumerate() {
        tx.execute(
            "INSERT INTO receipt_balance_payments(
               id, receipt_id, sort_order, item_id, item_name, amount, description, date
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                p.id,
                receipt_id,
                i as i64,
                p.item_id,
                p.item_name,
                p.amount,
                p.description,
                p.date
            ],
        )
        .db("db_insert_failed", "insert balance payment")?;
    }
    Ok(())
}

fn delete_lines(tx: &rusqlite::Transaction<'_>, receipt_id: i64) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM receipt_balance_payments WHERE receipt_id = ?",
        [receipt_id],
    )
    .db("db_delete_failed", "delete balance payments")?;
    tx.execute(
        "DELETE FROM receipt_fee_items WHERE receipt_id = ?",
        [receipt_id],
    )
    .db("db_delete_failed", "delete fee items")?;
    Ok(())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn insert_receipt(
    conn: &Connection,
    receipt_number: &str,
    draft: &ReceiptDraft,
) -> Result<Receipt, StoreError> {
    let tx = conn
        .unchecked_transaction()
        .db("db_tx_failed", "begin insert")?;
    tx.execute(
        "INSERT INTO receipts(
           receipt_number, date, student_name, grade, term, admission_number,
           parent_name, payment_method, total_amount, balance_total, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            receipt_number,
            draft.date,
            draft.student_name,
            draft.grade,
            draft.term,
            draft.admission_number,
            draft.parent_name,
            draft.payment_method,
            fees::grand_total(&draft.fee_items),
            fees::balance_total(&draft.balance_payments),
            now_rfc3339()
        ],
    )
    .db("db_insert_failed", "insert receipt")?;
    let id = tx.last_insert_rowid();
    write_lines(&tx, id, draft)?;
    tx.commit().db("db_commit_failed", "commit insert")?;

    tracing::info!(receipt_id = id, receipt_number, "receipt saved");
    get_receipt(conn, id)
}

/// Replaces every editable field and all lines. The receipt number and
/// creation time are kept.
pub fn update_receipt(
    conn: &Connection,
    receipt_id: i64,
    draft: &ReceiptDraft,
) -> Result<Receipt, StoreError> {
    let tx = conn
        .unchecked_transaction()
        .db("db_tx_failed", "begin update")?;
    let changed = tx
        .execute(
            "UPDATE receipts SET
               date = ?, student_name = ?, grade = ?, term = ?, admission_number = ?,
               parent_name = ?, payment_method = ?, total_amount = ?, balance_total = ?,
               updated_at = ?
             WHERE id = ?",
            params![
                draft.date,
                draft.student_name,
                draft.grade,
                draft.term,
                draft.admission_number,
                draft.parent_name,
                draft.payment_method,
                fees::grand_total(&draft.fee_items),
                fees::balance_total(&draft.balance_payments),
                now_rfc3339(),
                receipt_id
            ],
        )
        .db("db_update_failed", "update receipt")?;
    if changed == 0 {
        let _ = tx.rollback();
        return Err(StoreError::NotFound);
    }
    delete_lines(&tx, receipt_id)?;
    write_lines(&tx, receipt_id, draft)?;
    tx.commit().db("db_commit_failed", "commit update")?;

    tracing::info!(receipt_id, "receipt updated");
    get_receipt(conn, receipt_id)
}

pub fn delete_receipt(conn: &Connection, receipt_id: i64) -> Result<(), StoreError> {
    let tx = conn
        .unchecked_transaction()
        .db("db_tx_failed", "begin delete")?;
    // No ON DELETE CASCADE; children go first.
    delete_lines(&tx, receipt_id)?;
    let removed = tx
        .execute("DELETE FROM receipts WHERE id = ?", [receipt_id])
        .db("db_delete_failed", "delete receipt")?;
    if removed == 0 {
        let _ = tx.rollback();
        return Err(StoreError::NotFound);
    }
    tx.commit().db("db_commit_failed", "commit delete")?;
    tracing::info!(receipt_id, "receipt deleted");
    Ok(())
}

pub fn get_receipt(conn: &Connection, receipt_id: i64) -> Result<Receipt, StoreError> {
    let sql = format!("SELECT {} FROM receipts WHERE id = ?", RECEIPT_COLUMNS);
    let mut receipt = conn
        .query_row(&sql, [receipt_id], receipt_header)
        .optional()
        .db("db_query_failed", "load receipt")?
        .ok_or(StoreError::NotFound)?;
    load_lines(conn, &mut receipt)?;
    Ok(receipt)
}

/// Newest first.
pub fn list_receipts(conn: &Connection) -> Result<Vec<Receipt>, StoreError> {
    let sql = format!(
        "SELECT {} FROM receipts ORDER BY created_at DESC, id DESC",
        RECEIPT_COLUMNS
    );
    load_many(conn, &sql, &[])
}

/// Case-insensitive substring match on the student name, newest first.
/// Folding happens here rather than in SQL, where `lower()` is ASCII-only.
pub fn search_receipts(conn: &Connection, query: &str) -> Result<Vec<Receipt>, StoreError> {
    let needle = query.trim().to_lowercase();
    let receipts = list_receipts(conn)?;
    Ok(receipts
        .into_iter()
        .filter(|r| r.student_name.to_lowercase().contains(needle.as_str()))
        .collect())
}

/// Receipts with no balance payments recorded against them.
pub fn paid_receipts(conn: &Connection, grade: Option<&str>) -> Result<Vec<Receipt>, StoreError> {
    let needle = grade
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty());
    let receipts = list_receipts(conn)?;
    Ok(receipts
        .into_iter()
        .filter(|r| r.balance_payments.is_empty())
        .filter(|r| match &needle {
            Some(n) => r.grade.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .collect())
}
