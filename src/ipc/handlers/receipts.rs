use crate::fees;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::{load_section, SetupSection};
use crate::ipc::helpers::{
    db_conn, optional_str, required_receipt_id, required_str, store_err, today, validation_failed,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ReceiptDraft;
use crate::receipts::{self, StoreError};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeMap;

pub(super) fn default_payment_method(conn: Option<&Connection>) -> String {
    conn.and_then(|c| load_section(c, SetupSection::School).ok())
        .and_then(|v| {
            v.get("defaultPaymentMethod")
                .and_then(|m| m.as_str())
                .filter(|m| !m.trim().is_empty())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| fees::DEFAULT_PAYMENT_METHOD.to_string())
}

fn parse_draft(
    conn: Option<&Connection>,
    req: &Request,
) -> (ReceiptDraft, BTreeMap<String, String>) {
    let payment_method = default_payment_method(conn);
    fees::parse_receipt_input(&req.params, today(), &payment_method)
}

fn handle_receipts_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (draft, errors) = parse_draft(state.db.as_ref(), req);
    ok(
        &req.id,
        json!({
            "valid": errors.is_empty(),
            "validationErrors": errors,
            "feeItems": draft.fee_items,
            "balancePayments": draft.balance_payments,
            "grandTotal": fees::grand_total(&draft.fee_items),
            "balanceTotal": fees::balance_total(&draft.balance_payments),
        }),
    )
}

const RECEIPT_NUMBER_ATTEMPTS: usize = 3;

fn handle_receipts_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (draft, errors) = parse_draft(Some(conn), req);
    if !errors.is_empty() {
        return validation_failed(req, &errors);
    }

    let date = chrono::NaiveDate::parse_from_str(&draft.date, "%Y-%m-%d").unwrap_or_else(|_| today());
    let mut last_err = None;
    for _ in 0..RECEIPT_NUMBER_ATTEMPTS {
        let number = fees::generate_receipt_number(date);
        match receipts::insert_receipt(conn, &number, &draft) {
            Ok(receipt) => return ok(&req.id, json!({ "receipt": receipt })),
            Err(e @ StoreError::Db { .. }) if is_unique_violation(&e) => {
                tracing::debug!(receipt_number = %number, "receipt number collision, retrying");
                last_err = Some(e);
            }
            Err(e) => return store_err(req, e),
        }
    }
    match last_err {
        Some(e) => store_err(req, e),
        None => err(&req.id, "db_insert_failed", "could not allocate receipt number", None),
    }
}

fn is_unique_violation(e: &StoreError) -> bool {
    match e {
        StoreError::Db {
            source: rusqlite::Error::SqliteFailure(f, _),
            ..
        } => f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
        _ => false,
    }
}

fn handle_receipts_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let receipt_id = match required_receipt_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match receipts::get_receipt(conn, receipt_id) {
        Ok(receipt) => ok(&req.id, json!({ "receipt": receipt })),
        Err(e) => store_err(req, e),
    }
}

fn handle_receipts_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let receipt_id = match required_receipt_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (draft, errors) = parse_draft(Some(conn), req);
    if !errors.is_empty() {
        return validation_failed(req, &errors);
    }
    match receipts::update_receipt(conn, receipt_id, &draft) {
        Ok(receipt) => ok(&req.id, json!({ "receipt": receipt })),
        Err(e) => store_err(req, e),
    }
}

fn confirm_deletes(conn: &Connection) -> bool {
    load_section(conn, SetupSection::Security)
        .ok()
        .and_then(|v| v.get("confirmDeletes").and_then(|b| b.as_bool()))
        .unwrap_or(true)
}

fn handle_receipts_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let receipt_id = match required_receipt_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let confirmed = req
        .params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !confirmed && confirm_deletes(conn) {
        return err(
            &req.id,
            "confirm_required",
            "deleting a receipt must be confirmed",
            Some(json!({ "receiptId": receipt_id })),
        );
    }
    match receipts::delete_receipt(conn, receipt_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true, "receiptId": receipt_id })),
        Err(e) => store_err(req, e),
    }
}

fn handle_receipts_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match receipts::list_receipts(conn) {
        Ok(list) => ok(&req.id, json!({ "receipts": list })),
        Err(e) => store_err(req, e),
    }
}

fn handle_receipts_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let query = match required_str(req, "query") {
        Ok(v) => v,
        Err(_) => {
            return err(
                &req.id,
                "bad_params",
                "Please enter a student name to search",
                None,
            )
        }
    };
    match receipts::search_receipts(conn, &query) {
        Ok(list) => ok(&req.id, json!({ "query": query, "receipts": list })),
        Err(e) => store_err(req, e),
    }
}

fn handle_receipts_paid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let grade = optional_str(req, "grade");
    match receipts::paid_receipts(conn, grade.as_deref()) {
        Ok(list) => {
            let total: f64 = list.iter().map(|r| r.total_amount).sum();
            ok(
                &req.id,
                json!({
                    "count": list.len(),
                    "totalAmount": fees::round2(total),
                    "receipts": list,
                }),
            )
        }
        Err(e) => store_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "receipts.preview" => Some(handle_receipts_preview(state, req)),
        "receipts.create" => Some(handle_receipts_create(state, req)),
        "receipts.get" => Some(handle_receipts_get(state, req)),
        "receipts.update" => Some(handle_receipts_update(state, req)),
        "receipts.delete" => Some(handle_receipts_delete(state, req)),
        "receipts.list" => Some(handle_receipts_list(state, req)),
        "receipts.search" => Some(handle_receipts_search(state, req)),
        "receipts.paid" => Some(handle_receipts_paid(state, req)),
        _ => None,
    }
}
