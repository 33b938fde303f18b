use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::receipts::StoreError;
use rusqlite::Connection;
use serde_json::json;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts either a JSON integer or a numeric string.
pub fn required_receipt_id(req: &Request) -> Result<i64, serde_json::Value> {
    let raw = req.params.get("receiptId");
    let id = match raw {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.ok_or_else(|| err(&req.id, "bad_params", "missing receiptId", None))
}

pub fn store_err(req: &Request, e: StoreError) -> serde_json::Value {
    let code = e.code();
    match e {
        StoreError::NotFound => err(&req.id, code, "receipt not found", None),
        other => {
            tracing::warn!(method = %req.method, error = %other, "store operation failed");
            err(&req.id, code, other.to_string(), None)
        }
    }
}

pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn validation_failed(
    req: &Request,
    errors: &std::collections::BTreeMap<String, String>,
) -> serde_json::Value {
    err(
        &req.id,
        "validation_failed",
        "receipt input is invalid",
        Some(json!({ "validationErrors": errors })),
    )
}
