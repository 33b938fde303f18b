use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str, store_err};
use crate::ipc::types::{AppState, Request};
use crate::outstanding::{self, OutstandingReport};
use crate::receipts;
use serde_json::json;
use std::path::PathBuf;

fn filtered_report(state: &AppState, req: &Request) -> Result<OutstandingReport, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let all = receipts::list_receipts(conn).map_err(|e| store_err(req, e))?;
    let report = outstanding::compute_outstanding(&all);
    let grade = optional_str(req, "grade");
    let search = optional_str(req, "search").unwrap_or_default();
    Ok(outstanding::filter_report(&report, grade.as_deref(), &search))
}

fn handle_balances_outstanding(state: &mut AppState, req: &Request) -> serde_json::Value {
    match filtered_report(state, req) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => e,
    }
}

fn handle_balances_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let report = match filtered_report(state, req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let (csv, rows) = outstanding::outstanding_csv(&report);

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return err(&req.id, "io_failed", e.to_string(), None);
            }
        }
    }
    if let Err(e) = std::fs::write(&out_path, csv) {
        return err(
            &req.id,
            "io_failed",
            format!("failed to write {}: {}", out_path.to_string_lossy(), e),
            None,
        );
    }
    tracing::info!(out = %out_path.display(), rows, "outstanding balances exported");

    ok(
        &req.id,
        json!({
            "path": out_path.to_string_lossy(),
            "rowsExported": rows
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "balances.outstanding" => Some(handle_balances_outstanding(state, req)),
        "balances.exportCsv" => Some(handle_balances_export_csv(state, req)),
        _ => None,
    }
}
