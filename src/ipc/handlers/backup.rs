use crate::auth::LoginGate;
use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::select_workspace;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn same_workspace(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// The router only gates the open workspace, and a session only covers that
/// workspace. Any other target must not have a login gate of its own.
fn check_target_gate(state: &AppState, req: &Request, target: &Path) -> Result<(), serde_json::Value> {
    let is_open = state
        .workspace
        .as_deref()
        .map(|open| same_workspace(open, target))
        .unwrap_or(false);
    if is_open && state.db.is_some() {
        return Ok(());
    }
    let conn = match db::open_existing_read_only(target) {
        Ok(Some(conn)) => conn,
        Ok(None) => return Ok(()),
        Err(e) => return Err(err(&req.id, "db_open_failed", e.to_string(), None)),
    };
    match LoginGate::load(&conn) {
        Ok(gate) if gate.is_active() => {
            tracing::warn!(
                method = %req.method,
                path = %target.display(),
                "refused backup of a login-gated workspace"
            );
            Err(err(
                &req.id,
                "unauthorized",
                "workspace requires login; select it and log in first",
                Some(json!({ "workspacePath": target.to_string_lossy() })),
            ))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = match workspace_param(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    if let Err(e) = check_target_gate(state, req, &workspace_path) {
        return e;
    }

    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::debug!(error = %e, "wal checkpoint before export failed");
        }
    }

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "workspace export failed");
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    };

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = match workspace_param(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    if let Err(e) = check_target_gate(state, req, &workspace_path) {
        return e;
    }

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    let previous = state.workspace.clone();
    state.db = None;
    state.session = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "workspace import failed");
            if let Some(prev) = previous {
                if let Err(reopen) = select_workspace(state, prev) {
                    tracing::warn!(error = %reopen, "could not reopen previous workspace");
                }
            }
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };

    match select_workspace(state, workspace_path.clone()) {
        Ok(()) => ok(
            &req.id,
            json!({
                "ok": true,
                "workspacePath": workspace_path.to_string_lossy(),
                "bundleFormatDetected": import.bundle_format_detected
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
