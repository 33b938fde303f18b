use super::handlers;
use super::types::{AppState, Request};
use crate::auth::{self, LoginGate};
use crate::ipc::error::err;

/// Rejects gated methods while the workspace requires a login and no session
/// is open.
fn check_gate(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    if auth::is_open_method(&req.method) || state.session.is_some() {
        return None;
    }
    let conn = state.db.as_ref()?;
    match LoginGate::load(conn) {
        Ok(gate) if gate.is_active() => Some(err(&req.id, "unauthorized", "login required", None)),
        Ok(_) => None,
        Err(e) => Some(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");

    if let Some(resp) = check_gate(state, &req) {
        tracing::debug!(method = %req.method, "blocked by login gate");
        return resp;
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::fees::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::receipts::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::balances::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
