use crate::auth::{self, LoginGate};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const INVALID_LOGIN: &str = "Invalid email or password.";

fn load_gate(state: &AppState, req: &Request) -> Result<LoginGate, serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(LoginGate::default());
    };
    LoginGate::load(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_auth_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let gate = match load_gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "gateEnabled": gate.is_active(),
            "authenticated": !gate.is_active() || state.session.is_some(),
            "email": state.session,
        }),
    )
}

fn handle_auth_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = req
        .params
        .get("email")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("");
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("");
    if email.is_empty() || password.is_empty() {
        return err(&req.id, "bad_params", "Email and password are required.", None);
    }
    if state.db.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }

    let gate = match load_gate(state, req) {
        Ok(g) => g,
        Err(e) => return e,
    };
    if !gate.is_active() {
        return err(
            &req.id,
            "bad_params",
            "login is not enabled for this workspace",
            None,
        );
    }
    if !gate.verify(email, password) {
        tracing::warn!("rejected login attempt");
        return err(&req.id, "unauthorized", INVALID_LOGIN, None);
    }

    let normalized = auth::normalize_email(email);
    tracing::info!(email = %normalized, "operator logged in");
    state.session = Some(normalized.clone());
    ok(&req.id, json!({ "authenticated": true, "email": normalized }))
}

fn handle_auth_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was = state.session.take();
    ok(&req.id, json!({ "ok": true, "wasAuthenticated": was.is_some() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.status" => Some(handle_auth_status(state, req)),
        "auth.login" => Some(handle_auth_login(state, req)),
        "auth.logout" => Some(handle_auth_logout(state, req)),
        _ => None,
    }
}
