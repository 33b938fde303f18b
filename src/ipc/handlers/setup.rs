use crate::auth;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Clone, Copy)]
pub enum SetupSection {
    School,
    Security,
    Exports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "security" => Some(Self::Security),
            "exports" => Some(Self::Exports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::School => "setup.school",
            Self::Security => auth::SECURITY_KEY,
            Self::Exports => "setup.exports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::School => json!({
            "name": "",
            "address": "",
            "phone": "",
            "currencySymbol": "\u{20A6}",
            "defaultPaymentMethod": "Cash",
            "receiptFooter": "Thank you for your payment."
        }),
        SetupSection::Security => json!({
            "passwordEnabled": false,
            "allowedEmails": [],
            "passwordSalt": null,
            "passwordHash": null,
            "confirmDeletes": true
        }),
        SetupSection::Exports => json!({
            "defaultFormat": "pdf",
            "marginMm": 10,
            "jpegQuality": 95
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_email_list(v: &Value, key: &str) -> Result<Value, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if arr.len() > 20 {
        return Err(format!("{} must have at most 20 entries", key));
    }
    let mut out = Vec::new();
    for e in arr {
        let email = auth::normalize_email(&parse_string_max(e, key, 200)?);
        if !email.contains('@') {
            return Err(format!("{} entries must be email addresses", key));
        }
        if !out.contains(&email) {
            out.push(email);
        }
    }
    Ok(json!(out))
}

/// `trusted` is set when replaying stored values, which may carry the
/// password salt and hash that a client patch must never set directly.
/// `current` is left untouched unless the whole patch applies.
fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
    trusted: bool,
) -> Result<(), String> {
    let mut next = current.clone();
    let obj = next
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::School => match k.as_str() {
                "name" | "address" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 160)?));
                }
                "phone" | "defaultPaymentMethod" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 40)?));
                }
                "currencySymbol" => {
                    let s = parse_string_max(v, k, 4)?;
                    if s.is_empty() {
                        return Err("currencySymbol must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "receiptFooter" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 240)?));
                }
                _ => return Err(format!("unknown school field: {}", k)),
            },
            SetupSection::Security => match k.as_str() {
                "passwordEnabled" | "confirmDeletes" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "allowedEmails" => {
                    obj.insert(k.clone(), parse_email_list(v, k)?);
                }
                "password" if !trusted => {
                    if v.is_null() {
                        obj.insert("passwordSalt".into(), Value::Null);
                        obj.insert("passwordHash".into(), Value::Null);
                        continue;
                    }
                    let pw = v
                        .as_str()
                        .map(str::trim)
                        .ok_or_else(|| "password must be string or null".to_string())?;
                    if pw.chars().count() < 6 {
                        return Err("password must be at least 6 characters".into());
                    }
                    let salt = Uuid::new_v4().to_string();
                    let hash = auth::hash_password(&salt, pw);
                    obj.insert("passwordSalt".into(), Value::String(salt));
                    obj.insert("passwordHash".into(), Value::String(hash));
                }
                "passwordSalt" | "passwordHash" if trusted => {
                    obj.insert(k.clone(), v.clone());
                }
                _ => return Err(format!("unknown security field: {}", k)),
            },
            SetupSection::Exports => match k.as_str() {
                "defaultFormat" => {
                    let f = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    if f != "pdf" && f != "jpeg" {
                        return Err("defaultFormat must be one of: pdf, jpeg".into());
                    }
                    obj.insert(k.clone(), Value::String(f));
                }
                "marginMm" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 40)?));
                }
                "jpegQuality" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 50, 100)?));
                }
                _ => return Err(format!("unknown exports field: {}", k)),
            },
        }
    }

    if let SetupSection::Security = section {
        let enabled = obj
            .get("passwordEnabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let has_hash = obj.get("passwordHash").map(|v| !v.is_null()).unwrap_or(false);
        let has_emails = obj
            .get("allowedEmails")
            .and_then(|v| v.as_array())
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if enabled && !trusted && !(has_hash && has_emails) {
            return Err("set a password and at least one allowed email before enabling login".into());
        }
    }
    *current = next;
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // A malformed stored field falls back to its default; the rest still load.
            for (k, v) in saved_obj {
                let mut field = Map::new();
                field.insert(k.clone(), v.clone());
                if let Err(e) = merge_section_patch(section, &mut current, &field, true) {
                    tracing::warn!(key = section.key(), field = %k, error = %e, "ignoring stored setup value");
                }
            }
        }
    }
    Ok(current)
}

fn redact_security(mut v: Value) -> Value {
    let password_set = v.get("passwordHash").map(|h| !h.is_null()).unwrap_or(false);
    if let Some(obj) = v.as_object_mut() {
        obj.remove("passwordSalt");
        obj.remove("passwordHash");
        obj.insert("passwordSet".into(), Value::Bool(password_set));
    }
    v
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school = match load_section(conn, SetupSection::School) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let security = match load_section(conn, SetupSection::Security) {
        Ok(v) => redact_security(v),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let exports = match load_section(conn, SetupSection::Exports) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "school": school,
            "security": security,
            "exports": exports
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj, false) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(key = section.key(), "setup section updated");

    let result = match section {
        SetupSection::Security => redact_security(current),
        _ => current,
    };
    ok(&req.id, json!({ "ok": true, "section": section_raw, "values": result }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
