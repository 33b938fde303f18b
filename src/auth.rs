use crate::db;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

pub const SECURITY_KEY: &str = "setup.security";

/// Methods reachable without a session even when the login gate is on.
const OPEN_METHODS: &[&str] = &[
    "health",
    "workspace.select",
    "auth.status",
    "auth.login",
    "auth.logout",
    "fees.catalog",
    "setup.get",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginGate {
    pub enabled: bool,
    pub allowed_emails: Vec<String>,
    pub salt: Option<String>,
    pub hash: Option<String>,
}

impl LoginGate {
    pub fn from_settings(v: &serde_json::Value) -> Self {
        let allowed_emails = v
            .get("allowedEmails")
            .and_then(|a| a.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|e| e.as_str())
                    .map(normalize_email)
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let text = |key: &str| {
            v.get(key)
                .and_then(|s| s.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        Self {
            enabled: v
                .get("passwordEnabled")
                .and_then(|b| b.as_bool())
                .unwrap_or(false),
            allowed_emails,
            salt: text("passwordSalt"),
            hash: text("passwordHash"),
        }
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(db::settings_get_json(conn, SECURITY_KEY)?
            .map(|v| Self::from_settings(&v))
            .unwrap_or_default())
    }

    /// A gate with no password stored cannot be passed, so it is treated as off.
    pub fn is_active(&self) -> bool {
        self.enabled && self.hash.is_some()
    }

    pub fn verify(&self, email: &str, password: &str) -> bool {
        let email = normalize_email(email);
        if !self.allowed_emails.iter().any(|e| *e == email) {
            return false;
        }
        match (&self.salt, &self.hash) {
            (Some(salt), Some(hash)) => hash_password(salt, password.trim()) == *hash,
            _ => false,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn is_open_method(method: &str) -> bool {
    OPEN_METHODS.contains(&method)
}
