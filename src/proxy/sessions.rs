//! Session registry: in-memory map of opaque client tokens to session metadata.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Metadata tracked for a registered session token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub token: String,
    pub sandbox_id: Option<String>,
    pub task_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionMeta {
    fn new(token: String, sandbox_id: Option<String>, task_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            token,
            sandbox_id,
            task_name,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Thread-safe registry of sessions keyed by token.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionMeta>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the session if absent, else update non-empty fields and bump `updated_at`.
    pub fn register(
        &self,
        token: &str,
        sandbox_id: Option<String>,
        task_name: Option<String>,
    ) -> SessionMeta {
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions
            .entry(token.to_string())
            .or_insert_with(|| SessionMeta::new(token.to_string(), None, None));

        if sandbox_id.is_some() {
            entry.sandbox_id = sandbox_id;
        }
        if task_name.is_some() {
            entry.task_name = task_name;
        }
        entry.updated_at = Utc::now();
        entry.clone()
    }

    /// Update `updated_at` only, creating the session implicitly if it's the
    /// first time this token has been seen.
    pub fn touch(&self, token: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions
            .entry(token.to_string())
            .or_insert_with(|| SessionMeta::new(token.to_string(), None, None));
        entry.updated_at = Utc::now();
    }

    /// Stable copy of all tracked sessions.
    pub fn snapshot(&self) -> Vec<SessionMeta> {
        let sessions = self.sessions.lock().unwrap();
        let mut out: Vec<SessionMeta> = sessions.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_then_updates_fields() {
        let registry = SessionRegistry::new();
        let first = registry.register("tok1", Some("sbx1".to_string()), None);
        assert_eq!(first.sandbox_id.as_deref(), Some("sbx1"));
        assert_eq!(first.task_name, None);

        let second = registry.register("tok1", None, Some("build".to_string()));
        assert_eq!(second.sandbox_id.as_deref(), Some("sbx1"));
        assert_eq!(second.task_name.as_deref(), Some("build"));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn touch_creates_implicit_session() {
        let registry = SessionRegistry::new();
        registry.touch("tok-implicit");
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].token, "tok-implicit");
    }

    #[test]
    fn snapshot_is_stable_copy() {
        let registry = SessionRegistry::new();
        registry.register("a", None, None);
        registry.register("b", None, None);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
