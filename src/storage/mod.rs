//! Trajectory store: append-only per-session on-disk log.
//!
//! Layout: `<logDir>/<sanitizedToken>/{events,query,answer}/*.json`. Every
//! write goes through a single mutex-guarded struct rather than an mpsc
//! consumer loop, since writes happen concurrently from many request-handling
//! tasks rather than flowing through one producer. Flushes immediately so
//! logs are visible even if the process crashes.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Keep only ASCII alphanumerics, `-`, `_`; truncate to 64 chars; empty maps
/// to the literal `anonymous`.
pub fn sanitize_token(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

fn sanitize_event_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "event".to_string()
    } else {
        cleaned
    }
}

struct Inner {
    log_dir: PathBuf,
    /// Per-(token, base-second) collision counters for `writeQuery` stems.
    stem_counters: HashMap<(String, i64), u32>,
}

/// Append-only per-session trajectory log.
pub struct TrajectoryStore {
    inner: Mutex<Inner>,
}

impl TrajectoryStore {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            inner: Mutex::new(Inner {
                log_dir,
                stem_counters: HashMap::new(),
            }),
        }
    }

    /// Idempotent directory creation for a session's three subdirectories.
    fn session_dir(log_dir: &Path, token: &str) -> Result<PathBuf> {
        let sanitized = sanitize_token(token);
        let dir = log_dir.join(sanitized);
        for sub in ["events", "query", "answer"] {
            std::fs::create_dir_all(dir.join(sub))
                .with_context(|| format!("creating {}/{}", dir.display(), sub))?;
        }
        Ok(dir)
    }

    /// Public accessor for a session's on-disk directory, creating it if absent.
    pub fn session_dir_for(&self, token: &str) -> Result<PathBuf> {
        let inner = self.inner.lock().unwrap();
        Self::session_dir(&inner.log_dir, token)
    }

    /// Write one event file with keys `timestamp`, `event_type`, `payload`.
    pub fn append(
        &self,
        token: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<PathBuf> {
        let inner = self.inner.lock().unwrap();
        let dir = Self::session_dir(&inner.log_dir, token)?;
        drop(inner);

        let now = Utc::now();
        let file_name = format!(
            "{}-{}.json",
            now.format("%Y%m%dT%H%M%S%6f"),
            sanitize_event_name(event_type)
        );
        let path = dir.join("events").join(file_name);

        let body = json!({
            "timestamp": now.to_rfc3339(),
            "event_type": event_type,
            "payload": payload,
        });
        write_json_file(&path, &body)?;
        Ok(path)
    }

    /// Allocate a collision-free second-resolution stem and write the query file.
    pub fn write_query(&self, token: &str, payload: serde_json::Value) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let dir = Self::session_dir(&inner.log_dir, token)?;

        let now = Utc::now();
        let base_second = now.timestamp();
        let counter_key = (token.to_string(), base_second);
        let suffix = inner.stem_counters.entry(counter_key).or_insert(0);
        let stem = if *suffix == 0 {
            now.format("%Y%m%dT%H%M%S").to_string()
        } else {
            format!("{}-{:03}", now.format("%Y%m%dT%H%M%S"), *suffix)
        };
        *suffix += 1;
        drop(inner);

        let body = json!({
            "timestamp": now.to_rfc3339(),
            "captured_at": now.to_rfc3339(),
            "payload": payload,
        });
        let path = dir.join("query").join(format!("{stem}.json"));
        write_json_file(&path, &body)?;
        Ok(stem)
    }

    /// Write the answer file under the stem allocated by `write_query`.
    pub fn write_answer(&self, token: &str, stem: &str, payload: serde_json::Value) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let dir = Self::session_dir(&inner.log_dir, token)?;
        drop(inner);

        let body = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "payload": payload,
        });
        let path = dir.join("answer").join(format!("{stem}.json"));
        write_json_file(&path, &body)
    }
}

fn write_json_file(path: &Path, body: &serde_json::Value) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    serde_json::to_writer_pretty(&mut file, body)
        .with_context(|| format!("writing {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_token_to_safe_charset() {
        assert_eq!(sanitize_token("abc/../123"), "abc123");
        assert_eq!(sanitize_token(""), "anonymous");
        assert_eq!(sanitize_token(&"x".repeat(100)).len(), 64);
    }

    #[test]
    fn append_creates_event_file_under_session_dir() {
        let dir = std::env::temp_dir().join(format!("llm-relay-test-{}", std::process::id()));
        let store = TrajectoryStore::new(dir.clone());
        let path = store
            .append("tok1", "session_registered", json!({"a": 1}))
            .unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("events"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn query_and_answer_share_stem() {
        let dir = std::env::temp_dir().join(format!("llm-relay-test-qa-{}", std::process::id()));
        let store = TrajectoryStore::new(dir.clone());
        let stem = store.write_query("tok1", json!({"model": "x"})).unwrap();
        store.write_answer("tok1", &stem, json!({"ok": true})).unwrap();
        let query_path = dir
            .join(sanitize_token("tok1"))
            .join("query")
            .join(format!("{stem}.json"));
        let answer_path = dir
            .join(sanitize_token("tok1"))
            .join("answer")
            .join(format!("{stem}.json"));
        assert!(query_path.exists());
        assert!(answer_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn repeated_queries_in_same_second_get_distinct_stems() {
        let dir = std::env::temp_dir().join(format!("llm-relay-test-dup-{}", std::process::id()));
        let store = TrajectoryStore::new(dir.clone());
        let stem1 = store.write_query("tok1", json!({})).unwrap();
        let stem2 = store.write_query("tok1", json!({})).unwrap();
        assert_ne!(stem1, stem2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
