//! Reasoning cache: per-token memory of upstream `reasoning_content`, keyed
//! by the tool-call id it accompanied, replayed into later assistant turns
//! that carry the same tool call back upstream.

use std::collections::HashMap;
use std::sync::Mutex;

const LAST_KEY: &str = "__last__";
const MAX_ENTRIES: usize = 1024;
const EVICT_COUNT: usize = 256;

struct TokenCache {
    /// Insertion order, oldest first, for bounded eviction. `__last__` is
    /// never pushed here since it's overwritten in place, not counted.
    order: Vec<String>,
    entries: HashMap<String, String>,
}

impl TokenCache {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, id: String, reasoning: String) {
        if id != LAST_KEY && !self.entries.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.entries.insert(id, reasoning);

        if self.order.len() > MAX_ENTRIES {
            let evict: Vec<String> = self.order.drain(0..EVICT_COUNT).collect();
            for key in evict {
                self.entries.remove(&key);
            }
        }
    }
}

/// Bounded, per-token cache of reasoning text keyed by tool-call id.
#[derive(Default)]
pub struct ReasoningCache {
    tokens: Mutex<HashMap<String, TokenCache>>,
}

impl ReasoningCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `reasoning` to every id in `tool_call_ids` and to `__last__`.
    pub fn remember(&self, token: &str, reasoning: &str, tool_call_ids: &[String]) {
        if reasoning.is_empty() {
            return;
        }
        let mut tokens = self.tokens.lock().unwrap();
        let cache = tokens
            .entry(token.to_string())
            .or_insert_with(TokenCache::new);
        for id in tool_call_ids {
            cache.insert(id.clone(), reasoning.to_string());
        }
        cache.insert(LAST_KEY.to_string(), reasoning.to_string());
    }

    /// Look up reasoning for a tool-call id, falling back to `__last__`.
    pub fn lookup(&self, token: &str, tool_call_id: &str) -> Option<String> {
        let tokens = self.tokens.lock().unwrap();
        let cache = tokens.get(token)?;
        cache
            .entries
            .get(tool_call_id)
            .or_else(|| cache.entries.get(LAST_KEY))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_and_looks_up_by_tool_call_id() {
        let cache = ReasoningCache::new();
        cache.remember("tok1", "because X", &["c1".to_string()]);
        assert_eq!(cache.lookup("tok1", "c1").as_deref(), Some("because X"));
    }

    #[test]
    fn falls_back_to_last_when_id_unknown() {
        let cache = ReasoningCache::new();
        cache.remember("tok1", "because X", &["c1".to_string()]);
        assert_eq!(cache.lookup("tok1", "unknown").as_deref(), Some("because X"));
    }

    #[test]
    fn empty_reasoning_is_not_remembered() {
        let cache = ReasoningCache::new();
        cache.remember("tok1", "", &["c1".to_string()]);
        assert_eq!(cache.lookup("tok1", "c1"), None);
    }

    #[test]
    fn unknown_token_returns_none() {
        let cache = ReasoningCache::new();
        assert_eq!(cache.lookup("nope", "c1"), None);
    }

    #[test]
    fn eviction_bounds_growth() {
        let cache = ReasoningCache::new();
        for i in 0..1100 {
            cache.remember("tok1", "r", &[format!("c{i}")]);
        }
        let tokens = cache.tokens.lock().unwrap();
        let inner = tokens.get("tok1").unwrap();
        assert!(inner.order.len() <= MAX_ENTRIES);
    }
}
