//! Temporal Store: the trimming overlay's marker/recall side (SPEC_FULL
//! §4.3), plus the wildcard/hierarchical `get_matching` and `status`
//! introspection supplemental features (SPEC_FULL §10.5).
//!
//! Tool responses over a size cap are replaced in the transcript by a short
//! preview plus a `[temporal-memory_recall(<key>)]` marker; the full
//! content is kept here, addressable by the message id it came from. A
//! response answering a call to the temporal-memory provider itself is
//! exempt from trimming, mirroring `temporal_memory_V1.py`'s refuse-to-trim
//! rule for its own tool outputs.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Provider id used by the temporal-memory tool itself; calls answered by
/// this provider are exempt from trimming (SPEC_FULL §4.3).
pub const TEMPORAL_MEMORY_PROVIDER_ID: &str = "temporal-memory";

#[derive(Debug, Clone)]
struct KeyMeta {
    msg_id: String,
    description: String,
}

pub struct TemporalStore {
    /// Full content of trimmed tool responses, keyed by message id.
    full_content: Mutex<HashMap<String, String>>,
    /// User-declared `#key -> message id` bindings from `memorize`.
    keys: Mutex<HashMap<String, KeyMeta>>,
}

impl TemporalStore {
    pub fn new() -> Self {
        Self {
            full_content: Mutex::new(HashMap::new()),
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Trim `content` to `cap` characters if it exceeds it, stashing the
    /// full text under `message_id` and returning the replacement text.
    /// Returns `content` unchanged if it fits, or if `provider_id` is the
    /// temporal-memory provider itself.
    pub fn trim_tool_response(&self, message_id: &str, provider_id: &str, content: &str, cap: usize) -> String {
        if provider_id == TEMPORAL_MEMORY_PROVIDER_ID || content.len() <= cap {
            return content.to_string();
        }

        self.full_content
            .lock()
            .unwrap()
            .insert(message_id.to_string(), content.to_string());

        let preview: String = content.chars().take(cap).collect();
        format!("{preview}\n[temporal-memory_recall({message_id})]")
    }

    /// Fetch the full content stashed for a trimmed message, if any.
    pub fn full_content_for(&self, message_id: &str) -> Option<String> {
        self.full_content.lock().unwrap().get(message_id).cloned()
    }

    /// The `recall` tool's required contract (SPEC_FULL §4.3): resolve each
    /// key directly against the trimmed-message map, `None` if absent. Keys
    /// here are the message ids a `[temporal-memory_recall(<key>)]` marker
    /// names, not the `memorize`d short names `get_matching` resolves.
    pub fn get(&self, keys: &[String]) -> HashMap<String, Option<String>> {
        let full_content = self.full_content.lock().unwrap();
        keys.iter()
            .map(|k| (k.clone(), full_content.get(k).cloned()))
            .collect()
    }

    /// Bind a short key to a message id with a human-readable description,
    /// the `memorize` tool's effect.
    pub fn memorize(&self, key: impl Into<String>, msg_id: impl Into<String>, description: impl Into<String>) {
        let key = key.into();
        let msg_id = msg_id.into();
        let description = description.into();
        self.keys.lock().unwrap().insert(key, KeyMeta { msg_id, description });
    }

    /// Resolve `patterns` against memorized keys, supporting `*`/`?`
    /// wildcards for hierarchical keys like `projA:*` (SPEC_FULL §10.5).
    /// A pattern with no matches maps to `None`.
    pub fn get_matching(&self, patterns: &[String]) -> HashMap<String, Option<String>> {
        let keys = self.keys.lock().unwrap();
        let mut out = HashMap::new();

        for pattern in patterns {
            if let Some(meta) = keys.get(pattern) {
                out.insert(pattern.clone(), self.full_content_for(&meta.msg_id));
                continue;
            }

            let matches: Vec<&String> = keys.keys().filter(|k| glob_match(pattern, k)).collect();
            if matches.is_empty() {
                out.insert(pattern.clone(), None);
                continue;
            }
            for matched_key in matches {
                let meta = &keys[matched_key];
                out.insert(matched_key.clone(), self.full_content_for(&meta.msg_id));
            }
        }
        out
    }

    /// List memorized keys grouped by their `:`-delimited top-level scope.
    pub fn status(&self) -> HashMap<String, Vec<(String, String)>> {
        let keys = self.keys.lock().unwrap();
        let mut grouped: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (key, meta) in keys.iter() {
            let scope = key.split(':').next().unwrap_or(key).to_string();
            grouped.entry(scope).or_default().push((key.clone(), meta.description.clone()));
        }
        for entries in grouped.values_mut() {
            entries.sort();
        }
        grouped
    }
}

impl Default for TemporalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Exposes the Temporal Store to the model as the `recall` tool (SPEC_FULL
/// §1, §4.3): `temporal-memory.recall(keys: [string]) -> {key: text}`.
/// Registered under `TEMPORAL_MEMORY_PROVIDER_ID` so the Refiner's trimming
/// exemption check (`trim_tool_response`'s `provider_id` guard) matches the
/// same id the Router dispatches this provider's calls under.
pub struct TemporalMemoryProvider {
    store: std::sync::Arc<TemporalStore>,
}

impl TemporalMemoryProvider {
    pub fn new(store: std::sync::Arc<TemporalStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl crate::providers::ToolProvider for TemporalMemoryProvider {
    fn provider_id(&self) -> &str {
        TEMPORAL_MEMORY_PROVIDER_ID
    }

    async fn list_tools(&self) -> sa_domain::error::Result<Vec<sa_domain::message::ToolDefinition>> {
        Ok(vec![sa_domain::message::ToolDefinition {
            name: "recall".to_string(),
            description: "Recover the full text of a trimmed tool response by its recall key."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "keys": {
                        "type": "array",
                        "description": "recall keys named by [temporal-memory_recall(<key>)] markers",
                        "items": { "type": "string" }
                    }
                }
            }),
        }])
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> sa_domain::error::Result<Value> {
        if tool_name != "recall" {
            return Err(sa_domain::error::Error::NotFound(format!(
                "unknown tool '{tool_name}' on provider '{TEMPORAL_MEMORY_PROVIDER_ID}'"
            )));
        }
        let keys: Vec<String> = arguments
            .get("keys")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let resolved = self.store.get(&keys);
        Ok(serde_json::to_value(resolved).unwrap_or_default())
    }
}

/// Minimal `fnmatch`-style glob: `*` matches any run of characters, `?`
/// matches exactly one. No character classes; hierarchical keys only need
/// these two.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    glob_match_rec(&pattern, &candidate)
}

fn glob_match_rec(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some('*') => {
            glob_match_rec(&pattern[1..], candidate)
                || (!candidate.is_empty() && glob_match_rec(pattern, &candidate[1..]))
        }
        Some('?') => !candidate.is_empty() && glob_match_rec(&pattern[1..], &candidate[1..]),
        Some(c) => candidate.first() == Some(c) && glob_match_rec(&pattern[1..], &candidate[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_not_trimmed() {
        let store = TemporalStore::new();
        let out = store.trim_tool_response("m1", "fs", "short", 100);
        assert_eq!(out, "short");
        assert!(store.full_content_for("m1").is_none());
    }

    #[test]
    fn long_content_is_trimmed_with_recall_marker() {
        let store = TemporalStore::new();
        let content = "x".repeat(500);
        let out = store.trim_tool_response("m1", "fs", &content, 100);
        assert!(out.contains("[temporal-memory_recall(m1)]"));
        assert_eq!(store.full_content_for("m1").unwrap(), content);
    }

    #[test]
    fn temporal_memory_provider_responses_are_exempt() {
        let store = TemporalStore::new();
        let content = "x".repeat(500);
        let out = store.trim_tool_response("m1", TEMPORAL_MEMORY_PROVIDER_ID, &content, 100);
        assert_eq!(out, content);
        assert!(store.full_content_for("m1").is_none());
    }

    #[test]
    fn get_matching_direct_hit() {
        let store = TemporalStore::new();
        store.trim_tool_response("m1", "fs", &"x".repeat(500), 10);
        store.memorize("frrev", "m1", "french revolution note");

        let result = store.get_matching(&["frrev".to_string()]);
        assert_eq!(result.len(), 1);
        assert!(result["frrev"].is_some());
    }

    #[test]
    fn get_matching_wildcard() {
        let store = TemporalStore::new();
        store.trim_tool_response("m1", "fs", &"x".repeat(500), 10);
        store.trim_tool_response("m2", "fs", &"y".repeat(500), 10);
        store.memorize("proj:a", "m1", "note a");
        store.memorize("proj:b", "m2", "note b");

        let result = store.get_matching(&["proj:*".to_string()]);
        assert_eq!(result.len(), 2);
        assert!(result.contains_key("proj:a"));
        assert!(result.contains_key("proj:b"));
    }

    #[test]
    fn get_matching_no_match_returns_none() {
        let store = TemporalStore::new();
        let result = store.get_matching(&["nope".to_string()]);
        assert_eq!(result.get("nope"), Some(&None));
    }

    #[test]
    fn status_groups_by_top_level_scope() {
        let store = TemporalStore::new();
        store.memorize("proj:a", "m1", "note a");
        store.memorize("proj:b", "m2", "note b");
        store.memorize("other", "m3", "note c");

        let status = store.status();
        assert_eq!(status["proj"].len(), 2);
        assert_eq!(status["other"].len(), 1);
    }

    #[test]
    fn glob_match_handles_star_and_question_mark() {
        assert!(glob_match("proj:*", "proj:a"));
        assert!(glob_match("k?y", "key"));
        assert!(!glob_match("proj:*", "other:a"));
    }

    #[test]
    fn get_resolves_trimmed_message_by_key() {
        let store = TemporalStore::new();
        let content = "x".repeat(500);
        store.trim_tool_response("m1", "fs", &content, 100);

        let result = store.get(&["m1".to_string(), "missing".to_string()]);
        assert_eq!(result["m1"], Some(content));
        assert_eq!(result["missing"], None);
    }

    #[tokio::test]
    async fn recall_provider_resolves_trimming_markers() {
        use crate::providers::ToolProvider;

        let store = std::sync::Arc::new(TemporalStore::new());
        let content = "y".repeat(500);
        store.trim_tool_response("m1", "fs", &content, 100);

        let provider = TemporalMemoryProvider::new(store);
        assert_eq!(provider.provider_id(), TEMPORAL_MEMORY_PROVIDER_ID);

        let tools = provider.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "recall");

        let result = provider
            .call_tool("recall", serde_json::json!({"keys": ["m1"]}))
            .await
            .unwrap();
        assert_eq!(result["m1"], serde_json::Value::String(content));
    }

    #[tokio::test]
    async fn recall_provider_rejects_unknown_tool_name() {
        use crate::providers::ToolProvider;

        let provider = TemporalMemoryProvider::new(std::sync::Arc::new(TemporalStore::new()));
        let err = provider.call_tool("other", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, sa_domain::error::Error::NotFound(_)));
    }
}
