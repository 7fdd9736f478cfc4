//! Per-chat snapshots behind resumable `?chat=<id>` links.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::core::message::Turn;
use crate::core::session_store::SESSIONS_KEY;
use crate::core::storage::KeyValueStorage;

const SNAPSHOT_PREFIX: &str = "chat_";
const PREVIEW_CHARS: usize = 100;
const EMPTY_PREVIEW: &str = "Empty chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub messages: Vec<Turn>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: String,
    pub timestamp: i64,
    pub preview: String,
}

pub struct ChatSnapshots {
    storage: Arc<dyn KeyValueStorage>,
}

impl ChatSnapshots {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Record `turns` for chat `id`. Empty transcripts are not written.
    pub fn save(&self, id: &str, turns: &[Turn]) {
        if turns.is_empty() {
            return;
        }
        let snapshot = ChatSnapshot {
            messages: turns.to_vec(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let result = serde_json::to_value(&snapshot)
            .map_err(|err| err.to_string())
            .and_then(|value| {
                self.storage
                    .set(&snapshot_key(id), &value)
                    .map_err(|err| err.to_string())
            });
        if let Err(err) = result {
            warn!(chat_id = id, error = %err, "Failed to save chat snapshot");
        }
    }

    pub fn load(&self, id: &str) -> Option<ChatSnapshot> {
        let value = match self.storage.get(&snapshot_key(id)) {
            Ok(value) => value?,
            Err(err) => {
                warn!(chat_id = id, error = %err, "Failed to read chat snapshot");
                return None;
            }
        };
        serde_json::from_value(value)
            .map_err(|err| warn!(chat_id = id, error = %err, "Invalid chat snapshot"))
            .ok()
    }

    pub fn remove(&self, id: &str) {
        if let Err(err) = self.storage.remove(&snapshot_key(id)) {
            warn!(chat_id = id, error = %err, "Failed to remove chat snapshot");
        }
    }

    /// Every readable snapshot, newest first.
    pub fn list(&self) -> Vec<ChatSummary> {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "Failed to list chat snapshots");
                return Vec::new();
            }
        };

        let mut chats: Vec<ChatSummary> = keys
            .iter()
            .filter(|key| key.as_str() != SESSIONS_KEY)
            .filter_map(|key| key.strip_prefix(SNAPSHOT_PREFIX))
            .filter_map(|id| {
                let snapshot = self.load(id)?;
                let preview = snapshot
                    .messages
                    .last()
                    .map(|turn| turn.content.chars().take(PREVIEW_CHARS).collect::<String>())
                    .filter(|preview| !preview.is_empty())
                    .unwrap_or_else(|| EMPTY_PREVIEW.to_string());
                Some(ChatSummary {
                    id: id.to_string(),
                    timestamp: snapshot.timestamp,
                    preview,
                })
            })
            .collect();
        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        chats
    }
}

fn snapshot_key(id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{id}")
}

/// Shareable link for a chat.
pub fn chat_link(id: &str) -> String {
    format!("?chat={id}")
}

/// Chat id from a link (`?chat=<id>`, a full URL) or a bare id.
pub fn parse_chat_link(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let Some((_, query)) = input.split_once('?') else {
        return (!input.contains(['=', '&', '/'])).then(|| input.to_string());
    };
    query
        .split('#')
        .next()
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "chat")
        .map(|(_, id)| id.to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn links_round_trip() {
        assert_eq!(chat_link("abc-123"), "?chat=abc-123");
        assert_eq!(parse_chat_link("?chat=abc-123"), Some("abc-123".into()));
        assert_eq!(
            parse_chat_link("https://example.org/?theme=dark&chat=xyz#top"),
            Some("xyz".into())
        );
        assert_eq!(parse_chat_link("  plain-id "), Some("plain-id".into()));
        assert_eq!(parse_chat_link("?theme=dark"), None);
        assert_eq!(parse_chat_link("?chat="), None);
        assert_eq!(parse_chat_link(""), None);
    }

    #[test]
    fn empty_transcripts_are_not_saved() {
        let storage = Arc::new(MemoryStorage::new());
        let snapshots = ChatSnapshots::new(storage.clone());
        snapshots.save("a", &[]);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn save_and_load() {
        let snapshots = ChatSnapshots::new(Arc::new(MemoryStorage::new()));
        let turns = vec![Turn::user("Hi"), Turn::assistant("Hello!")];
        snapshots.save("a", &turns);

        let loaded = snapshots.load("a").unwrap();
        assert_eq!(loaded.messages, turns);
        assert!(loaded.timestamp > 0);
        assert!(snapshots.load("missing").is_none());

        snapshots.remove("a");
        assert!(snapshots.load("a").is_none());
    }

    #[test]
    fn list_is_sorted_and_skips_invalid_records() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(
                "chat_old",
                &json!({"messages": [{"role": "user", "content": "first"}], "timestamp": 10}),
            )
            .unwrap();
        storage
            .set(
                "chat_new",
                &json!({"messages": [
                    {"role": "user", "content": "q"},
                    {"role": "assistant", "content": "x".repeat(150)}
                ], "timestamp": 20}),
            )
            .unwrap();
        storage
            .set("chat_empty", &json!({"messages": [], "timestamp": 5}))
            .unwrap();
        storage.set("chat_broken", &json!({"nope": true})).unwrap();
        storage.set(SESSIONS_KEY, &json!([])).unwrap();
        storage.set("chatbot_settings", &json!({})).unwrap();

        let chats = ChatSnapshots::new(storage).list();
        let ids: Vec<&str> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "empty"]);
        assert_eq!(chats[0].preview, "x".repeat(100));
        assert_eq!(chats[1].preview, "first");
        assert_eq!(chats[2].preview, EMPTY_PREVIEW);
    }
}
