//! Ordered, durable list of chat sessions.
//!
//! The store loads once when constructed and writes the full list back after
//! every mutation. Storage failures are logged and otherwise ignored; the
//! in-memory list stays authoritative for the life of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::core::message::Turn;
use crate::core::storage::KeyValueStorage;

pub const SESSIONS_KEY: &str = "chat_sessions";
pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 30;
const TITLE_ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default, alias = "messages")]
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new_empty() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Fields to merge into an existing session. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub turns: Option<Vec<Turn>>,
    pub title: Option<String>,
}

impl SessionUpdate {
    /// Replace the turns and re-derive the title from them.
    pub fn transcript(turns: Vec<Turn>) -> Self {
        let title = generate_title(&turns);
        Self {
            turns: Some(turns),
            title: Some(title),
        }
    }
}

/// Holds every session, most recent first.
///
/// Construct one per process and share it; two stores over the same
/// storage overwrite each other's writes.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    sessions: Vec<Session>,
}

impl SessionStore {
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let sessions = match storage.get(SESSIONS_KEY) {
            Ok(Some(value)) => decode_sessions(value),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "Failed to load sessions");
                Vec::new()
            }
        };
        Self { storage, sessions }
    }

    /// Create an empty session at the front of the list.
    pub fn create_session(&mut self) -> Session {
        let session = Session::new_empty();
        self.sessions.insert(0, session.clone());
        self.flush();
        session
    }

    /// Merge `update` into the session with `id`; unknown ids are ignored.
    pub fn update_session(&mut self, id: &str, update: SessionUpdate) {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) else {
            return;
        };
        if let Some(turns) = update.turns {
            session.turns = turns;
        }
        if let Some(title) = update.title {
            session.title = title;
        }
        self.flush();
    }

    pub fn delete_session(&mut self, id: &str) {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() != before {
            self.flush();
        }
    }

    pub fn get_sessions(&self) -> Vec<Session> {
        self.sessions.clone()
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.iter().find(|s| s.id == id).cloned()
    }

    /// Insert a session under a known id, used when resuming a chat link
    /// whose session is gone from the list.
    pub fn restore_session(&mut self, id: &str, turns: Vec<Turn>) -> Session {
        if let Some(existing) = self.get_session(id) {
            return existing;
        }
        let session = Session {
            id: id.to_string(),
            title: generate_title(&turns),
            turns,
            created_at: Utc::now(),
        };
        self.sessions.insert(0, session.clone());
        self.flush();
        session
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn flush(&self) {
        let value = match serde_json::to_value(&self.sessions) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Failed to encode sessions");
                return;
            }
        };
        if let Err(err) = self.storage.set(SESSIONS_KEY, &value) {
            warn!(error = %err, sessions = self.sessions.len(), "Failed to save sessions");
        }
    }
}

/// Title for a transcript: the first user turn's first line, cut to 30
/// characters, with `...` appended whenever anything was cut.
pub fn generate_title(turns: &[Turn]) -> String {
    let Some(first_user) = turns.iter().find(|turn| turn.is_user()) else {
        return DEFAULT_TITLE.to_string();
    };
    let content = first_user.content.as_str();
    let first_line = content.split('\n').next().unwrap_or_default();
    let title: String = first_line.chars().take(TITLE_MAX_CHARS).collect();

    if title.chars().count() < content.chars().count() {
        format!("{title}{TITLE_ELLIPSIS}")
    } else {
        title
    }
}

/// Decode each stored record on its own so one bad record costs only itself.
fn decode_sessions(value: serde_json::Value) -> Vec<Session> {
    let serde_json::Value::Array(records) = value else {
        warn!("Ignoring session list that is not an array");
        return Vec::new();
    };
    records
        .into_iter()
        .filter_map(|record| {
            let id = record
                .get("id")
                .and_then(|id| id.as_str())
                .unwrap_or_default()
                .to_string();
            serde_json::from_value::<Session>(record)
                .map_err(|err| warn!(id = %id, error = %err, "Skipping unreadable session"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStorage;
    use crate::utils::test_utils::create_test_turns;

    fn memory() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::new())
    }

    #[test]
    fn title_uses_first_line_and_marks_truncation() {
        let turns = vec![Turn::user(
            "Hello\nworld and then some very long text exceeding thirty characters",
        )];
        assert_eq!(generate_title(&turns), "Hello...");

        let long = vec![Turn::user(
            "This first line is definitely longer than thirty characters",
        )];
        let title = generate_title(&long);
        assert_eq!(title, "This first line is definitely ...");
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + TITLE_ELLIPSIS.len());

        assert_eq!(generate_title(&[Turn::user("Short")]), "Short");
    }

    #[test]
    fn title_defaults_without_a_user_turn() {
        assert_eq!(generate_title(&[]), DEFAULT_TITLE);
        assert_eq!(
            generate_title(&[Turn::assistant("Hi"), Turn::system("rules")]),
            DEFAULT_TITLE
        );
    }

    #[test]
    fn title_counts_characters_not_bytes() {
        let turns = vec![Turn::user("é".repeat(40))];
        assert_eq!(generate_title(&turns), format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn new_sessions_go_to_the_front() {
        let mut store = SessionStore::load(memory());
        let first = store.create_session();
        let second = store.create_session();

        let ids: Vec<String> = store.get_sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id.clone()]);
        assert_eq!(first.title, DEFAULT_TITLE);
        assert!(first.is_empty());
    }

    #[test]
    fn update_merges_only_given_fields() {
        let mut store = SessionStore::load(memory());
        let session = store.create_session();

        store.update_session(
            &session.id,
            SessionUpdate {
                turns: Some(create_test_turns()),
                title: None,
            },
        );
        let updated = store.get_session(&session.id).unwrap();
        assert_eq!(updated.turns, create_test_turns());
        assert_eq!(updated.title, DEFAULT_TITLE);

        store.update_session(
            &session.id,
            SessionUpdate {
                turns: None,
                title: Some("Renamed".into()),
            },
        );
        let updated = store.get_session(&session.id).unwrap();
        assert_eq!(updated.turns, create_test_turns());
        assert_eq!(updated.title, "Renamed");

        store.update_session("missing", SessionUpdate::transcript(Vec::new()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_ignores_unknown_ids() {
        let mut store = SessionStore::load(memory());
        let keep = store.create_session();
        let drop = store.create_session();

        store.delete_session("nope");
        assert_eq!(store.len(), 2);

        store.delete_session(&drop.id);
        assert_eq!(store.get_sessions(), vec![keep]);
    }

    #[test]
    fn sessions_survive_a_reload() {
        let storage = memory();
        let mut store = SessionStore::load(storage.clone());
        let session = store.create_session();
        store.update_session(&session.id, SessionUpdate::transcript(create_test_turns()));
        let before = store.get_sessions();

        let reloaded = SessionStore::load(storage);
        assert_eq!(reloaded.get_sessions(), before);
        assert_eq!(
            reloaded.get_session(&session.id).unwrap().turns,
            create_test_turns()
        );
        assert_eq!(reloaded.get_session(&session.id).unwrap().title, "Hello");
    }

    #[test]
    fn persisted_records_use_camel_case_fields() {
        let storage = memory();
        let mut store = SessionStore::load(storage.clone());
        store.create_session();

        let stored = storage.get(SESSIONS_KEY).unwrap().unwrap();
        let record = &stored[0];
        assert!(record.get("createdAt").is_some());
        assert!(record.get("turns").unwrap().as_array().unwrap().is_empty());
        assert_eq!(record["title"], DEFAULT_TITLE);
    }

    #[test]
    fn legacy_messages_field_is_accepted() {
        let storage = memory();
        storage
            .set(
                SESSIONS_KEY,
                &serde_json::json!([{
                    "id": "abc",
                    "title": "Hi",
                    "messages": [{"role": "user", "content": "Hi", "id": "m1"}],
                    "createdAt": "2024-05-01T10:00:00Z"
                }]),
            )
            .unwrap();

        let store = SessionStore::load(storage);
        let session = store.get_session("abc").unwrap();
        assert_eq!(session.turns, vec![Turn::user("Hi")]);
    }

    #[test]
    fn unreadable_records_do_not_take_the_others_down() {
        let storage = memory();
        storage
            .set(
                SESSIONS_KEY,
                &serde_json::json!([
                    {
                        "id": "good",
                        "title": "Hi",
                        "turns": [{"role": "user", "content": "Hi"}],
                        "createdAt": "2024-05-01T10:00:00Z"
                    },
                    {
                        "id": "bad",
                        "title": "Tools",
                        "turns": [{"role": "tool", "content": "{}"}],
                        "createdAt": "2024-05-01T11:00:00Z"
                    }
                ]),
            )
            .unwrap();

        let mut store = SessionStore::load(storage.clone());
        assert_eq!(store.len(), 1);
        assert!(store.get_session("bad").is_none());

        let fresh = store.create_session();
        let reloaded = SessionStore::load(storage);
        let ids: Vec<String> = reloaded.get_sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![fresh.id, "good".to_string()]);
    }

    #[test]
    fn non_array_session_list_loads_empty() {
        let storage = memory();
        storage
            .set(SESSIONS_KEY, &serde_json::json!({"id": "x"}))
            .unwrap();
        assert!(SessionStore::load(storage).is_empty());
    }

    #[test]
    fn storage_failures_keep_memory_authoritative() {
        let storage = memory();
        let mut store = SessionStore::load(storage.clone());
        let session = store.create_session();

        storage.set_fail_writes(true);
        store.update_session(&session.id, SessionUpdate::transcript(create_test_turns()));
        assert_eq!(
            store.get_session(&session.id).unwrap().turns,
            create_test_turns()
        );
        let on_disk: Vec<Session> =
            serde_json::from_value(storage.get(SESSIONS_KEY).unwrap().unwrap()).unwrap();
        assert!(on_disk[0].turns.is_empty());

        storage.set_fail_writes(false);
        store.update_session(&session.id, SessionUpdate::default());
        let reloaded = SessionStore::load(storage);
        assert_eq!(
            reloaded.get_session(&session.id).unwrap().turns,
            create_test_turns()
        );
    }

    #[test]
    fn unreadable_list_starts_empty() {
        let storage = memory();
        storage
            .set(SESSIONS_KEY, &serde_json::json!({"not": "a list"}))
            .unwrap();
        assert!(SessionStore::load(storage).is_empty());
    }

    #[test]
    fn restore_reuses_or_inserts() {
        let mut store = SessionStore::load(memory());
        let existing = store.create_session();
        assert_eq!(store.restore_session(&existing.id, create_test_turns()), existing);

        let restored = store.restore_session("gone", vec![Turn::user("Back again")]);
        assert_eq!(restored.title, "Back again");
        assert_eq!(store.get_sessions()[0].id, "gone");
    }
}
