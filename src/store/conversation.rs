//! Bounded, TTL-expiring per-session conversation history.
//!
//! Sessions are created on first write and purged lazily: every store
//! access first drops any session whose most recent turn is older than the
//! TTL. Histories are ring buffers — once a session holds `max_messages`
//! turns, appending drops the oldest.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One stored conversation turn.
#[derive(Debug, Clone)]
struct Turn {
    role: Role,
    content: String,
    timestamp: u64,
}

/// A turn as returned to callers — role and content only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnView {
    pub role: Role,
    pub content: String,
}

/// In-memory conversation store shared by all exchanges.
pub struct ConversationStore {
    sessions: Mutex<HashMap<String, VecDeque<Turn>>>,
    max_messages: usize,
    ttl_secs: u64,
}

impl ConversationStore {
    /// Create a store keeping at most `max_messages` turns per session and
    /// expiring sessions idle for longer than `ttl_secs`.
    pub fn new(max_messages: usize, ttl_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_messages: max_messages.max(1),
            ttl_secs,
        }
    }

    /// Append a turn to `session_id`, creating the session if needed.
    pub fn add(&self, session_id: &str, role: Role, content: &str) {
        let now = now_secs();
        let mut sessions = self.sessions.lock().expect("conversation lock poisoned");
        Self::purge_expired(&mut sessions, now, self.ttl_secs);

        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push_back(Turn {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        while turns.len() > self.max_messages {
            turns.pop_front();
        }
    }

    /// Return the stored turns for `session_id`, oldest first.
    /// Unknown or expired sessions yield an empty vec, never an error.
    pub fn get(&self, session_id: &str) -> Vec<TurnView> {
        let now = now_secs();
        let mut sessions = self.sessions.lock().expect("conversation lock poisoned");
        Self::purge_expired(&mut sessions, now, self.ttl_secs);

        sessions
            .get(session_id)
            .map(|turns| {
                turns
                    .iter()
                    .map(|t| TurnView {
                        role: t.role,
                        content: t.content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every session whose last turn is older than the TTL.
    fn purge_expired(sessions: &mut HashMap<String, VecDeque<Turn>>, now: u64, ttl_secs: u64) {
        sessions.retain(|_, turns| {
            turns
                .back()
                .is_some_and(|t| now.saturating_sub(t.timestamp) <= ttl_secs)
        });
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
