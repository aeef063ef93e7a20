use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

/// Titles longer than this are cut and suffixed with an ellipsis.
pub const TITLE_MAX_CHARS: usize = 30;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), model_used: None }
    }

    pub fn assistant(text: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), model_used: Some(model_used.into()) }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Empty,
    Active,
}

/// The active, unarchived exchange list of a console.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Appends a user message and its reply together.
    pub fn push_exchange(&mut self, user: Message, reply: Message) {
        self.messages.reserve(2);
        self.messages.push(user);
        self.messages.push(reply);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> ConversationState {
        if self.messages.is_empty() { ConversationState::Empty } else { ConversationState::Active }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn first_user_text(&self) -> Option<&str> {
        self.messages.iter().find(|m| m.role == Role::User).map(|m| m.text.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: u64,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub id: u64,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id,
            title: s.title.clone(),
            message_count: s.messages.len(),
            created_at: s.created_at,
        }
    }
}

/// Archived sessions of one console, newest first.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionStore {
    sessions: Vec<Session>,
    next_id: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self { sessions: Vec::new(), next_id: 1 }
    }
}

impl SessionStore {
    /// Snapshots a non-empty conversation into a new session at the front of
    /// the store. Returns the new session id, or `None` for an empty one.
    pub fn archive(&mut self, conversation: &Conversation, now: DateTime<Utc>) -> Option<u64> {
        if conversation.is_empty() {
            return None;
        }
        let title = match conversation.first_user_text() {
            Some(text) => title_from_text(text),
            None => fallback_title(self.sessions.len(), now),
        };
        let id = self.next_id;
        self.next_id += 1;
        let messages = conversation.messages().to_vec();
        self.sessions.insert(0, Session { id, title, messages, created_at: now });
        Some(id)
    }

    pub fn get(&self, id: u64) -> Result<&Session> {
        self.sessions.iter().find(|s| s.id == id).ok_or(AssistantError::SessionNotFound(id))
    }

    /// Removes a session if present; reports whether anything was removed.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        before != self.sessions.len()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.next_id = 1;
    }

    pub fn summaries(&self, limit: Option<usize>) -> Vec<SessionSummary> {
        let take = limit.unwrap_or(self.sessions.len());
        self.sessions.iter().take(take).map(SessionSummary::from).collect()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub fn title_from_text(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= TITLE_MAX_CHARS {
        return text.to_string();
    }
    let mut title: String = text.chars().take(TITLE_MAX_CHARS - 1).collect();
    title.push_str(ELLIPSIS);
    title
}

/// Label for sessions without any user message, numbered by the store size
/// at archive time.
pub fn fallback_title(existing: usize, now: DateTime<Utc>) -> String {
    format!("New conversation ({} #{})", now.format("%H:%M"), existing + 1)
}
