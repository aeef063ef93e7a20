//! Per-UI-session state and the actions that move it forward.
//!
//! A [`Console`] is a plain value. Every action takes the current snapshot and
//! returns the next one, so a failed action leaves the caller holding the
//! unchanged previous state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{AssistantError, Result};
use crate::models::ModelRequest;
use crate::prompt::{assemble_prompt, ClusterContext};
use crate::session::{Conversation, Message, SessionStore};
use crate::settings::{resolve_effective_settings, ModelParams, ModelSettings, RequestOverrides};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Console {
    pub conversation: Conversation,
    pub sessions: SessionStore,
    pub model: ModelSettings,
    pub cluster: Option<ClusterContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleAction {
    StartNewConversation { at: DateTime<Utc> },
    RestoreSession { id: u64 },
    DeleteSession { id: u64 },
    ClearAllSessions,
    DiscardConversation,
    SelectCluster(Option<ClusterContext>),
    SelectModel(String),
    UpdateParams(ModelParams),
    RecordExchange { user: String, reply: String, model: String },
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, action: ConsoleAction) -> Result<Console> {
        match action {
            ConsoleAction::StartNewConversation { at } => Ok(self.start_new_conversation(at).0),
            ConsoleAction::RestoreSession { id } => self.restore_session(id),
            ConsoleAction::DeleteSession { id } => Ok(self.delete_session(id)),
            ConsoleAction::ClearAllSessions => Ok(self.clear_all_sessions()),
            ConsoleAction::DiscardConversation => Ok(self.discard_conversation()),
            ConsoleAction::SelectCluster(cluster) => Ok(Console { cluster, ..self.clone() }),
            ConsoleAction::SelectModel(model_id) => self.select_model(model_id),
            ConsoleAction::UpdateParams(patch) => self.update_params(patch),
            ConsoleAction::RecordExchange { user, reply, model } => {
                Ok(self.record_exchange(user, reply, model))
            }
        }
    }

    /// Archives a non-empty conversation and starts a fresh one. Returns the
    /// id of the archived session, if one was created.
    pub fn start_new_conversation(&self, at: DateTime<Utc>) -> (Console, Option<u64>) {
        let mut next = self.clone();
        let archived = next.sessions.archive(&self.conversation, at);
        next.conversation = Conversation::new();
        if let Some(id) = archived {
            metrics::counter!("assistant_sessions_archived_total").increment(1);
            tracing::debug!(session = id, "archived conversation");
        }
        (next, archived)
    }

    /// Replaces the active conversation with a copy of a stored session.
    pub fn restore_session(&self, id: u64) -> Result<Console> {
        let session = self.sessions.get(id)?;
        let conversation = Conversation::from_messages(session.messages.clone());
        Ok(Console { conversation, ..self.clone() })
    }

    pub fn delete_session(&self, id: u64) -> Console {
        let mut next = self.clone();
        if next.sessions.remove(id) {
            tracing::debug!(session = id, "deleted session");
        }
        next
    }

    /// Drops every stored session; ids start again at 1.
    pub fn clear_all_sessions(&self) -> Console {
        if !self.sessions.is_empty() {
            tracing::debug!(count = self.sessions.len(), "clearing sessions");
        }
        let mut next = self.clone();
        next.sessions.clear();
        next
    }

    pub fn discard_conversation(&self) -> Console {
        Console { conversation: Conversation::new(), ..self.clone() }
    }

    pub fn select_model(&self, model_id: String) -> Result<Console> {
        let model_id = model_id.trim().to_string();
        if model_id.is_empty() {
            return Err(AssistantError::validation("model id is empty"));
        }
        let mut next = self.clone();
        next.model.model_id = Some(model_id);
        Ok(next)
    }

    pub fn update_params(&self, patch: ModelParams) -> Result<Console> {
        patch.validate()?;
        let mut next = self.clone();
        next.model.params.apply_patch(patch);
        Ok(next)
    }

    /// Appends a completed exchange; user and assistant messages go in together.
    pub fn record_exchange(&self, user: String, reply: String, model: String) -> Console {
        let mut next = self.clone();
        next.conversation.push_exchange(Message::user(user), Message::assistant(reply, model));
        next
    }

    /// Validates the input and resolves everything a model call needs.
    pub fn prepare_request(
        &self,
        text: &str,
        overrides: &RequestOverrides,
        config: &AppConfig,
    ) -> Result<ModelRequest> {
        if let Some(params) = &overrides.model_params {
            params.validate()?;
        }
        let prompt = assemble_prompt(text, self.cluster.as_ref(), config.max_input_chars)?;
        let effective = resolve_effective_settings(&config.defaults, &self.model, overrides);
        let model = effective.model.ok_or_else(|| AssistantError::validation("no model selected"))?;
        Ok(ModelRequest { model, prompt, params: effective.params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 17, 0).unwrap()
    }

    fn chatted(console: &Console, question: &str) -> Console {
        console.record_exchange(question.into(), format!("answer to {question}"), "m".into())
    }

    #[test]
    fn sessions_created_only_for_non_empty_conversations() {
        let mut console = Console::new();
        let mut expected = 0;
        for step in 0..6 {
            if step % 2 == 0 {
                console = chatted(&console, &format!("q{step}"));
                expected += 1;
            }
            console = console.apply(ConsoleAction::StartNewConversation { at: now() }).unwrap();
            console = console.apply(ConsoleAction::StartNewConversation { at: now() }).unwrap();
        }
        assert_eq!(console.sessions.len(), expected);
        assert!(console.conversation.is_empty());
    }

    #[test]
    fn later_mutation_never_touches_archived_session() {
        let console = chatted(&Console::new(), "first question");
        let (console, id) = console.start_new_conversation(now());
        let id = id.unwrap();
        let before = console.sessions.get(id).unwrap().messages.clone();

        let restored = console.restore_session(id).unwrap();
        let mutated = chatted(&restored, "follow up");
        assert_eq!(mutated.conversation.len(), 4);
        assert_eq!(mutated.sessions.get(id).unwrap().messages, before);
    }

    #[test]
    fn restore_then_archive_round_trips_messages() {
        let console = chatted(&chatted(&Console::new(), "a"), "b");
        let (console, first) = console.start_new_conversation(now());
        let first = first.unwrap();

        let restored = console.restore_session(first).unwrap();
        let (archived, second) = restored.start_new_conversation(now());
        let second = second.unwrap();

        assert_ne!(first, second);
        assert_eq!(
            archived.sessions.get(second).unwrap().messages,
            archived.sessions.get(first).unwrap().messages
        );
    }

    #[test]
    fn restore_replaces_unarchived_conversation() {
        let (console, first) = chatted(&Console::new(), "a").start_new_conversation(now());
        let first = first.unwrap();
        let console = chatted(&console, "unsaved");

        let restored = console.apply(ConsoleAction::RestoreSession { id: first }).unwrap();
        let archived = &console.sessions.get(first).unwrap().messages;
        assert_eq!(restored.conversation.messages(), archived.as_slice());
        assert!(restored.conversation.messages().iter().all(|m| m.text != "unsaved"));
        assert_eq!(restored.sessions.len(), 1);
        assert_eq!(restored.sessions, console.sessions);
    }

    #[test]
    fn restore_unknown_session_fails_and_keeps_state() {
        let console = chatted(&Console::new(), "keep me");
        let err = console.apply(ConsoleAction::RestoreSession { id: 42 }).unwrap_err();
        assert!(matches!(err, AssistantError::SessionNotFound(42)));
        assert_eq!(console.conversation.len(), 2);
    }

    #[test]
    fn delete_missing_session_is_noop() {
        let (console, _) = chatted(&Console::new(), "q").start_new_conversation(now());
        let next = console.apply(ConsoleAction::DeleteSession { id: 99 }).unwrap();
        assert_eq!(next.sessions.len(), 1);
        let next = next.apply(ConsoleAction::DeleteSession { id: 1 }).unwrap();
        assert!(next.sessions.is_empty());
    }

    #[test]
    fn clear_all_resets_id_counter() {
        let (console, _) = chatted(&Console::new(), "q1").start_new_conversation(now());
        let (console, _) = chatted(&console, "q2").start_new_conversation(now());
        let console = chatted(&console, "still active");
        let cleared = console.apply(ConsoleAction::ClearAllSessions).unwrap();
        assert!(cleared.sessions.is_empty());
        assert_eq!(cleared.conversation, console.conversation);
        let (_, id) = chatted(&cleared, "q3").start_new_conversation(now());
        assert_eq!(id, Some(1));
    }

    #[test]
    fn discard_drops_conversation_without_archiving() {
        let console = chatted(&Console::new(), "throwaway");
        let next = console.apply(ConsoleAction::DiscardConversation).unwrap();
        assert!(next.conversation.is_empty());
        assert!(next.sessions.is_empty());
    }

    #[test]
    fn exchange_is_recorded_as_ordered_pair() {
        let exchange = ConsoleAction::RecordExchange {
            user: "hi".into(),
            reply: "hello".into(),
            model: "m".into(),
        };
        let console = Console::new().apply(exchange).unwrap();
        let roles: Vec<_> = console.conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(console.conversation.messages()[1].model_used.as_deref(), Some("m"));
    }

    #[test]
    fn invalid_params_leave_settings_untouched() {
        let warm = ModelParams { temperature: Some(0.2), ..Default::default() };
        let console = Console::new().apply(ConsoleAction::UpdateParams(warm)).unwrap();
        let too_wide = ModelParams { top_k: Some(900), ..Default::default() };
        let err = console.apply(ConsoleAction::UpdateParams(too_wide)).unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));
        assert_eq!(console.model.params.temperature, Some(0.2));
        assert_eq!(console.model.params.top_k, None);
    }

    #[test]
    fn prepare_request_uses_cluster_and_model_fallback() {
        let config = AppConfig::default();
        let console = Console::new()
            .apply(ConsoleAction::SelectCluster(Some(ClusterContext {
                name: "demo".into(),
                status: "ACTIVE".into(),
                version: "1.29".into(),
            })))
            .unwrap();
        let none = RequestOverrides::default();
        let req = console.prepare_request("scale my app", &none, &config).unwrap();
        assert_eq!(req.model, crate::config::DEFAULT_MODEL);
        assert!(req.prompt.ends_with("\n\nscale my app"));
        assert_eq!(req.params.max_tokens, 1000);

        let llama = ConsoleAction::SelectModel("meta.llama3-8b-instruct-v1:0".into());
        let picked = console.apply(llama).unwrap();
        let req = picked.prepare_request("scale my app", &none, &config).unwrap();
        assert_eq!(req.model, "meta.llama3-8b-instruct-v1:0");
    }

    #[test]
    fn prepare_request_rejects_bad_input() {
        let config = AppConfig::default();
        let console = Console::new();
        assert!(console.prepare_request("", &RequestOverrides::default(), &config).is_err());
        let long = "x".repeat(config.max_input_chars + 1);
        assert!(console.prepare_request(&long, &RequestOverrides::default(), &config).is_err());

        let mut no_default = AppConfig::default();
        no_default.defaults.default_model = None;
        let none = RequestOverrides::default();
        let err = console.prepare_request("hi", &none, &no_default).unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));
    }

    #[test]
    fn empty_model_id_is_rejected() {
        assert!(Console::new().select_model("  ".into()).is_err());
    }
}
