//! AI support chat: per-user message history answered by the suggestion provider.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::ai::SuggestionProvider;
use crate::models::{ChatMessage, ChatSender};
use crate::session::{SessionError, SharedSession};

pub const MAX_CHAT_MESSAGES: usize = 100;

pub const GREETING: &str = "Hello! I'm the Surprise Sender AI Support Assistant. How can I help you today with general questions about our platform?";
pub const UNAVAILABLE_REPLY: &str = "I'm sorry, but the AI features are currently unavailable. Please check the API key configuration or try again later.";
pub const FAILED_REPLY: &str = "I encountered an issue trying to process your request. Please try rephrasing or contact human support.";

#[derive(Debug, Error)]
pub enum SupportError {
    #[error("Please type a question first.")]
    EmptyQuestion,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Prompt sent to the provider for one support question.
pub fn support_prompt(question: &str) -> String {
    format!(
        "You are a friendly and helpful AI Support Assistant for 'Surprise Sender', a web application \
         for AI-assisted communication (email, SMS, agents). The user's question is: \"{question}\". \
         Provide a concise and helpful answer regarding general platform features or usage. \
         If you don't know the answer, if it is too complex, if it asks for personal opinions, \
         or if it requires specific account access or debugging of user-specific data, politely state \
         that you cannot assist with that specific query and suggest they contact human support via \
         riseurp@gmail.com or admin@surprisesender.com. Keep your responses short and focused. \
         Do not provide instructions on how to become an admin. Do not discuss API keys or backend configurations."
    )
}

fn message(sender: ChatSender, text: impl Into<String>) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        text: text.into(),
        sender,
        timestamp: Utc::now(),
    }
}

#[derive(Clone)]
pub struct SupportDesk {
    session: SharedSession,
    provider: Arc<dyn SuggestionProvider>,
    conversations: Arc<Mutex<HashMap<String, Vec<ChatMessage>>>>, // keyed by user id
}

impl SupportDesk {
    pub fn new(session: SharedSession, provider: Arc<dyn SuggestionProvider>) -> Self {
        Self {
            session,
            provider,
            conversations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The user's conversation. Opening it the first time greets them and logs the visit.
    pub async fn history(&self, user_id: &str) -> Result<Vec<ChatMessage>, SupportError> {
        let mut conversations = self.conversations.lock().await;
        if let Some(messages) = conversations.get(user_id) {
            return Ok(messages.clone());
        }

        self.session
            .lock()
            .await
            .log_activity(user_id, "Viewed Support Page.")?;
        let messages = vec![message(ChatSender::Ai, GREETING)];
        conversations.insert(user_id.to_string(), messages.clone());
        Ok(messages)
    }

    /// Ask a question and return the assistant's reply. Provider failures become a canned reply.
    pub async fn ask(&self, user_id: &str, question: &str) -> Result<ChatMessage, SupportError> {
        if question.trim().is_empty() {
            return Err(SupportError::EmptyQuestion);
        }
        self.history(user_id).await?;

        let preview: String = question.chars().take(50).collect();
        self.session
            .lock()
            .await
            .log_activity(user_id, format!("AI Support: Asked - \"{preview}...\""))?;
        self.append(user_id, message(ChatSender::User, question)).await;

        let text = if !self.provider.is_available() {
            UNAVAILABLE_REPLY.to_string()
        } else {
            // No lock held while the provider is working
            match self
                .provider
                .generate_text_suggestion(&support_prompt(question))
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(user = %user_id, error = %e, "Support answer failed");
                    FAILED_REPLY.to_string()
                }
            }
        };

        let reply = message(ChatSender::Ai, text);
        self.append(user_id, reply.clone()).await;
        Ok(reply)
    }

    async fn append(&self, user_id: &str, chat: ChatMessage) {
        let mut conversations = self.conversations.lock().await;
        let messages = conversations.entry(user_id.to_string()).or_default();
        messages.push(chat);
        if messages.len() > MAX_CHAT_MESSAGES {
            let overflow = messages.len() - MAX_CHAT_MESSAGES;
            messages.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::session::SessionStore;
    use crate::storage::Storage;
    use async_trait::async_trait;

    enum Stub {
        Answers,
        Fails,
        Offline,
    }

    #[async_trait]
    impl SuggestionProvider for Stub {
        fn is_available(&self) -> bool {
            !matches!(self, Stub::Offline)
        }

        async fn generate_text_suggestion(&self, prompt: &str) -> Result<String, AiError> {
            match self {
                Stub::Answers => Ok(format!("answer ({} chars of prompt)", prompt.len())),
                _ => Err(AiError::EmptyResponse),
            }
        }
    }

    fn desk(stub: Stub) -> (SharedSession, SupportDesk) {
        let mut store = SessionStore::new(Storage::temporary().unwrap());
        store.hydrate();
        let session = store.into_shared();
        (session.clone(), SupportDesk::new(session, Arc::new(stub)))
    }

    #[tokio::test]
    async fn test_history_greets_once_and_logs_visit() {
        let (session, desk) = desk(Stub::Answers);
        let first = desk.history("admin-0").await.unwrap();
        let again = desk.history("admin-0").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].text, GREETING);
        assert_eq!(first[0].sender, ChatSender::Ai);
        assert_eq!(again, first);

        let store = session.lock().await;
        let visits = store
            .get_activities("admin-0")
            .iter()
            .filter(|a| a.description == "Viewed Support Page.")
            .count();
        assert_eq!(visits, 1);
    }

    #[tokio::test]
    async fn test_ask_records_both_sides() {
        let (session, desk) = desk(Stub::Answers);
        let reply = desk.ask("admin-0", "How do I import SMTP relays?").await.unwrap();
        assert!(reply.text.starts_with("answer ("));

        let history = desk.history("admin-0").await.unwrap();
        let senders: Vec<ChatSender> = history.iter().map(|m| m.sender).collect();
        assert_eq!(senders, [ChatSender::Ai, ChatSender::User, ChatSender::Ai]);
        assert_eq!(history[1].text, "How do I import SMTP relays?");
        assert_eq!(
            session.lock().await.get_activities("admin-0").last().unwrap().description,
            "AI Support: Asked - \"How do I import SMTP relays?...\""
        );
    }

    #[tokio::test]
    async fn test_ask_falls_back_when_provider_cannot_answer() {
        let (_, offline) = desk(Stub::Offline);
        assert_eq!(offline.ask("admin-0", "hi").await.unwrap().text, UNAVAILABLE_REPLY);

        let (_, failing) = desk(Stub::Fails);
        assert_eq!(failing.ask("admin-0", "hi").await.unwrap().text, FAILED_REPLY);

        assert!(matches!(
            failing.ask("admin-0", "   ").await,
            Err(SupportError::EmptyQuestion)
        ));
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let (_, desk) = desk(Stub::Answers);
        for n in 0..60 {
            desk.ask("admin-0", &format!("question {n}")).await.unwrap();
        }
        let history = desk.history("admin-0").await.unwrap();
        assert_eq!(history.len(), MAX_CHAT_MESSAGES);
        assert_eq!(history.last().unwrap().sender, ChatSender::Ai);
        assert_eq!(history[0].text, "question 10");
    }

    #[test]
    fn test_support_prompt_quotes_question() {
        assert!(support_prompt("Where are my drafts?").contains("\"Where are my drafts?\""));
    }
}
