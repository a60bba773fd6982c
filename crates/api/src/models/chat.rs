//! Chat domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use reality_cheque_core::{AiModelId, ChatId, ChatRole, MessageId, UserId};

/// Maximum length of a chat title, in characters.
pub const MAX_TITLE_CHARS: usize = 50;

/// A conversation between one user and one model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    /// Owner; `None` once the account has been deleted.
    pub user_id: Option<UserId>,
    pub ai_model_id: AiModelId,
    /// Legacy session identifier, `{userId}_{modelId}_{unixMillis}`.
    #[serde(rename = "sessionId")]
    pub session_key: String,
    pub title: Option<String>,
    pub is_active: bool,
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Build a legacy session key for a new chat.
    #[must_use]
    pub fn session_key_for(user_id: UserId, model_id: AiModelId, at: DateTime<Utc>) -> String {
        format!("{user_id}_{model_id}_{}", at.timestamp_millis())
    }

    /// Title for a chat's first message.
    ///
    /// Uses the user's input, or `Chat with {model}` when the input is blank,
    /// cut to [`MAX_TITLE_CHARS`] characters.
    #[must_use]
    pub fn title_from(input: &str, model_name: &str) -> String {
        let input = input.trim();
        let title = if input.is_empty() {
            format!("Chat with {model_name}")
        } else {
            input.to_string()
        };
        title.chars().take(MAX_TITLE_CHARS).collect()
    }

    /// Whether `user_id` owns this chat.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }
}

/// A chat in a user's chat list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub model_name: String,
    pub message_count: i64,
}

/// One turn in a chat. Immutable once stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: ChatRole,
    pub content: String,
    pub tokens: i32,
    /// `{featureName: content}` for feature-based replies.
    pub structured_response: Option<serde_json::Value>,
    pub has_features: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregated numbers for one chat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub chat_id: ChatId,
    pub title: Option<String>,
    pub message_count: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
