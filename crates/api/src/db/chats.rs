//! Chat repository: chats, messages and per-chat totals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use reality_cheque_core::{AiModelId, ChatId, ChatRole, MessageId, UserId};

use super::RepositoryError;
use crate::models::{Chat, ChatStats, ChatSummary, Message};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ChatRow {
    id: i32,
    user_id: Option<i32>,
    ai_model_id: i32,
    session_key: String,
    title: Option<String>,
    is_active: bool,
    total_tokens: i64,
    total_cost: Decimal,
    last_activity: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<ChatRow> for Chat {
    fn from(row: ChatRow) -> Self {
        Self {
            id: ChatId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            ai_model_id: AiModelId::new(row.ai_model_id),
            session_key: row.session_key,
            title: row.title,
            is_active: row.is_active,
            total_tokens: row.total_tokens,
            total_cost: row.total_cost,
            last_activity: row.last_activity,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChatSummaryRow {
    #[sqlx(flatten)]
    chat: ChatRow,
    model_name: String,
    message_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i32,
    chat_id: i32,
    role: ChatRole,
    content: String,
    tokens: i32,
    structured_response: Option<serde_json::Value>,
    has_features: bool,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::new(row.id),
            chat_id: ChatId::new(row.chat_id),
            role: row.role,
            content: row.content,
            tokens: row.tokens,
            structured_response: row.structured_response,
            has_features: row.has_features,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChatStatsRow {
    id: i32,
    title: Option<String>,
    total_tokens: i64,
    total_cost: Decimal,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    message_count: i64,
    user_messages: i64,
    assistant_messages: i64,
}

// =============================================================================
// Parameter Types
// =============================================================================

/// The assistant side of an exchange.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub content: String,
    pub tokens: i32,
    pub structured_response: Option<serde_json::Value>,
}

/// One request/response round to persist on a chat.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub chat_id: ChatId,
    /// The user's message; `None` when the input was empty.
    pub user_message: Option<(String, i32)>,
    pub reply: AssistantReply,
    pub total_tokens: i64,
    pub cost: Decimal,
    /// Title to set if the chat has none yet.
    pub title: Option<String>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for chat database operations.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    /// Create a new chat repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a new chat.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the session key is taken.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: UserId,
        model_id: AiModelId,
        session_key: &str,
    ) -> Result<Chat, RepositoryError> {
        let row = sqlx::query_as::<_, ChatRow>(
            r"
            INSERT INTO app.chats (user_id, ai_model_id, session_key)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, ai_model_id, session_key, title, is_active,
                      total_tokens, total_cost, last_activity, created_at
            ",
        )
        .bind(user_id)
        .bind(model_id)
        .bind(session_key)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "session key already exists"))?;

        Ok(row.into())
    }

    /// Get a chat by ID regardless of state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatRow>(
            r"
            SELECT id, user_id, ai_model_id, session_key, title, is_active,
                   total_tokens, total_cost, last_activity, created_at
            FROM app.chats
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get a chat by its legacy session key regardless of state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_session_key(&self, key: &str) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatRow>(
            r"
            SELECT id, user_id, ai_model_id, session_key, title, is_active,
                   total_tokens, total_cost, last_activity, created_at
            FROM app.chats
            WHERE session_key = $1
            ",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Find an active chat owned by `user_id` on `model_id`, by chat ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_active(
        &self,
        id: ChatId,
        user_id: UserId,
        model_id: AiModelId,
    ) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatRow>(
            r"
            SELECT id, user_id, ai_model_id, session_key, title, is_active,
                   total_tokens, total_cost, last_activity, created_at
            FROM app.chats
            WHERE id = $1 AND user_id = $2 AND ai_model_id = $3 AND is_active
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(model_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Find an active chat owned by `user_id` on `model_id`, by session key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_active_by_session_key(
        &self,
        key: &str,
        user_id: UserId,
        model_id: AiModelId,
    ) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatRow>(
            r"
            SELECT id, user_id, ai_model_id, session_key, title, is_active,
                   total_tokens, total_cost, last_activity, created_at
            FROM app.chats
            WHERE session_key = $1 AND user_id = $2 AND ai_model_id = $3 AND is_active
            ",
        )
        .bind(key)
        .bind(user_id)
        .bind(model_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List a user's active chats, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ChatSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChatSummaryRow>(
            r"
            SELECT c.id, c.user_id, c.ai_model_id, c.session_key, c.title, c.is_active,
                   c.total_tokens, c.total_cost, c.last_activity, c.created_at,
                   m.name AS model_name,
                   (SELECT COUNT(*) FROM app.messages msg WHERE msg.chat_id = c.id)
                       AS message_count
            FROM app.chats c
            JOIN app.ai_models m ON m.id = c.ai_model_id
            WHERE c.user_id = $1 AND c.is_active
            ORDER BY c.last_activity DESC
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ChatSummary {
                chat: row.chat.into(),
                model_name: row.model_name,
                message_count: row.message_count,
            })
            .collect())
    }

    /// All messages of a chat in chronological order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn messages(&self, chat_id: ChatId) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r"
            SELECT id, chat_id, role, content, tokens, structured_response,
                   has_features, created_at
            FROM app.messages
            WHERE chat_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(chat_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// The last `limit` messages of a chat, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent_messages(
        &self,
        chat_id: ChatId,
        limit: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r"
            SELECT * FROM (
                SELECT id, chat_id, role, content, tokens, structured_response,
                       has_features, created_at
                FROM app.messages
                WHERE chat_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) recent
            ORDER BY created_at, id
            ",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Persist one exchange: the user message (if any), the assistant reply,
    /// the chat's running totals and its title.
    ///
    /// Returns the stored assistant message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the chat does not exist.
    #[instrument(skip(self, exchange), fields(chat_id = %exchange.chat_id))]
    pub async fn record_exchange(&self, exchange: &Exchange) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some((content, tokens)) = &exchange.user_message {
            sqlx::query(
                r"
                INSERT INTO app.messages (chat_id, role, content, tokens)
                VALUES ($1, 'user', $2, $3)
                ",
            )
            .bind(exchange.chat_id)
            .bind(content)
            .bind(tokens)
            .execute(&mut *tx)
            .await?;
        }

        let reply = &exchange.reply;
        let row = sqlx::query_as::<_, MessageRow>(
            r"
            INSERT INTO app.messages
                (chat_id, role, content, tokens, structured_response, has_features)
            VALUES ($1, 'assistant', $2, $3, $4, $5)
            RETURNING id, chat_id, role, content, tokens, structured_response,
                      has_features, created_at
            ",
        )
        .bind(exchange.chat_id)
        .bind(&reply.content)
        .bind(reply.tokens)
        .bind(reply.structured_response.as_ref())
        .bind(reply.structured_response.is_some())
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r"
            UPDATE app.chats
            SET total_tokens = total_tokens + $2,
                total_cost = total_cost + $3,
                title = COALESCE(title, $4),
                last_activity = NOW()
            WHERE id = $1
            ",
        )
        .bind(exchange.chat_id)
        .bind(exchange.total_tokens)
        .bind(exchange.cost)
        .bind(exchange.title.as_deref())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(row.into())
    }

    /// Soft-delete a chat. Returns `false` if it was already inactive or missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn deactivate(&self, id: ChatId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE app.chats SET is_active = FALSE WHERE id = $1 AND is_active")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Aggregated numbers for a chat.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self, id: ChatId) -> Result<Option<ChatStats>, RepositoryError> {
        let row = sqlx::query_as::<_, ChatStatsRow>(
            r"
            SELECT c.id, c.title, c.total_tokens, c.total_cost, c.created_at, c.last_activity,
                   COUNT(m.id) AS message_count,
                   COUNT(m.id) FILTER (WHERE m.role = 'user') AS user_messages,
                   COUNT(m.id) FILTER (WHERE m.role = 'assistant') AS assistant_messages
            FROM app.chats c
            LEFT JOIN app.messages m ON m.chat_id = c.id
            WHERE c.id = $1
            GROUP BY c.id
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| ChatStats {
            chat_id: ChatId::new(r.id),
            title: r.title,
            message_count: r.message_count,
            user_messages: r.user_messages,
            assistant_messages: r.assistant_messages,
            total_tokens: r.total_tokens,
            total_cost: r.total_cost,
            created_at: r.created_at,
            last_activity: r.last_activity,
        }))
    }
}
