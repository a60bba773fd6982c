//! Generation routes: generate, regenerate, batch, chat history and credits.
//!
//! Legacy session routes authorize by a plain string prefix: the session key
//! must start with the user's id. Chat routes authorize by database
//! ownership.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use reality_cheque_core::{AiModelId, ChatId, UserId};

use super::{ApiResponse, MessageResponse, message, ok};
use crate::db::ChatRepository;
use crate::error::AppError;
use crate::middleware::{RequireCredits, RequireUser};
use crate::models::{Chat, ChatStats, ChatSummary, Message};
use crate::services::catalog::ModelDetail;
use crate::services::credits::CreditBalance;
use crate::services::generation::{
    BatchOutput, GenerationOutput, RegenerateRequest, RegenerationOutput, SessionRef,
};
use crate::services::{CatalogService, GenerationService};
use crate::state::AppState;

/// Build the generation router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/batch-generate", post(batch_generate))
        .route("/regenerate-feature", post(regenerate_feature))
        .route("/credits", get(credits))
        .route("/model/{model_id}", get(model_info))
        .route("/chats", get(list_chats))
        .route("/session/{session_id}", delete(delete_session))
        .route("/session/{session_id}/history", get(session_history))
        .route("/chat/{chat_id}", delete(delete_chat))
        .route("/chat/{chat_id}/history", get(chat_history))
        .route("/chat/{chat_id}/stats", get(chat_stats))
}

/// Generation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub model_id: AiModelId,
    #[serde(default, alias = "userInput")]
    pub input: String,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Batch generation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub model_id: AiModelId,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A chat with its messages, oldest first.
#[derive(Debug, Serialize)]
pub struct ChatHistory {
    pub chat: Chat,
    pub messages: Vec<Message>,
}

/// Whether a legacy session key is accepted for `user_id`.
///
/// Keys are `{userId}_{modelId}_{unixMillis}`. Only the prefix is compared,
/// so user 1 also passes for keys of users 10-19, 100-199 and so on.
#[must_use]
pub fn session_belongs_to(session_id: &str, user_id: UserId) -> bool {
    session_id.starts_with(&user_id.to_string())
}

async fn generate(
    State(state): State<AppState>,
    RequireCredits(user): RequireCredits,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<GenerationOutput>>, AppError> {
    let session = SessionRef::from_parts(body.chat_id, body.session_id.as_deref());
    let output = GenerationService::new(state.pool(), state.llm(), state.memory())
        .generate(body.model_id, user.id, &body.input, session.as_ref())
        .await?;
    Ok(ok(output))
}

async fn batch_generate(
    State(state): State<AppState>,
    RequireCredits(user): RequireCredits,
    Json(body): Json<BatchRequest>,
) -> Result<Json<ApiResponse<BatchOutput>>, AppError> {
    let session = SessionRef::from_parts(body.chat_id, body.session_id.as_deref());
    let output = GenerationService::new(state.pool(), state.llm(), state.memory())
        .batch_generate(body.model_id, user.id, &body.inputs, session.as_ref())
        .await?;
    Ok(ok(output))
}

async fn regenerate_feature(
    State(state): State<AppState>,
    RequireCredits(user): RequireCredits,
    Json(body): Json<RegenerateRequest>,
) -> Result<Json<ApiResponse<RegenerationOutput>>, AppError> {
    let output = GenerationService::new(state.pool(), state.llm(), state.memory())
        .regenerate_feature(user.id, &body)
        .await?;
    Ok(ok(output))
}

async fn credits(RequireUser(user): RequireUser) -> Json<ApiResponse<CreditBalance>> {
    ok(CreditBalance::from(&user))
}

async fn model_info(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
    Path(model_id): Path<i32>,
) -> Result<Json<ApiResponse<ModelDetail>>, AppError> {
    let model = CatalogService::new(state.pool())
        .get_model(AiModelId::new(model_id))
        .await?;
    Ok(ok(model))
}

async fn list_chats(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<ApiResponse<Vec<ChatSummary>>>, AppError> {
    let chats = ChatRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(ok(chats))
}

/// Load an active chat by legacy session key after the prefix check.
async fn session_chat(state: &AppState, session_id: &str, user_id: UserId) -> Result<Chat, AppError> {
    if !session_belongs_to(session_id, user_id) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    ChatRepository::new(state.pool())
        .get_by_session_key(session_id)
        .await?
        .filter(|chat| chat.is_active)
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

/// Load an active chat owned by `user_id`.
async fn owned_chat(state: &AppState, chat_id: ChatId, user_id: UserId) -> Result<Chat, AppError> {
    let chat = ChatRepository::new(state.pool())
        .get(chat_id)
        .await?
        .filter(|chat| chat.is_active)
        .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))?;
    if !chat.is_owned_by(user_id) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(chat)
}

async fn history(state: &AppState, chat: Chat) -> Result<Json<ApiResponse<ChatHistory>>, AppError> {
    let messages = ChatRepository::new(state.pool()).messages(chat.id).await?;
    Ok(ok(ChatHistory { chat, messages }))
}

async fn session_history(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<ChatHistory>>, AppError> {
    let chat = session_chat(&state, &session_id, user.id).await?;
    history(&state, chat).await
}

async fn chat_history(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(chat_id): Path<i32>,
) -> Result<Json<ApiResponse<ChatHistory>>, AppError> {
    let chat = owned_chat(&state, ChatId::new(chat_id), user.id).await?;
    history(&state, chat).await
}

/// Deactivate a chat and drop its memory.
async fn close_chat(state: &AppState, chat: &Chat) -> Result<Json<MessageResponse>, AppError> {
    ChatRepository::new(state.pool()).deactivate(chat.id).await?;
    state.memory().evict(chat.id).await;
    tracing::info!(chat_id = %chat.id, "Chat closed");
    Ok(message("Chat deleted"))
}

async fn delete_session(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let chat = session_chat(&state, &session_id, user.id).await?;
    close_chat(&state, &chat).await
}

async fn delete_chat(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(chat_id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    let chat = owned_chat(&state, ChatId::new(chat_id), user.id).await?;
    close_chat(&state, &chat).await
}

async fn chat_stats(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(chat_id): Path<i32>,
) -> Result<Json<ApiResponse<ChatStats>>, AppError> {
    let chat = owned_chat(&state, ChatId::new(chat_id), user.id).await?;
    let stats = ChatRepository::new(state.pool())
        .stats(chat.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".to_string()))?;
    Ok(ok(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_prefix_check() {
        let user = UserId::new(12);
        assert!(session_belongs_to("12_3_1700000000000", user));
        assert!(!session_belongs_to("1_3_1700000000000", user));
        assert!(!session_belongs_to("", user));
        // Prefix comparison only
        assert!(session_belongs_to("123_3_1700000000000", user));
    }

    #[test]
    fn test_generate_request_accepts_legacy_field() {
        let body: GenerateRequest =
            serde_json::from_str(r#"{"modelId": 4, "userInput": "Write my pitch", "sessionId": "7_4_1"}"#)
                .expect("deserialize");
        assert_eq!(body.input, "Write my pitch");
        assert_eq!(body.session_id.as_deref(), Some("7_4_1"));
        assert!(body.chat_id.is_none());
    }

    #[test]
    fn test_generate_request_input_optional() {
        let body: GenerateRequest =
            serde_json::from_str(r#"{"modelId": 4, "chatId": 9}"#).expect("deserialize");
        assert_eq!(body.input, "");
        assert_eq!(body.chat_id, Some(ChatId::new(9)));
    }
}
