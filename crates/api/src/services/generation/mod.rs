//! Generation service: prompt assembly, the LLM call, persistence, cost and
//! debit for one request.
//!
//! # Flow
//!
//! 1. Resolve (or create) the chat for user + model + optional session
//! 2. Lock the chat's memory, hydrating it from the database if needed
//! 3. Render the system prompt for the model kind
//! 4. Call the LLM with system prompt, memory and user input
//! 5. Parse feature-based replies leniently
//! 6. Persist the exchange, update memory, debit the user

pub mod memory;
pub mod parse;
pub mod prompt;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use reality_cheque_core::{AiModelId, ChatId, UserId};

use crate::db::RepositoryError;
use crate::db::catalog::CatalogRepository;
use crate::db::chats::{AssistantReply, ChatRepository, Exchange};
use crate::llm::{ChatMessage, Completion, LlmClient, LlmError};
use crate::models::{AiModel, Chat, ModelKind, User};
use crate::services::credits::{CreditService, check_user_credits};

pub use memory::{ConversationMemory, MEMORY_WINDOW, MemoryStore};
pub use parse::{COMPLETE_RESPONSE_KEY, parse_feature_strict, parse_structured_lenient};

/// Most inputs accepted by one batch request.
pub const MAX_BATCH_INPUTS: usize = 10;

/// Attempts at a unique session key before giving up.
const SESSION_KEY_ATTEMPTS: i64 = 3;

/// Errors from generation operations.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Invalid(String),

    #[error("Generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Regeneration failed: {0}")]
    Regeneration(String),

    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] askama::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

// =============================================================================
// Requests and responses
// =============================================================================

/// How a request points at an existing chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    /// Database chat ID.
    Chat(ChatId),
    /// Legacy `{userId}_{modelId}_{unixMillis}` session key.
    Key(String),
}

impl SessionRef {
    /// Build from the optional `chatId` / `sessionId` request fields.
    /// A chat ID wins over a session key; blank keys are ignored.
    #[must_use]
    pub fn from_parts(chat_id: Option<ChatId>, session_id: Option<&str>) -> Option<Self> {
        if let Some(id) = chat_id {
            return Some(Self::Chat(id));
        }
        session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::Key(s.to_string()))
    }
}

/// Fields shared by both kinds of generation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMeta {
    pub chat_id: ChatId,
    pub session_id: String,
    pub model_name: String,
    pub cost: Decimal,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub has_features: bool,
    pub remaining_credits: Decimal,
}

/// Result of one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOutput {
    #[serde(rename_all = "camelCase")]
    FeatureBased {
        #[serde(flatten)]
        meta: GenerationMeta,
        structured_response: Map<String, Value>,
        features: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    MasterPrompt {
        #[serde(flatten)]
        meta: GenerationMeta,
        response: String,
    },
}

impl GenerationOutput {
    /// Shared fields.
    #[must_use]
    pub const fn meta(&self) -> &GenerationMeta {
        match self {
            Self::FeatureBased { meta, .. } | Self::MasterPrompt { meta, .. } => meta,
        }
    }
}

/// Input for [`GenerationService::regenerate_feature`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    pub model_id: AiModelId,
    pub feature_name: String,
    #[serde(default)]
    pub user_feedback: String,
    pub current_response: Map<String, Value>,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
}

/// Result of regenerating one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationOutput {
    pub feature_name: String,
    pub content: Value,
    pub structured_response: Map<String, Value>,
    pub cost: Decimal,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub remaining_credits: Decimal,
}

/// Result of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutput {
    pub results: Vec<GenerationOutput>,
    pub total_cost: Decimal,
    /// Set when credits ran out before every input was processed.
    pub stopped_early: bool,
}

// =============================================================================
// Service
// =============================================================================

/// Generation service.
pub struct GenerationService<'a> {
    pool: &'a PgPool,
    llm: &'a LlmClient,
    memory: &'a MemoryStore,
}

impl<'a> GenerationService<'a> {
    /// Create a new generation service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, llm: &'a LlmClient, memory: &'a MemoryStore) -> Self {
        Self { pool, llm, memory }
    }

    /// Generate a reply from `model_id` to `input` and charge the user.
    ///
    /// A `session` that does not match an active chat of this user and model
    /// starts a new chat.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::NotFound` if the model or user is missing and
    /// `GenerationError::Llm` if the provider call fails. Nothing is persisted
    /// or charged on failure.
    #[instrument(skip(self, input, session), fields(model_id = %model_id, user_id = %user_id))]
    pub async fn generate(
        &self,
        model_id: AiModelId,
        user_id: UserId,
        input: &str,
        session: Option<&SessionRef>,
    ) -> Result<GenerationOutput, GenerationError> {
        let model = self.load_model(model_id).await?;
        let user = self.load_user(user_id).await?;
        let chat = self.resolve_chat(user_id, &model, session).await?;
        let chats = ChatRepository::new(self.pool);

        let mut memory = self.memory.lock(chat.id).await;
        if !memory.is_hydrated() {
            let recent = chats
                .recent_messages(chat.id, i64::try_from(MEMORY_WINDOW).unwrap_or(i64::MAX))
                .await?;
            memory.hydrate(&recent);
        }

        let system = match model.kind() {
            ModelKind::FeatureBased => prompt::feature_prompt(&model, &user)?,
            ModelKind::MasterPrompt => prompt::master_prompt(&model, &user)?,
        };
        let input = input.trim();
        let llm_input = if input.is_empty() {
            prompt::GENERIC_INPUT
        } else {
            input
        };

        let messages = build_messages(system, &memory, llm_input);
        let completion = self.llm.complete(&messages).await?;
        let cost = model.rates().cost(
            completion.usage.prompt_tokens,
            completion.usage.completion_tokens,
        );

        let structured = (model.kind() == ModelKind::FeatureBased)
            .then(|| parse_structured_lenient(&completion.text));

        chats
            .record_exchange(&Exchange {
                chat_id: chat.id,
                user_message: (!input.is_empty())
                    .then(|| (input.to_string(), token_count(completion.usage.prompt_tokens))),
                reply: AssistantReply {
                    content: completion.text.clone(),
                    tokens: token_count(completion.usage.completion_tokens),
                    structured_response: structured.clone().map(Value::Object),
                },
                total_tokens: i64::from(completion.usage.total()),
                cost,
                title: chat
                    .title
                    .is_none()
                    .then(|| Chat::title_from(input, &model.name)),
            })
            .await?;

        if !input.is_empty() {
            memory.push(ChatMessage::user(input));
        }
        memory.push(ChatMessage::assistant(completion.text.clone()));
        drop(memory);

        let debit = CreditService::new(self.pool).debit(user_id, cost).await?;
        info!(chat_id = %chat.id, cost = %cost, tokens = completion.usage.total(), "Generation complete");

        Ok(build_output(&model, &chat, &completion, structured, cost, debit.remaining))
    }

    /// Rewrite one feature of an existing structured response.
    ///
    /// The reply is parsed strictly: it must be a JSON object containing the
    /// feature. When `chat_id` is given the updated response is stored on
    /// that chat, which must belong to the user.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Invalid` if the model is not feature-based
    /// or lacks the feature, `GenerationError::NotFound` for a missing model,
    /// user or chat, and `GenerationError::Regeneration` if the reply cannot
    /// be used.
    #[instrument(skip(self, request), fields(model_id = %request.model_id, feature = %request.feature_name))]
    pub async fn regenerate_feature(
        &self,
        user_id: UserId,
        request: &RegenerateRequest,
    ) -> Result<RegenerationOutput, GenerationError> {
        let model = self.load_model(request.model_id).await?;
        if model.kind() != ModelKind::FeatureBased {
            return Err(GenerationError::Invalid(
                "Model is not feature-based".to_string(),
            ));
        }
        let feature = model.feature(&request.feature_name).ok_or_else(|| {
            GenerationError::Invalid(format!(
                "Feature '{}' is not part of this model",
                request.feature_name
            ))
        })?;
        self.load_user(user_id).await?;

        let chats = ChatRepository::new(self.pool);
        let chat = match request.chat_id {
            Some(id) => Some(
                chats
                    .get(id)
                    .await?
                    .filter(|c| c.is_active && c.is_owned_by(user_id))
                    .ok_or(GenerationError::NotFound("Chat"))?,
            ),
            None => None,
        };

        let current = Value::Object(request.current_response.clone());
        let system = prompt::regenerate_prompt(&model, feature, &current, &request.user_feedback)?;
        let messages = [
            ChatMessage::system(system),
            ChatMessage::user(format!("Rewrite the \"{}\" section now.", feature.name)),
        ];

        let completion = self.llm.complete(&messages).await?;
        let content = parse_feature_strict(&completion.text, &feature.name).ok_or_else(|| {
            GenerationError::Regeneration(format!(
                "model reply did not contain the \"{}\" section",
                feature.name
            ))
        })?;

        let mut updated = request.current_response.clone();
        updated.insert(feature.name.clone(), content.clone());

        let cost = model.rates().cost(
            completion.usage.prompt_tokens,
            completion.usage.completion_tokens,
        );

        if let Some(chat) = &chat {
            let serialized = Value::Object(updated.clone()).to_string();
            let mut memory = self.memory.lock(chat.id).await;
            chats
                .record_exchange(&Exchange {
                    chat_id: chat.id,
                    user_message: None,
                    reply: AssistantReply {
                        content: serialized.clone(),
                        tokens: token_count(completion.usage.completion_tokens),
                        structured_response: Some(Value::Object(updated.clone())),
                    },
                    total_tokens: i64::from(completion.usage.total()),
                    cost,
                    title: None,
                })
                .await?;
            if memory.is_hydrated() {
                memory.push(ChatMessage::assistant(serialized));
            }
        }

        let debit = CreditService::new(self.pool).debit(user_id, cost).await?;

        Ok(RegenerationOutput {
            feature_name: feature.name.clone(),
            content,
            structured_response: updated,
            cost,
            input_tokens: completion.usage.prompt_tokens,
            output_tokens: completion.usage.completion_tokens,
            total_tokens: completion.usage.total(),
            remaining_credits: debit.remaining,
        })
    }

    /// Run several inputs in order on one chat, charging after each and
    /// stopping once the user is out of credits.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Invalid` for an empty or oversized batch and
    /// any error of [`Self::generate`] for the failing item.
    #[instrument(skip(self, inputs, session), fields(model_id = %model_id, count = inputs.len()))]
    pub async fn batch_generate(
        &self,
        model_id: AiModelId,
        user_id: UserId,
        inputs: &[String],
        session: Option<&SessionRef>,
    ) -> Result<BatchOutput, GenerationError> {
        validate_batch(inputs)?;

        let mut results: Vec<GenerationOutput> = Vec::with_capacity(inputs.len());
        let mut total_cost = Decimal::ZERO;
        let mut session = session.cloned();
        let mut stopped_early = false;

        for (index, input) in inputs.iter().enumerate() {
            if index > 0 && !check_user_credits(&self.load_user(user_id).await?) {
                warn!(processed = index, "Batch stopped: insufficient credits");
                stopped_early = true;
                break;
            }

            let output = self
                .generate(model_id, user_id, input, session.as_ref())
                .await?;
            total_cost += output.meta().cost;
            session = Some(SessionRef::Chat(output.meta().chat_id));
            results.push(output);
        }

        Ok(BatchOutput {
            results,
            total_cost,
            stopped_early,
        })
    }

    async fn load_model(&self, id: AiModelId) -> Result<AiModel, GenerationError> {
        CatalogRepository::new(self.pool)
            .get_model(id, true)
            .await?
            .ok_or(GenerationError::NotFound("Model"))
    }

    async fn load_user(&self, id: UserId) -> Result<User, GenerationError> {
        crate::db::UserRepository::new(self.pool)
            .get_by_id(id)
            .await?
            .ok_or(GenerationError::NotFound("User"))
    }

    /// Find the chat a request continues, or start a new one.
    async fn resolve_chat(
        &self,
        user_id: UserId,
        model: &AiModel,
        session: Option<&SessionRef>,
    ) -> Result<Chat, GenerationError> {
        let chats = ChatRepository::new(self.pool);

        let existing = match session {
            Some(SessionRef::Chat(id)) => chats.find_active(*id, user_id, model.id).await?,
            Some(SessionRef::Key(key)) => {
                chats
                    .find_active_by_session_key(key, user_id, model.id)
                    .await?
            }
            None => None,
        };
        if let Some(chat) = existing {
            return Ok(chat);
        }

        let now = Utc::now();
        let mut attempt = 0;
        loop {
            let key = Chat::session_key_for(user_id, model.id, now + Duration::milliseconds(attempt));
            match chats.create(user_id, model.id, &key).await {
                Ok(chat) => return Ok(chat),
                Err(RepositoryError::Conflict(_)) if attempt + 1 < SESSION_KEY_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// System prompt, then the remembered conversation, then the new input.
fn build_messages(system: String, memory: &ConversationMemory, input: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(memory.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(memory.messages().cloned());
    messages.push(ChatMessage::user(input));
    messages
}

fn build_output(
    model: &AiModel,
    chat: &Chat,
    completion: &Completion,
    structured: Option<Map<String, Value>>,
    cost: Decimal,
    remaining_credits: Decimal,
) -> GenerationOutput {
    let meta = GenerationMeta {
        chat_id: chat.id,
        session_id: chat.session_key.clone(),
        model_name: model.name.clone(),
        cost,
        input_tokens: completion.usage.prompt_tokens,
        output_tokens: completion.usage.completion_tokens,
        total_tokens: completion.usage.total(),
        has_features: structured.is_some(),
        remaining_credits,
    };

    match structured {
        Some(structured_response) => GenerationOutput::FeatureBased {
            meta,
            structured_response,
            features: model.feature_names(),
        },
        None => GenerationOutput::MasterPrompt {
            meta,
            response: completion.text.clone(),
        },
    }
}

fn validate_batch(inputs: &[String]) -> Result<(), GenerationError> {
    if inputs.is_empty() {
        return Err(GenerationError::Invalid(
            "At least one input is required".to_string(),
        ));
    }
    if inputs.len() > MAX_BATCH_INPUTS {
        return Err(GenerationError::Invalid(format!(
            "At most {MAX_BATCH_INPUTS} inputs per batch"
        )));
    }
    Ok(())
}

fn token_count(tokens: u32) -> i32 {
    i32::try_from(tokens).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use reality_cheque_core::AiModelId;

    use super::*;
    use crate::llm::{Role, Usage};
    use crate::models::catalog::tests::{feature, model};

    fn completion(text: &str, input: u32, output: u32) -> Completion {
        Completion {
            text: text.to_string(),
            usage: Usage {
                prompt_tokens: input,
                completion_tokens: output,
            },
        }
    }

    fn chat() -> Chat {
        Chat {
            id: ChatId::new(11),
            user_id: Some(UserId::new(7)),
            ai_model_id: AiModelId::new(1),
            session_key: "7_1_1700000000000".to_string(),
            title: None,
            is_active: true,
            total_tokens: 0,
            total_cost: Decimal::ZERO,
            last_activity: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_ref_prefers_chat_id() {
        assert_eq!(
            SessionRef::from_parts(Some(ChatId::new(3)), Some("7_1_1")),
            Some(SessionRef::Chat(ChatId::new(3)))
        );
        assert_eq!(
            SessionRef::from_parts(None, Some(" 7_1_1 ")),
            Some(SessionRef::Key("7_1_1".to_string()))
        );
        assert_eq!(SessionRef::from_parts(None, Some("  ")), None);
        assert_eq!(SessionRef::from_parts(None, None), None);
    }

    #[test]
    fn test_build_messages_order() {
        let mut memory = ConversationMemory::default();
        memory.push(ChatMessage::user("earlier question"));
        memory.push(ChatMessage::assistant("earlier answer"));

        let messages = build_messages("system".to_string(), &memory, "new question");
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("new question"));
    }

    #[test]
    fn test_feature_output_keys_match_features() {
        let m = model(vec![feature(1, "Headline", 1), feature(2, "CTA", 2)], None);
        let reply = completion(
            r#"Sure: {"Headline": "Stop guessing your prices", "CTA": "Book a call"}"#,
            1000,
            500,
        );
        let structured = Some(parse_structured_lenient(&reply.text));
        let cost = m.rates().cost(1000, 500);

        let output = build_output(&m, &chat(), &reply, structured, cost, Decimal::ONE);
        let GenerationOutput::FeatureBased {
            meta,
            structured_response,
            features,
        } = &output
        else {
            panic!("expected feature-based output");
        };
        assert!(meta.has_features);
        assert_eq!(features, &vec!["Headline".to_string(), "CTA".to_string()]);
        let keys: std::collections::BTreeSet<&str> =
            structured_response.keys().map(String::as_str).collect();
        assert_eq!(keys, std::collections::BTreeSet::from(["CTA", "Headline"]));
        // 1000/1000 * 0.005 + 500/1000 * 0.015
        assert_eq!(meta.cost, Decimal::new(125, 4));
        assert_eq!(meta.total_tokens, 1500);
    }

    #[test]
    fn test_master_output_is_plain_text() {
        let m = model(Vec::new(), Some("Be blunt."));
        let reply = completion("Your pricing is too low.", 10, 5);
        let output = build_output(&m, &chat(), &reply, None, Decimal::ZERO, Decimal::ONE);

        assert!(!output.meta().has_features);
        let json = serde_json::to_value(&output).expect("serialize");
        assert_eq!(json["kind"], "master_prompt");
        assert_eq!(json["response"], "Your pricing is too low.");
        assert_eq!(json["sessionId"], "7_1_1700000000000");
        assert_eq!(json["chatId"], 11);
    }

    #[test]
    fn test_feature_output_serialization() {
        let m = model(vec![feature(1, "Headline", 1)], None);
        let reply = completion("not json at all", 1, 1);
        let structured = Some(parse_structured_lenient(&reply.text));
        let output = build_output(&m, &chat(), &reply, structured, Decimal::ZERO, Decimal::ONE);

        let json = serde_json::to_value(&output).expect("serialize");
        assert_eq!(json["kind"], "feature_based");
        assert_eq!(json["hasFeatures"], true);
        assert_eq!(
            json["structuredResponse"][COMPLETE_RESPONSE_KEY],
            "not json at all"
        );
    }

    #[test]
    fn test_validate_batch_bounds() {
        assert!(validate_batch(&[]).is_err());
        assert!(validate_batch(&["one".to_string()]).is_ok());
        let eleven: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert!(matches!(
            validate_batch(&eleven),
            Err(GenerationError::Invalid(_))
        ));
    }

    #[test]
    fn test_llm_error_message() {
        let err = GenerationError::from(LlmError::RateLimited(5));
        assert_eq!(
            err.to_string(),
            "Generation failed: rate limited, retry after 5 seconds"
        );
    }

    #[test]
    fn test_regenerate_request_deserializes() {
        let json = r#"{
            "modelId": 2,
            "featureName": "Headline",
            "currentResponse": {"Headline": "Old", "Body": "Keep"},
            "chatId": 5
        }"#;
        let request: RegenerateRequest = serde_json::from_str(json).expect("deserialize");
        assert_eq!(request.model_id, AiModelId::new(2));
        assert_eq!(request.user_feedback, "");
        assert_eq!(request.chat_id, Some(ChatId::new(5)));
    }

    #[test]
    fn test_token_count_saturates() {
        assert_eq!(token_count(12), 12);
        assert_eq!(token_count(u32::MAX), i32::MAX);
    }
}
