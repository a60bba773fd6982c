//! Chat-completions client.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::{debug, instrument};

use crate::config::LlmConfig;

use super::error::{ApiErrorResponse, LlmError};
use super::types::{ChatMessage, ChatRequest, ChatResponse, Completion};

/// Chat-completions API client.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<LlmClientInner>,
}

struct LlmClientInner {
    client: reqwest::Client,
    model: String,
    endpoint: String,
}

impl LlmClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the API key is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.expose_secret();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| LlmError::Config("API key contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(LlmClientInner {
                client,
                model: config.model.clone(),
                endpoint: completions_url(&config.base_url),
            }),
        })
    }

    /// Model ID requests are sent with.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Send the conversation and return the first completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or the provider
    /// answers with an error or an empty completion.
    #[instrument(skip(self, messages), fields(model = %self.inner.model, messages = messages.len()))]
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, LlmError> {
        let request = ChatRequest {
            model: &self.inner.model,
            messages,
            temperature: None,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Parse(format!("Failed to parse response: {e}")))?;
        let completion = Completion::try_from(parsed)?;

        debug!(
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "Completion received"
        );
        Ok(completion)
    }
}

/// Map a non-success status to an error.
async fn handle_error_status(status: reqwest::StatusCode, response: reqwest::Response) -> LlmError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return LlmError::RateLimited(retry_after);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return LlmError::Unauthorized("Invalid API key".to_string());
    }

    match response.text().await {
        Ok(body) => parse_error_body(status, &body),
        Err(e) => LlmError::Http(e),
    }
}

fn parse_error_body(status: reqwest::StatusCode, body: &str) -> LlmError {
    serde_json::from_str::<ApiErrorResponse>(body).map_or_else(
        |_| LlmError::Api {
            error_type: status.as_u16().to_string(),
            message: body.to_string(),
        },
        |api_error| LlmError::Api {
            error_type: api_error
                .error
                .error_type
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: api_error.error.message,
        },
    )
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;

    fn config(key: &str) -> LlmConfig {
        LlmConfig {
            api_key: SecretString::from(key.to_string()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_completions_url_trims_slash() {
        assert_eq!(
            completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:11434/v1"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_new_client() {
        let client = LlmClient::new(&config("sk-test-key")).expect("client");
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_new_client_rejects_bad_key() {
        assert!(matches!(
            LlmClient::new(&config("bad\nkey")),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_parse_error_body() {
        let body = r#"{"error": {"message": "bad model", "type": "invalid_request_error"}}"#;
        let err = parse_error_body(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(matches!(
            err,
            LlmError::Api { ref error_type, ref message }
                if error_type == "invalid_request_error" && message == "bad model"
        ));

        let err = parse_error_body(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            LlmError::Api { ref error_type, .. } if error_type == "502"
        ));
    }

    #[test]
    fn test_llm_client_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<LlmClient>();
    }
}
