//! OpenRouter provider for OpenAI-compatible chat completion endpoints.
//!
//! OpenRouter exposes many hosted models behind one API. Any other
//! OpenAI-compatible endpoint works through `with_custom_url`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};

/// Default OpenRouter API endpoint.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Upper bound on a single HTTP exchange. The model client applies its own,
/// usually tighter, per-attempt timeout on top of this.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Live provider that performs one HTTP call per `generate`.
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    base_url: String,
    /// Used when a request leaves `model` empty.
    default_model: String,
}

impl OpenRouterProvider {
    /// Create a provider for the public OpenRouter endpoint.
    pub fn new(api_key: String, default_model: String) -> Result<Self, LlmError> {
        Self::with_custom_url(api_key, OPENROUTER_BASE_URL.to_string(), default_model)
    }

    /// Create a provider for any OpenAI-compatible base URL.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` for an empty key and
    /// `LlmError::Configuration` if the HTTP client cannot be built.
    pub fn with_custom_url(
        api_key: String,
        base_url: String,
        default_model: String,
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
        })
    }

    /// Get the API key (for debugging, returns masked value).
    pub fn api_key_masked(&self) -> String {
        if self.api_key.len() <= 8 {
            "*".repeat(self.api_key.len())
        } else {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn execute_request(&self, request: &ApiRequest) -> Result<GenerationResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let http_response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://content-forge.local")
            .header("X-Title", "content-forge")
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(status_error(status.as_u16(), &error_text));
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        if api_response.choices.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role,
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage: Usage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            millis: REQUEST_TIMEOUT_SECS * 1000,
        }
    } else {
        LlmError::RequestFailed(err.to_string())
    }
}

/// Maps a non-success HTTP status and body to a typed error.
fn status_error(status_code: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string());
    let lowered = message.to_lowercase();

    match status_code {
        429 => LlmError::RateLimited(message),
        400 if lowered.contains("context length") || lowered.contains("maximum context") => {
            LlmError::ContextLengthExceeded { limit: 0 }
        }
        404 if lowered.contains("model") => LlmError::InvalidModel(message),
        code => LlmError::ApiError { code, message },
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        };

        self.execute_request(&api_request).await
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenRouterProvider {
        OpenRouterProvider::new("test-api-key".to_string(), "test/model".to_string())
            .expect("provider should build")
    }

    #[test]
    fn test_openrouter_provider_new() {
        let provider = provider();
        assert_eq!(provider.base_url(), OPENROUTER_BASE_URL);
        assert_eq!(provider.default_model(), "test/model");
        assert_eq!(provider.api_key_masked(), "test...-key");
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = OpenRouterProvider::new("  ".to_string(), "m".to_string());
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_custom_url_trailing_slash() {
        let provider = OpenRouterProvider::with_custom_url(
            "test-key".to_string(),
            "https://custom.api.com/v1/".to_string(),
            "custom-model".to_string(),
        )
        .unwrap();
        assert_eq!(provider.base_url(), "https://custom.api.com/v1");
    }

    #[test]
    fn test_api_key_masked_short() {
        let provider = OpenRouterProvider::new("abc".to_string(), "m".to_string()).unwrap();
        assert_eq!(provider.api_key_masked(), "***");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(429, r#"{"error":{"message":"slow down"}}"#),
            LlmError::RateLimited(ref m) if m == "slow down"
        ));
        assert!(matches!(
            status_error(401, "unauthorized"),
            LlmError::ApiError { code: 401, .. }
        ));
        assert!(matches!(
            status_error(400, r#"{"error":{"message":"This exceeds the maximum context length"}}"#),
            LlmError::ContextLengthExceeded { .. }
        ));
        assert!(matches!(
            status_error(404, r#"{"error":{"message":"model not found"}}"#),
            LlmError::InvalidModel(_)
        ));
        assert!(matches!(
            status_error(502, "bad gateway"),
            LlmError::ApiError { code: 502, ref message } if message == "bad gateway"
        ));
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let provider = OpenRouterProvider::with_custom_url(
            "test-key".to_string(),
            "http://localhost:65535".to_string(),
            "test-model".to_string(),
        )
        .unwrap();

        let request = GenerationRequest::new("test-model", vec![Message::user("test")]);
        let err = provider.generate(request).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::RequestFailed(_) | LlmError::Timeout { .. }
        ));
    }

    #[test]
    fn test_api_request_serialization() {
        let request = ApiRequest {
            model: "test-model".to_string(),
            messages: vec![Message::user("Hello")],
            temperature: Some(0.7),
            max_tokens: Some(1000),
            top_p: None,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"test-model\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(json.contains("\"max_tokens\":1000"));
        assert!(!json.contains("top_p"));
    }

    #[test]
    fn test_api_response_tolerates_missing_usage_and_null_content() {
        let body = r#"{"id":"x","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":null},"finish_reason":"length"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.usage.total_tokens, 0);
        assert!(parsed.choices[0].message.content.is_none());
    }
}
