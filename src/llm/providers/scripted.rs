//! Deterministic provider that replays scripted replies.
//!
//! Used for tests and for `--dry-run`, where every request is answered with
//! the sample instance of the schema named in the prompt.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use crate::schema::SchemaRegistry;

/// One scripted outcome of a `generate` call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text {
        content: String,
        finish_reason: String,
    },
    Error(LlmError),
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptedReply::Text {
            content: content.into(),
            finish_reason: "stop".to_string(),
        }
    }

    /// A reply cut off by the token limit.
    pub fn truncated(content: impl Into<String>) -> Self {
        ScriptedReply::Text {
            content: content.into(),
            finish_reason: "length".to_string(),
        }
    }

    pub fn error(err: LlmError) -> Self {
        ScriptedReply::Error(err)
    }
}

type Responder = Box<dyn Fn(&GenerationRequest) -> ScriptedReply + Send + Sync>;

enum Script {
    /// Replies in order; the last one repeats once the queue is drained.
    Queue {
        pending: VecDeque<ScriptedReply>,
        last: Option<ScriptedReply>,
    },
    Responder(Responder),
}

/// Provider that never touches the network.
pub struct ScriptedProvider {
    script: Mutex<Script>,
    latency: Duration,
    call_count: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    /// Replays `replies` in order, repeating the last one.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self::from_script(Script::Queue {
            pending: replies.into(),
            last: None,
        })
    }

    /// Answers every request with the same reply.
    pub fn always(reply: ScriptedReply) -> Self {
        Self::new(vec![reply])
    }

    /// Computes each reply from the request.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> ScriptedReply + Send + Sync + 'static,
    {
        Self::from_script(Script::Responder(Box::new(responder)))
    }

    /// Answers each request with the sample instance of the schema whose
    /// reference (`name@version`) appears in the user prompt.
    pub fn dry_run(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_responder(move |request| {
            let prompt = request
                .messages
                .iter()
                .filter(|m| m.role == "user")
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            registry
                .kinds()
                .into_iter()
                .filter_map(|kind| registry.get(kind).ok())
                .find(|schema| prompt.contains(&format!("`{}`", schema.schema_ref())))
                .map(|schema| ScriptedReply::text(schema.sample_instance().to_string()))
                .unwrap_or_else(|| {
                    ScriptedReply::error(LlmError::ApiError {
                        code: 400,
                        message: "dry run: prompt names no registered schema".to_string(),
                    })
                })
        })
    }

    fn from_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            latency: Duration::ZERO,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Delays every reply, to exercise timeouts and cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `generate` calls received so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .clone()
    }

    fn next_reply(&self, request: &GenerationRequest) -> ScriptedReply {
        let mut script = self.script.lock().expect("script lock poisoned");
        match &mut *script {
            Script::Queue { pending, last } => {
                if let Some(reply) = pending.pop_front() {
                    *last = Some(reply.clone());
                    reply
                } else {
                    last.clone().unwrap_or_else(|| ScriptedReply::Error(LlmError::EmptyResponse))
                }
            }
            Script::Responder(responder) => responder(request),
        }
    }
}

fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .expect("requests lock poisoned")
            .push(request.clone());
        let reply = self.next_reply(&request);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            ScriptedReply::Error(err) => Err(err),
            ScriptedReply::Text {
                content,
                finish_reason,
            } => {
                let prompt_tokens = request
                    .messages
                    .iter()
                    .map(|m| estimate_tokens(&m.content))
                    .sum::<u32>();
                let completion_tokens = estimate_tokens(&content);
                Ok(GenerationResponse {
                    id: format!("scripted-{}", call),
                    model: request.model,
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant(content),
                        finish_reason,
                    }],
                    usage: Usage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    },
                })
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("m", vec![Message::user("hello there")])
    }

    #[tokio::test]
    async fn test_replays_in_order_then_repeats_last() {
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::error(LlmError::RateLimited("busy".to_string())),
            ScriptedReply::text("first"),
            ScriptedReply::text("second"),
        ]);

        assert!(provider.generate(request()).await.is_err());
        let a = provider.generate(request()).await.unwrap();
        let b = provider.generate(request()).await.unwrap();
        let c = provider.generate(request()).await.unwrap();
        assert_eq!(a.first_content(), Some("first"));
        assert_eq!(b.first_content(), Some("second"));
        assert_eq!(c.first_content(), Some("second"));
        assert_eq!(provider.call_count(), 4);
        assert_eq!(provider.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_usage_is_estimated() {
        let provider = ScriptedProvider::always(ScriptedReply::text("12345678"));
        let response = provider.generate(request()).await.unwrap();
        assert_eq!(response.usage.completion_tokens, 2);
        assert_eq!(response.usage.prompt_tokens, 3);
        assert_eq!(response.usage.total_tokens, 5);
        assert_eq!(response.model, "m");
    }

    #[tokio::test]
    async fn test_truncated_reply_reports_length() {
        let provider = ScriptedProvider::always(ScriptedReply::truncated("{\"a\":"));
        let response = provider.generate(request()).await.unwrap();
        assert_eq!(response.choices[0].finish_reason, "length");
    }

    #[tokio::test]
    async fn test_empty_script_is_empty_response() {
        let provider = ScriptedProvider::new(Vec::new());
        let err = provider.generate(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_dry_run_answers_with_sample_instance() {
        let registry = Arc::new(SchemaRegistry::builtin().unwrap());
        let schema = registry
            .get(crate::schema::TaskKind::InterestDiscovery)
            .unwrap()
            .clone();
        let provider = ScriptedProvider::dry_run(registry);
        let prompt = format!("conforming to schema `{}`", schema.schema_ref());
        let response = provider
            .generate(GenerationRequest::new("m", vec![Message::user(prompt)]))
            .await
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(response.first_content().unwrap()).unwrap();
        assert_eq!(value, schema.sample_instance());

        let err = provider.generate(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { code: 400, .. }));
    }
}
