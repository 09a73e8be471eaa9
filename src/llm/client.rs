use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use super::sse::{SseDecoder, SseEvent};
use super::types::{ChatRequest, ChatResponse, ErrorBody, StreamChunk};
use crate::config::{ApiKey, Config};
use crate::history::Turn;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("LLM API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("LLM network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("could not decode LLM response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("LLM returned no content")]
    EmptyResponse,
}

/// Answer fragments in arrival order. Dropping the stream releases the
/// upstream connection.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

/// Abstraction over a chat model.
/// Implemented by [`OpenAiClient`] for production; mock implementations used in tests.
pub trait ChatModel: Send + Sync {
    fn complete(
        &self,
        messages: &[Turn],
        max_tokens: u32,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn stream(
        &self,
        messages: &[Turn],
        max_tokens: u32,
    ) -> impl Future<Output = Result<TokenStream, LlmError>> + Send;
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<ApiKey>,
    model: String,
    timeout: Duration,
    initial_backoff_ms: u64,
}

impl OpenAiClient {
    pub fn from_config(config: &Config, http: Client) -> Self {
        Self {
            http,
            base_url: config.endpoints.openai.clone(),
            api_key: config.credentials.openai.clone(),
            model: config.model.clone(),
            timeout: config.llm_timeout,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            api_key: Some(ApiKey::new("test-key")),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
            initial_backoff_ms: 1,
        }
    }

    async fn send(
        &self,
        messages: &[Turn],
        max_tokens: u32,
        stream: bool,
    ) -> Result<Response, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
            stream,
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("User-Agent", crate::USER_AGENT)
            .json(&request)
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose());
        }
        let response = builder.send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("LLM API rate limited");
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet = &text[..text.floor_char_boundary(200)];
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("HTTP {status}: {snippet}"));
            warn!(status = %status, "LLM API error");
            return Err(LlmError::Api {
                code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn complete_once(&self, messages: &[Turn], max_tokens: u32) -> Result<String, LlmError> {
        let text = self.send(messages, max_tokens, false).await?.text().await?;
        let body: ChatResponse = serde_json::from_str(&text)?;
        if let Some(err) = body.error {
            return Err(LlmError::Api {
                code: 200,
                message: err.message.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(LlmError::EmptyResponse)
    }

    /// Equal jitter backoff: base/2 + rand(0, base/2).
    fn jittered_backoff(&self, attempt: u32) -> u64 {
        let base = self.initial_backoff_ms * 2u64.pow(attempt);
        let half = base / 2;
        half + fastrand::u64(..half.max(1))
    }
}

impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[Turn], max_tokens: u32) -> Result<String, LlmError> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.complete_once(messages, max_tokens).await {
                Ok(content) => {
                    debug!(model = %self.model, "completion finished");
                    return Ok(content);
                }
                Err(e) if is_retriable(&e) => {
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        let delay_ms = self.jittered_backoff(attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms, "retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(LlmError::RateLimited))
    }

    async fn stream(&self, messages: &[Turn], max_tokens: u32) -> Result<TokenStream, LlmError> {
        let response = self.send(messages, max_tokens, true).await?;
        debug!(model = %self.model, "answer stream opened");
        Ok(decode_deltas(response.bytes_stream()))
    }
}

fn is_retriable(e: &LlmError) -> bool {
    matches!(
        e,
        LlmError::RateLimited
            | LlmError::Api {
                code: 500..=599,
                ..
            }
    )
}

struct DeltaState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> DeltaState<S> {
    /// Queues the content of one event. Returns false once no more input
    /// should be read.
    fn accept(&mut self, event: SseEvent) -> bool {
        let data = match event {
            SseEvent::Done => return false,
            SseEvent::Data(data) => data,
        };
        match serde_json::from_str::<StreamChunk>(&data) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    self.pending.push_back(Err(LlmError::Api {
                        code: 200,
                        message: err.message.unwrap_or_else(|| "Unknown error".to_string()),
                    }));
                    return false;
                }
                let content = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta)
                    .and_then(|d| d.content)
                    .filter(|c| !c.is_empty());
                if let Some(content) = content {
                    self.pending.push_back(Ok(content));
                }
                true
            }
            Err(e) => {
                self.pending.push_back(Err(LlmError::Decode(e)));
                false
            }
        }
    }
}

/// Turns a server-sent-events body into the stream of non-empty content
/// deltas. The stream ends after `[DONE]` or the first error.
pub(crate) fn decode_deltas<S, B>(body: S) -> TokenStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DeltaState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.push(chunk.as_ref()) {
                        if !state.accept(event) {
                            state.finished = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Network(e)), state));
                }
                None => {
                    state.finished = true;
                    if let Some(event) = state.decoder.finish() {
                        state.accept(event);
                    }
                }
            }
        }
    })
    .boxed()
}
