//! The per-query pipeline: rewrite, search, prompt assembly, streamed
//! answer and related questions.

mod emitter;
mod related;
mod session;

use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::history::{Conversation, Thread, TokenBudget, Turn};
use crate::llm::{ChatModel, LlmError};
use crate::prompt::{Language, PromptError, PromptKind, PromptManager};
use crate::search::{SearchError, SearchResult, WebSearch};

pub use emitter::{EmitError, LLM_SEPARATOR, RELATED_SEPARATOR, StreamingEmitter};
use related::parse_related_questions;
use session::{SessionStore, SharedConversation};

pub const REWRITE_MAX_TOKENS: u32 = 512;
pub const RELATED_MAX_TOKENS: u32 = 512;
pub const ANSWER_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub search_uuid: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_true")]
    pub generate_related_questions: bool,
}

fn default_true() -> bool {
    true
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_uuid: None,
            session_id: None,
            generate_related_questions: true,
        }
    }

    /// Explicit session id, else the search uuid. `None` means the query
    /// runs against a throwaway conversation.
    pub fn session_key(&self) -> Option<&str> {
        [&self.session_id, &self.search_uuid]
            .into_iter()
            .flatten()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
    }

    /// Id for log correlation: the search uuid when given, else a fresh one.
    pub fn correlation_id(&self) -> String {
        self.search_uuid
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Failures before any byte of the response is written.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Failures once the response body has started.
#[derive(Debug, thiserror::Error)]
enum StreamError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("answer generation timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub token_budget: TokenBudget,
    pub llm_timeout: Duration,
    pub enable_related_questions: bool,
    pub enable_rewrite_question: bool,
    pub enable_history: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token_budget: config.token_budget,
            llm_timeout: config.llm_timeout,
            enable_related_questions: config.enable_related_questions,
            enable_rewrite_question: config.enable_rewrite_question,
            enable_history: config.enable_history,
        }
    }
}

/// A query that passed every pre-stream step. Owns its session lock until
/// the answer stream is finished or dropped.
pub struct PreparedQuery {
    session: OwnedMutexGuard<Conversation>,
    query: String,
    language: Language,
    contexts: Vec<SearchResult>,
    messages: Vec<Turn>,
    generate_related: bool,
}

impl PreparedQuery {
    #[cfg(test)]
    pub fn messages(&self) -> &[Turn] {
        &self.messages
    }
}

pub struct QueryOrchestrator<S, M> {
    search: S,
    llm: M,
    prompts: PromptManager,
    sessions: SessionStore,
    settings: PipelineSettings,
}

impl<S: WebSearch, M: ChatModel> QueryOrchestrator<S, M> {
    pub fn new(search: S, llm: M, prompts: PromptManager, settings: PipelineSettings) -> Self {
        Self {
            search,
            llm,
            prompts,
            sessions: SessionStore::default(),
            settings,
        }
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Runs every step that must succeed before the response starts:
    /// optional rewrite, search and prompt assembly.
    pub async fn prepare(&self, request: QueryRequest) -> Result<PreparedQuery, QueryError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let language = self.prompts.detect_language(query);
        let conversation = match request.session_key() {
            Some(key) => {
                info!(session = key, ?language, "query received");
                self.sessions.session(key)
            }
            None => {
                info!(?language, "query received without a session");
                SharedConversation::default()
            }
        };

        let mut session = conversation.lock_owned().await;
        if !self.settings.enable_history {
            session.reset();
        }

        let mut search_text = query.to_string();
        if self.settings.enable_rewrite_question {
            if session.rewrite.is_empty() {
                let system = self
                    .prompts
                    .get_prompt(PromptKind::RewriteSystem, language, &[])?;
                session.rewrite.append(Turn::system(system));
            }
            if let Some(rewritten) = self.rewrite(&mut session.rewrite, query, language).await {
                debug!(original = query, rewritten = %rewritten, "searching with rewritten query");
                search_text = rewritten;
            }
        }

        let contexts = self.search.search(&search_text).await?;

        if session.answer.is_empty() {
            let system = self
                .prompts
                .get_prompt(PromptKind::RagSystem, language, &[])?;
            session.answer.append(Turn::system(system));
        }
        session.answer.reduce(&self.settings.token_budget);

        let context = citation_context(&contexts);
        let current_date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let prompt = self.prompts.get_prompt(
            PromptKind::RagQa,
            language,
            &[("context", &context), ("current_date", &current_date)],
        )?;
        let messages = session
            .answer
            .with_pending(Turn::user(format!("{prompt}\n\n{query}")));

        Ok(PreparedQuery {
            session,
            query: query.to_string(),
            language,
            contexts,
            messages,
            generate_related: request.generate_related_questions,
        })
    }

    /// Writes the response body. Failures after the first segment become an
    /// inline error fragment; a disconnected caller stops generation.
    pub async fn stream_answer(&self, mut prepared: PreparedQuery, mut emitter: StreamingEmitter) {
        match self.drive(&mut prepared, &mut emitter).await {
            Ok(()) => debug!("answer stream complete"),
            Err(StreamError::Emit(EmitError::Disconnected)) => {
                info!("client disconnected, answer generation stopped");
            }
            Err(e) => {
                warn!(error = %e, "answer stream failed");
                if emitter.error(&e).await.is_err() {
                    debug!("client gone before the error could be reported");
                }
            }
        }
    }

    async fn drive(
        &self,
        prepared: &mut PreparedQuery,
        emitter: &mut StreamingEmitter,
    ) -> Result<(), StreamError> {
        emitter.contexts(&prepared.contexts).await?;
        emitter.begin_answer().await?;

        let timeout = self.settings.llm_timeout;
        let deadline = Instant::now() + timeout;
        let mut tokens =
            tokio::time::timeout_at(deadline, self.llm.stream(&prepared.messages, ANSWER_MAX_TOKENS))
                .await
                .map_err(|_| StreamError::TimedOut(timeout))??;

        let mut answer = String::new();
        while let Some(token) = tokio::time::timeout_at(deadline, tokens.next())
            .await
            .map_err(|_| StreamError::TimedOut(timeout))?
        {
            let token = token?;
            debug!(delta = %token, "answer delta");
            answer.push_str(&token);
            emitter.token(token).await?;
        }
        drop(tokens);

        if !answer.is_empty() {
            let thread = &mut prepared.session.answer;
            thread.append(Turn::user(prepared.query.clone()));
            thread.append(Turn::assistant(answer));
        }

        if self.settings.enable_related_questions && prepared.generate_related {
            let questions = self.related_questions(prepared).await;
            emitter.related(&questions).await?;
        }
        Ok(())
    }

    /// The rewritten search text, or `None` to search with `query` as is.
    async fn rewrite(&self, thread: &mut Thread, query: &str, language: Language) -> Option<String> {
        match self.try_rewrite(thread, query, language).await {
            Ok(rewritten) if !rewritten.is_empty() && rewritten != query => Some(rewritten),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "question rewrite failed, searching with the original query");
                None
            }
        }
    }

    async fn try_rewrite(
        &self,
        thread: &mut Thread,
        query: &str,
        language: Language,
    ) -> Result<String, QueryError> {
        let qa = self.prompts.get_prompt(PromptKind::RewriteQa, language, &[])?;
        let prompt = format!("{qa}\n\n{query}");
        let messages = thread.with_pending(Turn::user(prompt.clone()));
        let reply = self.llm.complete(&messages, REWRITE_MAX_TOKENS).await?;

        // The rewrite thread records the full prompt, not the bare query.
        thread.reduce(&self.settings.token_budget);
        thread.append(Turn::user(prompt));
        Ok(reply.trim().to_string())
    }

    async fn related_questions(&self, prepared: &mut PreparedQuery) -> Vec<String> {
        let PreparedQuery {
            session,
            query,
            language,
            contexts,
            ..
        } = prepared;
        match self
            .try_related(&mut session.related, query, *language, contexts)
            .await
        {
            Ok(questions) => questions,
            Err(e) => {
                warn!(error = %e, "related question generation failed");
                Vec::new()
            }
        }
    }

    async fn try_related(
        &self,
        thread: &mut Thread,
        query: &str,
        language: Language,
        contexts: &[SearchResult],
    ) -> Result<Vec<String>, QueryError> {
        if thread.is_empty() {
            let system = self
                .prompts
                .get_prompt(PromptKind::RelatedSystem, language, &[])?;
            thread.append(Turn::system(system));
        }
        let names = contexts
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let qa = self
            .prompts
            .get_prompt(PromptKind::RelatedQa, language, &[("context", &names)])?;
        let messages = thread.with_pending(Turn::user(format!("{qa}\n\n{query}")));
        let reply = self.llm.complete(&messages, RELATED_MAX_TOKENS).await?;

        thread.reduce(&self.settings.token_budget);
        thread.append(Turn::user(query));
        let questions = parse_related_questions(&reply);
        debug!(count = questions.len(), "related questions generated");
        Ok(questions)
    }
}

/// `[[citation:N]] snippet` per result, numbered from 1 in result order.
fn citation_context(contexts: &[SearchResult]) -> String {
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[[citation:{}]] {}", i + 1, c.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}
