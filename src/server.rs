use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span};

use crate::llm::ChatModel;
use crate::query::{QueryError, QueryOrchestrator, QueryRequest, StreamingEmitter};
use crate::search::WebSearch;

/// Fragments buffered between the generating task and the response body.
const STREAM_BUFFER: usize = 64;

pub const UI_ENTRY: &str = "/ui/index.html";

type Shared<S, M> = Arc<QueryOrchestrator<S, M>>;

pub fn router<S, M>(orchestrator: Shared<S, M>, ui_dir: impl AsRef<Path>) -> Router
where
    S: WebSearch + 'static,
    M: ChatModel + 'static,
{
    Router::new()
        .route("/query", post(query::<S, M>))
        .route("/", get(|| async { Redirect::temporary(UI_ENTRY) }))
        .nest_service("/ui", ServeDir::new(ui_dir.as_ref()))
        .with_state(orchestrator)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on http://{addr}");
    }
    axum::serve(listener, app).await
}

async fn query<S, M>(
    State(orchestrator): State<Shared<S, M>>,
    Json(request): Json<QueryRequest>,
) -> Response
where
    S: WebSearch + 'static,
    M: ChatModel + 'static,
{
    let span = info_span!("query", search_uuid = %request.correlation_id());
    let prepared = match orchestrator.prepare(request).instrument(span.clone()).await {
        Ok(prepared) => prepared,
        Err(QueryError::EmptyQuery) => {
            return (StatusCode::BAD_REQUEST, "query must not be empty").into_response();
        }
        Err(e) => {
            error!(error = %e, "query failed before streaming");
            return (StatusCode::SERVICE_UNAVAILABLE, "Internal server error.").into_response();
        }
    };

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let emitter = StreamingEmitter::new(tx);
    tokio::spawn(
        async move { orchestrator.stream_answer(prepared, emitter).await }.instrument(span),
    );

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    (
        [(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::history::{TokenBudget, Turn};
    use crate::llm::{LlmError, TokenStream};
    use crate::prompt::PromptManager;
    use crate::query::{LLM_SEPARATOR, PipelineSettings, RELATED_SEPARATOR};
    use crate::search::{SearchError, SearchResult};
    use axum::body::to_bytes;
    use axum::http::Request;
    use futures::stream;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedSearch(Option<Vec<SearchResult>>);

    impl WebSearch for FixedSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, SearchError> {
            self.0.clone().ok_or(SearchError::Status {
                backend: BackendKind::Serper,
                status: 502,
            })
        }
    }

    /// Answers with fixed text and records how many messages each answer
    /// call carried.
    #[derive(Clone, Default)]
    struct CannedModel {
        answer_calls: Arc<Mutex<Vec<usize>>>,
    }

    impl ChatModel for CannedModel {
        async fn complete(&self, _messages: &[Turn], _max_tokens: u32) -> Result<String, LlmError> {
            Ok("Follow up one?\nFollow up two?".into())
        }

        async fn stream(&self, messages: &[Turn], _max_tokens: u32) -> Result<TokenStream, LlmError> {
            self.answer_calls.lock().unwrap().push(messages.len());
            Ok(stream::iter(["Rust ", "answer"].map(|t| Ok(t.to_string()))).boxed())
        }
    }

    fn settings(enable_history: bool) -> PipelineSettings {
        PipelineSettings {
            token_budget: TokenBudget::default(),
            llm_timeout: Duration::from_secs(5),
            enable_related_questions: true,
            enable_rewrite_question: false,
            enable_history,
        }
    }

    fn app_with(
        results: Option<Vec<SearchResult>>,
        model: CannedModel,
        settings: PipelineSettings,
    ) -> Router {
        let orchestrator = QueryOrchestrator::new(
            FixedSearch(results),
            model,
            PromptManager::default(),
            settings,
        );
        router(Arc::new(orchestrator), "ui")
    }

    fn app(results: Option<Vec<SearchResult>>) -> Router {
        app_with(results, CannedModel::default(), settings(false))
    }

    fn post_query(body: serde_json::Value) -> Request<Body> {
        Request::post("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn one_result() -> Vec<SearchResult> {
        vec![SearchResult {
            name: "Rust".into(),
            url: "https://rust-lang.org".into(),
            snippet: "A language".into(),
        }]
    }

    #[tokio::test]
    async fn query_streams_all_segments() {
        let response = app(Some(one_result()))
            .oneshot(post_query(serde_json::json!({"query": "What is Rust?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        let body = body_text(response).await;
        let contexts = serde_json::to_string(&one_result()).unwrap();
        assert_eq!(
            body,
            format!(
                "{contexts}{LLM_SEPARATOR}Rust answer{RELATED_SEPARATOR}[\"Follow up one?\",\"Follow up two?\"]"
            )
        );
    }

    #[tokio::test]
    async fn related_questions_can_be_declined() {
        let response = app(Some(one_result()))
            .oneshot(post_query(serde_json::json!({
                "query": "What is Rust?",
                "search_uuid": "abc",
                "generate_related_questions": false
            })))
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(body.ends_with("Rust answer"));
    }

    #[tokio::test]
    async fn same_session_id_shares_history() {
        let model = CannedModel::default();
        let app = app_with(Some(one_result()), model.clone(), settings(true));

        for query in ["What is Rust?", "Who maintains it?"] {
            let response = app
                .clone()
                .oneshot(post_query(serde_json::json!({
                    "query": query,
                    "session_id": "page-1"
                })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_text(response).await;
        }

        assert_eq!(*model.answer_calls.lock().unwrap(), [2, 4]);
    }

    #[tokio::test]
    async fn requests_without_ids_do_not_share_history() {
        let model = CannedModel::default();
        let app = app_with(Some(one_result()), model.clone(), settings(true));

        for query in ["What is Rust?", "Who maintains it?"] {
            let response = app
                .clone()
                .oneshot(post_query(serde_json::json!({"query": query})))
                .await
                .unwrap();
            body_text(response).await;
        }

        assert_eq!(*model.answer_calls.lock().unwrap(), [2, 2]);
    }

    #[tokio::test]
    async fn search_failure_is_503() {
        let response = app(None)
            .oneshot(post_query(serde_json::json!({"query": "What is Rust?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "Internal server error.");
    }

    #[tokio::test]
    async fn empty_query_is_400() {
        let response = app(Some(one_result()))
            .oneshot(post_query(serde_json::json!({"query": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn root_redirects_to_ui() {
        let response = app(Some(one_result()))
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], UI_ENTRY);
    }
}
