use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BackendHttp, SearchError, SearchResult, fetch_body, parse_payload};
use crate::config::{ApiKey, BackendKind};
use crate::history::Turn;

const TOOL: &str = "web-search-pro";

#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    request_id: String,
    tool: &'a str,
    stream: bool,
    messages: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct ToolResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ToolMessage,
}

#[derive(Debug, Deserialize)]
struct ToolMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    search_result: Option<Vec<SearchProItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchProItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    content: String,
}

/// Zhipu AI `web-search-pro` tool.
#[derive(Debug, Clone)]
pub struct SearchPro {
    settings: BackendHttp,
    key: ApiKey,
}

impl SearchPro {
    pub fn new(settings: BackendHttp, key: ApiKey) -> Self {
        Self { settings, key }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        info!(query, "searching web with search pro");
        let payload = ToolRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            tool: TOOL,
            stream: false,
            messages: vec![Turn::user(query)],
        };

        let request = self
            .settings
            .http
            .post(&self.settings.endpoint)
            .header("Authorization", self.key.expose())
            .json(&payload);
        let body = fetch_body(BackendKind::SearchPro, request, self.settings.timeout).await?;

        let results = parse_payload::<ToolResponse>(BackendKind::SearchPro, &body)
            .map(|response| normalize(response, self.settings.limit))
            .unwrap_or_default();
        debug!(count = results.len(), "search pro results");
        Ok(results)
    }
}

/// Results come from the first tool call that carries a `search_result` list.
fn normalize(response: ToolResponse, limit: usize) -> Vec<SearchResult> {
    let items = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| {
            choice
                .message
                .tool_calls
                .into_iter()
                .find_map(|call| call.search_result)
        });

    let Some(items) = items else {
        warn!("search pro response carries no search_result");
        return Vec::new();
    };

    items
        .into_iter()
        .take(limit)
        .map(|item| SearchResult {
            name: item.title,
            url: item.link,
            snippet: item.content,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search_pro(uri: &str, limit: usize) -> SearchPro {
        SearchPro::new(
            BackendHttp {
                http: Client::new(),
                endpoint: format!("{uri}/api/paas/v4/tools"),
                limit,
                timeout: Duration::from_secs(5),
            },
            ApiKey::new("zhipu-key"),
        )
    }

    fn tool_response(n: usize) -> serde_json::Value {
        let items: Vec<_> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("标题 {i}"),
                    "link": format!("https://example.cn/{i}"),
                    "content": format!("内容 {i}"),
                    "icon": "",
                    "refer": format!("ref_{i}")
                })
            })
            .collect();
        serde_json::json!({
            "choices": [{
                "message": {
                    "role": "tool",
                    "tool_calls": [
                        {"id": "1", "type": "search_intent", "search_intent": [{"query": "q"}]},
                        {"id": "2", "type": "search_result", "search_result": items}
                    ]
                }
            }]
        })
    }

    #[tokio::test]
    async fn posts_tool_request_and_maps_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "zhipu-key"))
            .and(body_partial_json(serde_json::json!({
                "tool": "web-search-pro",
                "stream": false,
                "messages": [{"role": "user", "content": "什么是所有权"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_response(10)))
            .mount(&server)
            .await;

        let results = search_pro(&server.uri(), 8).search("什么是所有权").await.unwrap();
        assert_eq!(results.len(), 8);
        assert_eq!(results[0].name, "标题 0");
        assert_eq!(results[0].url, "https://example.cn/0");
        assert_eq!(results[0].snippet, "内容 0");
    }

    #[tokio::test]
    async fn missing_search_result_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"tool_calls": [{"type": "search_intent"}]}}]
            })))
            .mount(&server)
            .await;

        assert!(search_pro(&server.uri(), 8).search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        assert!(search_pro(&server.uri(), 8).search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = search_pro(&server.uri(), 8).search("q").await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 401, .. }));
    }
}
