use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{BackendHttp, SearchError, SearchResult, fetch_body, parse_payload};
use crate::config::{ApiKey, BackendKind};

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: String,
    link: String,
    snippet: Option<String>,
}

/// Google Programmable Search (Custom Search JSON API).
#[derive(Debug, Clone)]
pub struct Google {
    settings: BackendHttp,
    key: ApiKey,
    cx: ApiKey,
}

impl Google {
    pub fn new(settings: BackendHttp, key: ApiKey, cx: ApiKey) -> Self {
        Self { settings, key, cx }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let num = self.settings.limit.to_string();
        let url = Url::parse_with_params(
            &self.settings.endpoint,
            [
                ("key", self.key.expose()),
                ("cx", self.cx.expose()),
                ("q", query),
                ("num", num.as_str()),
            ],
        )?;

        let request = self.settings.http.get(url);
        let body = fetch_body(BackendKind::Google, request, self.settings.timeout).await?;

        let Some(payload) = parse_payload::<GoogleResponse>(BackendKind::Google, &body) else {
            return Ok(Vec::new());
        };
        let Some(items) = payload.items else {
            warn!("google response has no items");
            return Ok(Vec::new());
        };

        let results: Vec<_> = items
            .into_iter()
            .take(self.settings.limit)
            .map(|item| SearchResult {
                name: item.title,
                url: item.link,
                snippet: item.snippet.unwrap_or_default(),
            })
            .collect();
        debug!(count = results.len(), "google results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn google(uri: &str) -> Google {
        Google::new(
            BackendHttp {
                http: Client::new(),
                endpoint: format!("{uri}/customsearch/v1"),
                limit: 8,
                timeout: Duration::from_secs(5),
            },
            ApiKey::new("g-key"),
            ApiKey::new("g-cx"),
        )
    }

    #[tokio::test]
    async fn maps_items_to_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "g-key"))
            .and(query_param("cx", "g-cx"))
            .and(query_param("q", "borrow checker"))
            .and(query_param("num", "8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"title": "The Book", "link": "https://doc.rust-lang.org/book/", "snippet": "Ownership rules"},
                    {"title": "No snippet", "link": "https://example.com"}
                ]
            })))
            .mount(&server)
            .await;

        let results = google(&server.uri()).search("borrow checker").await.unwrap();
        assert_eq!(
            results,
            vec![
                SearchResult {
                    name: "The Book".into(),
                    url: "https://doc.rust-lang.org/book/".into(),
                    snippet: "Ownership rules".into(),
                },
                SearchResult {
                    name: "No snippet".into(),
                    url: "https://example.com".into(),
                    snippet: String::new(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn null_snippet_is_read_as_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"title": "Null", "link": "https://null.example", "snippet": null}]
            })))
            .mount(&server)
            .await;

        let results = google(&server.uri()).search("q").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "");
    }

    #[tokio::test]
    async fn no_items_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "searchInformation": {"totalResults": "0"}
            })))
            .mount(&server)
            .await;

        assert!(google(&server.uri()).search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = google(&server.uri()).search("q").await.unwrap_err();
        assert!(err.to_string().contains("500"), "got: {err}");
    }
}
