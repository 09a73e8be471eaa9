use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    BackendHttp, SearchError, SearchResult, fetch_body, first_non_empty, page_size, parse_payload,
};
use crate::config::{ApiKey, BackendKind};

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    knowledge_graph: Option<KnowledgeGraph>,
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic: Vec<Organic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeGraph {
    title: Option<String>,
    description_url: Option<String>,
    website: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    title: Option<String>,
    url: Option<String>,
    snippet: Option<String>,
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Organic {
    title: String,
    link: String,
    snippet: Option<String>,
}

/// serper.dev Google results.
#[derive(Debug, Clone)]
pub struct Serper {
    settings: BackendHttp,
    key: ApiKey,
}

impl Serper {
    pub fn new(settings: BackendHttp, key: ApiKey) -> Self {
        Self { settings, key }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let payload = SerperRequest {
            q: query,
            num: page_size(self.settings.limit),
        };
        info!(query, num = payload.num, "serper request");

        let request = self
            .settings
            .http
            .post(&self.settings.endpoint)
            .header("X-API-KEY", self.key.expose())
            .json(&payload);
        let body = fetch_body(BackendKind::Serper, request, self.settings.timeout).await?;

        let results = parse_payload::<SerperResponse>(BackendKind::Serper, &body)
            .map(|response| normalize(response, self.settings.limit))
            .unwrap_or_default();
        debug!(count = results.len(), "serper results");
        Ok(results)
    }
}

/// Knowledge graph, then answer box, then organic results.
fn normalize(response: SerperResponse, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(kg) = response.knowledge_graph
        && let Some(url) = first_non_empty([kg.description_url.as_ref(), kg.website.as_ref()])
        && let Some(snippet) = first_non_empty([kg.description.as_ref()])
    {
        results.push(SearchResult {
            name: kg.title.unwrap_or_default(),
            url,
            snippet,
        });
    }

    if let Some(ab) = response.answer_box
        && let Some(url) = first_non_empty([ab.url.as_ref()])
        && let Some(snippet) = first_non_empty([ab.snippet.as_ref(), ab.answer.as_ref()])
    {
        results.push(SearchResult {
            name: ab.title.unwrap_or_default(),
            url,
            snippet,
        });
    }

    results.extend(response.organic.into_iter().map(|o| SearchResult {
        name: o.title,
        url: o.link,
        snippet: o.snippet.unwrap_or_default(),
    }));

    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parse(value: serde_json::Value) -> SerperResponse {
        serde_json::from_value(value).unwrap()
    }

    fn organic(n: usize) -> Vec<serde_json::Value> {
        (0..n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Result {i}"),
                    "link": format!("https://example.com/{i}"),
                    "snippet": format!("organic {i}")
                })
            })
            .collect()
    }

    #[test]
    fn leading_records_precede_organic() {
        let response = parse(serde_json::json!({
            "knowledgeGraph": {
                "title": "Rust",
                "website": "https://rust-lang.org",
                "description": "A systems language"
            },
            "answerBox": {
                "title": "Ownership",
                "url": "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html",
                "answer": "A set of rules"
            },
            "organic": organic(2)
        }));

        let results = normalize(response, 8);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].url, "https://rust-lang.org");
        assert_eq!(results[0].snippet, "A systems language");
        assert_eq!(results[1].name, "Ownership");
        assert_eq!(results[1].snippet, "A set of rules");
        assert_eq!(results[2].name, "Result 0");
    }

    #[test]
    fn description_url_wins_over_website() {
        let response = parse(serde_json::json!({
            "knowledgeGraph": {
                "descriptionUrl": "https://en.wikipedia.org/wiki/Rust",
                "website": "https://rust-lang.org",
                "description": "d"
            }
        }));
        assert_eq!(normalize(response, 8)[0].url, "https://en.wikipedia.org/wiki/Rust");
    }

    #[test]
    fn incomplete_leading_records_are_dropped() {
        let response = parse(serde_json::json!({
            "knowledgeGraph": {"title": "No url", "description": "d"},
            "answerBox": {"title": "No snippet", "url": "https://example.com"},
            "organic": organic(1)
        }));

        let results = normalize(response, 8);
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|r| !r.url.is_empty()));
    }

    #[test]
    fn null_snippet_keeps_the_result() {
        let response = parse(serde_json::json!({
            "organic": [
                {"title": "Null", "link": "https://null.example", "snippet": null},
                {"title": "Set", "link": "https://set.example", "snippet": "s"}
            ]
        }));

        let results = normalize(response, 8);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "");
        assert_eq!(results[1].snippet, "s");
    }

    #[test]
    fn total_is_capped_including_leading_records() {
        let response = parse(serde_json::json!({
            "answerBox": {"url": "https://a.example", "snippet": "s"},
            "organic": organic(10)
        }));

        let results = normalize(response, 8);
        assert_eq!(results.len(), 8);
        assert_eq!(results[0].url, "https://a.example");
        assert_eq!(results[7].name, "Result 6");
    }

    #[tokio::test]
    async fn posts_rounded_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-API-KEY", "serper-key"))
            .and(body_json(serde_json::json!({"q": "rust", "num": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": organic(10)
            })))
            .mount(&server)
            .await;

        let serper = Serper::new(
            BackendHttp {
                http: Client::new(),
                endpoint: format!("{}/search", server.uri()),
                limit: 8,
                timeout: Duration::from_secs(5),
            },
            ApiKey::new("serper-key"),
        );
        let results = serper.search("rust").await.unwrap();
        assert_eq!(results.len(), 8);
    }

    #[tokio::test]
    async fn organic_without_link_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [{"title": "missing link"}]
            })))
            .mount(&server)
            .await;

        let serper = Serper::new(
            BackendHttp {
                http: Client::new(),
                endpoint: server.uri(),
                limit: 8,
                timeout: Duration::from_secs(5),
            },
            ApiKey::new("k"),
        );
        assert!(serper.search("q").await.unwrap().is_empty());
    }
}
