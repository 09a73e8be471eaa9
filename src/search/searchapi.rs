use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{
    BackendHttp, SearchError, SearchResult, fetch_body, first_non_empty, page_size, parse_payload,
};
use crate::config::{ApiKey, BackendKind};

#[derive(Debug, Deserialize)]
struct SearchApiResponse {
    answer_box: Option<AnswerBox>,
    knowledge_graph: Option<KnowledgeGraph>,
    #[serde(default)]
    organic_results: Vec<Organic>,
    #[serde(default)]
    related_questions: Vec<RelatedQuestion>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    link: Option<String>,
    answer: Option<String>,
    snippet: Option<String>,
    organic_result: Option<LinkedTitle>,
    place: Option<String>,
    explore_more_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedTitle {
    title: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeGraph {
    title: Option<String>,
    website: Option<String>,
    description: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Organic {
    title: String,
    link: String,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelatedQuestion {
    question: Option<String>,
    answer: Option<String>,
    source: Option<Source>,
}

/// searchapi.io with the Google engine.
#[derive(Debug, Clone)]
pub struct SearchApi {
    settings: BackendHttp,
    key: ApiKey,
}

impl SearchApi {
    pub fn new(settings: BackendHttp, key: ApiKey) -> Self {
        Self { settings, key }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let num = page_size(self.settings.limit).to_string();
        let url = Url::parse_with_params(
            &self.settings.endpoint,
            [("q", query), ("engine", "google"), ("num", num.as_str())],
        )?;
        info!(query, num = %num, "searchapi request");

        let request = self
            .settings
            .http
            .get(url)
            .bearer_auth(self.key.expose())
            .header("Content-Type", "application/json");
        let body = fetch_body(BackendKind::SearchApi, request, self.settings.timeout).await?;

        let results = parse_payload::<SearchApiResponse>(BackendKind::SearchApi, &body)
            .map(|response| normalize(response, self.settings.limit))
            .unwrap_or_default();
        debug!(count = results.len(), "searchapi results");
        Ok(results)
    }
}

/// Answer box, knowledge graph, organic results, then related questions.
fn normalize(response: SearchApiResponse, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(ab) = response.answer_box {
        let (fallback_title, fallback_url) = match (&ab.organic_result, ab.kind.as_deref()) {
            (Some(org), _) => (org.title.clone(), org.link.clone()),
            (None, Some("population_graph")) => (ab.place.clone(), ab.explore_more_link.clone()),
            _ => (None, None),
        };
        let name = ab.title.or(fallback_title).unwrap_or_default();
        let url = first_non_empty([ab.link.as_ref()]).or(fallback_url.filter(|u| !u.is_empty()));
        let snippet = first_non_empty([ab.answer.as_ref(), ab.snippet.as_ref()]);
        if let (Some(url), Some(snippet)) = (url, snippet) {
            results.push(SearchResult { name, url, snippet });
        }
    }

    if let Some(kg) = response.knowledge_graph {
        let source_link = kg.source.and_then(|s| s.link);
        let url = first_non_empty([kg.website.as_ref(), source_link.as_ref()]);
        let snippet = first_non_empty([kg.description.as_ref()]);
        if let (Some(url), Some(snippet)) = (url, snippet) {
            results.push(SearchResult {
                name: kg.title.unwrap_or_default(),
                url,
                snippet,
            });
        }
    }

    results.extend(response.organic_results.into_iter().map(|o| SearchResult {
        name: o.title,
        url: o.link,
        snippet: o.snippet.unwrap_or_default(),
    }));

    results.extend(response.related_questions.into_iter().filter_map(|q| {
        let url = first_non_empty([q.source.as_ref().and_then(|s| s.link.as_ref())])?;
        let snippet = first_non_empty([q.answer.as_ref()])?;
        Some(SearchResult {
            name: q.question.unwrap_or_default(),
            url,
            snippet,
        })
    }));

    results.truncate(limit);
    results
}
