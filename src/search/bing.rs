use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{BackendHttp, SearchError, SearchResult, fetch_body, parse_payload};
use crate::config::{ApiKey, BackendKind};

const MARKET: &str = "en-US";

#[derive(Debug, Deserialize)]
struct BingResponse {
    #[serde(rename = "webPages")]
    web_pages: WebPages,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    value: Vec<BingPage>,
}

#[derive(Debug, Deserialize)]
struct BingPage {
    name: String,
    url: String,
    snippet: Option<String>,
}

/// Bing Web Search v7.
#[derive(Debug, Clone)]
pub struct Bing {
    settings: BackendHttp,
    key: ApiKey,
}

impl Bing {
    pub fn new(settings: BackendHttp, key: ApiKey) -> Self {
        Self { settings, key }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let url = Url::parse_with_params(&self.settings.endpoint, [("q", query), ("mkt", MARKET)])?;

        let request = self
            .settings
            .http
            .get(url)
            .header("Ocp-Apim-Subscription-Key", self.key.expose());
        let body = fetch_body(BackendKind::Bing, request, self.settings.timeout).await?;

        let results = parse_payload::<BingResponse>(BackendKind::Bing, &body)
            .map(|payload| normalize(payload, self.settings.limit))
            .unwrap_or_default();
        debug!(count = results.len(), "bing results");
        Ok(results)
    }
}

fn normalize(payload: BingResponse, limit: usize) -> Vec<SearchResult> {
    payload
        .web_pages
        .value
        .into_iter()
        .take(limit)
        .map(|page| SearchResult {
            name: page.name,
            url: page.url,
            snippet: page.snippet.unwrap_or_default(),
        })
        .collect()
}
