//! Web search backends normalized to a common [`SearchResult`] shape.
//!
//! Transport failures and non-success statuses are errors for the current
//! query. Payloads that do not match a provider's expected shape are logged
//! and yield no results.

mod bing;
mod ddgs;
mod google;
mod searchapi;
mod searchpro;
mod serper;

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{ApiKey, BackendKind, Config, ConfigError};

pub use bing::Bing;
pub use ddgs::Ddgs;
pub use google::Google;
pub use searchapi::SearchApi;
pub use searchpro::SearchPro;
pub use serper::Serper;

/// One retrieved reference. Position in the returned sequence decides its
/// citation number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search engine error: {backend} returned HTTP {status}")]
    Status { backend: BackendKind, status: u16 },

    #[error("search engine error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid search endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Abstraction over a search provider.
/// Implemented by [`SearchEngine`] for production; mock implementations used in tests.
pub trait WebSearch: Send + Sync {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<SearchResult>, SearchError>> + Send;
}

/// Settings every HTTP backend shares.
#[derive(Debug, Clone)]
pub struct BackendHttp {
    pub http: Client,
    pub endpoint: String,
    pub limit: usize,
    pub timeout: Duration,
}

/// The backend selected at startup.
#[derive(Debug, Clone)]
pub enum SearchEngine {
    SearchPro(SearchPro),
    Bing(Bing),
    Google(Google),
    Serper(Serper),
    SearchApi(SearchApi),
    Ddgs(Ddgs),
}

impl SearchEngine {
    pub fn from_config(config: &Config, http: Client) -> Result<Self, ConfigError> {
        let settings = |endpoint: &str| BackendHttp {
            http: http.clone(),
            endpoint: endpoint.to_string(),
            limit: config.reference_count,
            timeout: config.search_timeout,
        };
        let creds = &config.credentials;
        let key = |k: &Option<ApiKey>, name: &'static str| {
            k.clone().ok_or(ConfigError::MissingCredential(name))
        };
        let endpoints = &config.endpoints;

        Ok(match config.backend {
            BackendKind::SearchPro => SearchEngine::SearchPro(SearchPro::new(
                settings(&endpoints.searchpro),
                key(&creds.zhipuai, "ZHIPUAI_API_KEY")?,
            )),
            BackendKind::Bing => SearchEngine::Bing(Bing::new(
                settings(&endpoints.bing),
                key(&creds.bing, "BING_SEARCH_V7_SUBSCRIPTION_KEY")?,
            )),
            BackendKind::Google => SearchEngine::Google(Google::new(
                settings(&endpoints.google),
                key(&creds.google, "GOOGLE_SEARCH_API_KEY")?,
                key(&creds.google_cx, "GOOGLE_SEARCH_CX")?,
            )),
            BackendKind::Serper => SearchEngine::Serper(Serper::new(
                settings(&endpoints.serper),
                key(&creds.serper, "SERPER_SEARCH_API_KEY")?,
            )),
            BackendKind::SearchApi => SearchEngine::SearchApi(SearchApi::new(
                settings(&endpoints.searchapi),
                key(&creds.searchapi, "SEARCHAPI_API_KEY")?,
            )),
            BackendKind::Ddgs => SearchEngine::Ddgs(Ddgs::new(settings(&endpoints.ddgs))),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            SearchEngine::SearchPro(_) => BackendKind::SearchPro,
            SearchEngine::Bing(_) => BackendKind::Bing,
            SearchEngine::Google(_) => BackendKind::Google,
            SearchEngine::Serper(_) => BackendKind::Serper,
            SearchEngine::SearchApi(_) => BackendKind::SearchApi,
            SearchEngine::Ddgs(_) => BackendKind::Ddgs,
        }
    }
}

impl WebSearch for SearchEngine {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let results = match self {
            SearchEngine::SearchPro(b) => b.search(query).await,
            SearchEngine::Bing(b) => b.search(query).await,
            SearchEngine::Google(b) => b.search(query).await,
            SearchEngine::Serper(b) => b.search(query).await,
            SearchEngine::SearchApi(b) => b.search(query).await,
            SearchEngine::Ddgs(b) => b.search(query).await,
        }?;
        debug!(backend = %self.kind(), count = results.len(), "search complete");
        Ok(results)
    }
}

/// Providers that page in tens need the requested count rounded up.
pub(crate) fn page_size(limit: usize) -> usize {
    if limit % 10 == 0 {
        limit
    } else {
        (limit / 10 + 1) * 10
    }
}

/// Sends the request with the backend timeout and returns the body of a
/// successful response.
pub(crate) async fn fetch_body(
    backend: BackendKind,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<String, SearchError> {
    let response = request
        .header("User-Agent", crate::USER_AGENT)
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let snippet = &text[..text.floor_char_boundary(200)];
        error!(%backend, status = %status, body = snippet, "search provider returned an error");
        return Err(SearchError::Status {
            backend,
            status: status.as_u16(),
        });
    }

    Ok(response.text().await?)
}

/// Decodes a provider payload, logging and returning `None` on mismatch.
pub(crate) fn parse_payload<T: DeserializeOwned>(backend: BackendKind, body: &str) -> Option<T> {
    match serde_json::from_str(body) {
        Ok(payload) => Some(payload),
        Err(e) => {
            let snippet = &body[..body.floor_char_boundary(500)];
            error!(%backend, error = %e, body = snippet, "error parsing search response");
            None
        }
    }
}

/// First value that is present and non-empty.
pub(crate) fn first_non_empty<const N: usize>(candidates: [Option<&String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
}
