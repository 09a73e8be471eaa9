use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::{BackendHttp, SearchError, SearchResult, fetch_body};
use crate::config::BackendKind;

const RESULT_SELECTOR: &str = "div.result";
const TITLE_SELECTOR: &str = "a.result__a";
const SNIPPET_SELECTOR: &str = ".result__snippet";

#[derive(Debug, Clone)]
pub struct Ddgs {
    settings: BackendHttp,
}

impl Ddgs {
    pub fn new(settings: BackendHttp) -> Self {
        Self { settings }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let url = Url::parse_with_params(&self.settings.endpoint, [("q", query)])?;
        let request = self.settings.http.get(url);
        let html = fetch_body(BackendKind::Ddgs, request, self.settings.timeout).await?;

        let results = parse_results(&html, self.settings.limit);
        if results.is_empty() {
            warn!("duckduckgo page had no parsable results");
        }
        debug!(count = results.len(), "duckduckgo results");
        Ok(results)
    }
}

/// Keeps results that have both a link and a snippet.
fn parse_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse(RESULT_SELECTOR),
        Selector::parse(TITLE_SELECTOR),
        Selector::parse(SNIPPET_SELECTOR),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&result_sel)
        .filter_map(|container| {
            let anchor = container.select(&title_sel).next()?;
            let url = resolve_href(anchor.value().attr("href")?)?;
            let snippet = container
                .select(&snippet_sel)
                .next()
                .map(text_of)
                .filter(|s| !s.is_empty())?;
            Some(SearchResult {
                name: text_of(anchor),
                url,
                snippet,
            })
        })
        .take(limit)
        .collect()
}

fn text_of(elem: ElementRef<'_>) -> String {
    elem.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unwraps `/l/?uddg=` redirect links and protocol-relative hrefs.
fn resolve_href(href: &str) -> Option<String> {
    let href = href.trim();
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if parsed.host_str().is_some_and(|h| h.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/")
    {
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        return Url::parse(&target)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .map(String::from);
    }

    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}
