//! # Web Search Collaborator
//!
//! Brave Search backed lookup with an in-memory cache and a simple
//! request throttle. Search never fails from the caller's point of view:
//! any provider problem degrades to [`fallback_results`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const CACHE_TTL: Duration = Duration::from_secs(3600);
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(2);
const MAX_QUERY_CHARS: usize = 400;

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl SearchResult {
    fn new(title: String, snippet: String, url: String) -> Self {
        Self { title, snippet, url }
    }
}

/// Search provider seam
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult>;
}

/// Render results as numbered prompt context
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n{}\n{}", i + 1, r.title, r.snippet, r.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic results used whenever the real provider is unavailable
pub fn fallback_results(query: &str, top_k: usize) -> Vec<SearchResult> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let mentions = |keys: &[&str]| keys.iter().any(|k| words.contains(k));
    let encoded = urlencoding::encode(query);

    let mut results = Vec::new();
    if mentions(&["arxiv", "paper", "papers", "research", "academic"]) {
        results.push(SearchResult::new(
            format!("arXiv Search: {}", query),
            format!("Academic papers and preprints related to '{}' on arXiv.org", query),
            format!("https://arxiv.org/search/?query={}", encoded),
        ));
        results.push(SearchResult::new(
            format!("Google Scholar: {}", query),
            format!("Academic literature and citations for '{}'", query),
            format!("https://scholar.google.com/scholar?q={}", encoded),
        ));
    }
    if mentions(&["python", "code", "programming", "tutorial"]) {
        results.push(SearchResult::new(
            format!("Python Documentation: {}", query),
            format!("Official Python documentation and tutorials for '{}'", query),
            "https://docs.python.org/3/".to_string(),
        ));
        results.push(SearchResult::new(
            format!("Stack Overflow: {}", query),
            format!("Programming Q&A and solutions for '{}'", query),
            format!("https://stackoverflow.com/search?q={}", encoded),
        ));
    }
    if results.is_empty() {
        results.push(SearchResult::new(
            format!("Search: {}", query),
            format!("Search results for '{}'. API temporarily unavailable.", query),
            format!("https://www.google.com/search?q={}", encoded),
        ));
    }
    results.truncate(top_k.max(1));
    results
}

/// Provider used when no search API key is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSearch;

#[async_trait]
impl WebSearch for OfflineSearch {
    async fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        fallback_results(query, top_k)
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveHit>,
}

#[derive(Debug, Deserialize)]
struct BraveHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Brave Search API client
pub struct BraveSearch {
    api_key: String,
    http: reqwest::Client,
    cache: Mutex<HashMap<String, (Instant, Vec<SearchResult>)>>,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("codeforge/0.1")
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            http,
            cache: Mutex::new(HashMap::new()),
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    /// Client from `BRAVE_API_KEY`, if set
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("BRAVE_API_KEY").ok()?;
        if key.trim().is_empty() {
            return None;
        }
        Self::new(key).ok()
    }

    fn cached(&self, key: &str) -> Option<Vec<SearchResult>> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < CACHE_TTL)
            .map(|(_, results)| results.clone())
    }

    fn store(&self, key: String, results: &[SearchResult]) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, (Instant::now(), results.to_vec()));
        }
    }

    /// Sleep until the minimum request interval has passed
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let since = previous.elapsed();
            if since < MIN_REQUEST_INTERVAL {
                let wait = MIN_REQUEST_INTERVAL - since;
                tracing::debug!("Rate limit: waiting {:.1}s before search", wait.as_secs_f32());
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn query_api(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchResult>> {
        self.throttle().await;
        let count = top_k.clamp(1, 20).to_string();
        let response = self
            .http
            .get(BRAVE_ENDPOINT)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("country", "US"),
                ("search_lang", "en"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: BraveResponse = response.json().await?;
        Ok(body
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(top_k)
            .map(|hit| {
                let snippet: String = hit.description.chars().take(300).collect();
                SearchResult::new(hit.title, snippet, hit.url)
            })
            .collect())
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        let query = truncate_query(query);
        let key = format!("{}|{}", query, top_k);
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        match self.query_api(&query, top_k).await {
            Ok(results) if !results.is_empty() => {
                self.store(key, &results);
                results
            }
            Ok(_) => fallback_results(&query, top_k),
            Err(e) => {
                tracing::warn!("Brave search failed for '{}': {}", query, e);
                fallback_results(&query, top_k)
            }
        }
    }
}

/// Clamp a query to the provider limit, marking the cut with `...`
pub fn truncate_query(query: &str) -> String {
    if query.chars().count() <= MAX_QUERY_CHARS {
        return query.to_string();
    }
    let head: String = query.chars().take(MAX_QUERY_CHARS - 3).collect();
    format!("{}...", head)
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Returns one canned hit and remembers the queries it saw
    #[derive(Default)]
    pub struct RecordingSearch {
        pub queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WebSearch for RecordingSearch {
        async fn search(&self, query: &str, _top_k: usize) -> Vec<SearchResult> {
            self.queries.lock().unwrap().push(query.to_string());
            vec![SearchResult::new(
                "CSS Grid guide".to_string(),
                "Use grid-template-columns".to_string(),
                "https://example.com/grid".to_string(),
            )]
        }
    }
}
