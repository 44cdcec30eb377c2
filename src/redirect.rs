//! Id resolution through HTTP redirects. Some providers expose canonical
//! ids only in the `Location` header of a redirect response, so the client
//! here never follows redirects and scrapes the header instead.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tracing::warn;

use crate::cache::TtlCache;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

static RE_IMDB_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(tt\d+)").unwrap());
static RE_IMDB_PERSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(nm\d+)").unwrap());

pub struct RedirectClient {
    http: reqwest::Client,
    /// Keyed by request URL; a miss on the target pattern is cached too.
    cache: TtlCache<Option<String>>,
}

impl RedirectClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .redirect(Policy::none())
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            cache: TtlCache::new(),
        }
    }

    /// Requests `url` and extracts the first `pattern` capture from the
    /// redirect target. `None` (absent header or no match) is remembered for
    /// the same TTL as a hit.
    pub async fn resolve(&self, url: &str, pattern: &Regex) -> Option<String> {
        if let Some(hit) = self.cache.get(url) {
            return hit;
        }

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "redirect probe failed");
                self.cache.insert(url, None, CACHE_TTL);
                return None;
            }
        };

        let resolved = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| pattern.captures(location))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        self.cache.insert(url, resolved.clone(), CACHE_TTL);
        resolved
    }
}

impl Default for RedirectClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves stale IMDb ids to their current form. IMDb answers a request for
/// a superseded id with a redirect to the canonical one.
pub struct ImdbClient {
    base_url: String,
    inner: RedirectClient,
}

impl ImdbClient {
    pub fn new() -> Self {
        Self::with_base_url("https://www.imdb.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            inner: RedirectClient::new(),
        }
    }

    pub async fn check_new_id(&self, id: &str) -> Option<String> {
        if id.is_empty() {
            return None;
        }
        let url = format!("{}/title/{}/", self.base_url, id);
        self.inner.resolve(&url, &RE_IMDB_TITLE).await
    }

    pub async fn check_person_new_id(&self, id: &str) -> Option<String> {
        if id.is_empty() {
            return None;
        }
        let url = format!("{}/name/{}/", self.base_url, id);
        self.inner.resolve(&url, &RE_IMDB_PERSON).await
    }
}

impl Default for ImdbClient {
    fn default() -> Self {
        Self::new()
    }
}
