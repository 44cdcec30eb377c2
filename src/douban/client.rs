use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::cache::TtlCache;
use crate::config::SharedConfig;
use crate::error::{ProviderError, Result};
use crate::limiter::RateLimiter;
use crate::redirect::RedirectClient;

use super::parse::{self, RISK_CONTROL_MARKER};
use super::{Celebrity, DoubanApi, LoginInfo, MediaKind, Photo, Subject};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

const SEARCH_TTL: Duration = Duration::from_secs(5 * 60);
const DETAIL_TTL: Duration = Duration::from_secs(30 * 60);

static RE_PATH_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d+?)/").unwrap());

/// Base URLs for the two scraped hosts. Overridable so tests can point the
/// client at a local mock server.
#[derive(Debug, Clone)]
pub struct DoubanHosts {
    pub www: String,
    pub movie: String,
}

impl Default for DoubanHosts {
    fn default() -> Self {
        Self {
            www: "https://www.douban.com".to_string(),
            movie: "https://movie.douban.com".to_string(),
        }
    }
}

/// Scraping client for the primary metadata source. All public operations
/// swallow failures into empty/`None` results after logging; the resolver
/// treats a missing answer and a failed fetch the same way.
pub struct DoubanClient {
    config: SharedConfig,
    hosts: DoubanHosts,
    http: RwLock<reqwest::Client>,
    /// Cookie string the current `http` client was built with.
    session_cookies: Mutex<String>,
    redirect: RedirectClient,

    limiter_default: RateLimiter,
    limiter_guest: RateLimiter,
    limiter_authed: RateLimiter,

    search_cache: TtlCache<Vec<Subject>>,
    subject_cache: TtlCache<Option<Subject>>,
    celebrities_cache: TtlCache<Vec<Celebrity>>,
    celebrity_cache: TtlCache<Option<Celebrity>>,
    photo_cache: TtlCache<Vec<Photo>>,
}

impl DoubanClient {
    pub fn new(config: SharedConfig) -> Self {
        Self::with_hosts(config, DoubanHosts::default())
    }

    pub fn with_hosts(config: SharedConfig, hosts: DoubanHosts) -> Self {
        let cookies = config.snapshot().douban_cookies.clone();
        Self {
            http: RwLock::new(build_http_client(&cookies, &hosts)),
            session_cookies: Mutex::new(cookies),
            redirect: RedirectClient::new(),
            config,
            hosts,
            // One request per 200ms when anti-block pacing is off.
            limiter_default: RateLimiter::per_interval(1, Duration::from_millis(200)),
            // Anonymous anti-block pacing: 10/minute and 1 per 5s.
            limiter_guest: RateLimiter::new(&[
                (10, Duration::from_secs(60)),
                (1, Duration::from_secs(5)),
            ]),
            // With a logged-in session the provider tolerates more.
            limiter_authed: RateLimiter::new(&[
                (20, Duration::from_secs(60)),
                (1, Duration::from_secs(3)),
            ]),
            search_cache: TtlCache::new(),
            subject_cache: TtlCache::new(),
            celebrities_cache: TtlCache::new(),
            celebrity_cache: TtlCache::new(),
            photo_cache: TtlCache::new(),
        }
    }

    /// Full-text search restricted to the movie/series category.
    pub async fn search(&self, keyword: &str) -> Vec<Subject> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("search_{keyword}");
        if let Some(hit) = self.search_cache.get(&cache_key) {
            return hit;
        }

        let url = format!(
            "{}/search?cat=1002&q={}",
            self.hosts.www,
            urlencoding::encode(keyword)
        );
        let body = match self.get_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(keyword, error = %e, "search request failed");
                return Vec::new();
            }
        };

        let list = parse::parse_search_results(&body);
        debug!(keyword, results = list.len(), "search done");
        if list.is_empty() {
            // Empty results stay uncached so the next call retries; the
            // marker only tells blocked apart from nothing-found in the log.
            if body.contains(RISK_CONTROL_MARKER) {
                error!(keyword, "search blocked by provider risk control");
            }
            return list;
        }
        self.search_cache.insert(cache_key, list.clone(), SEARCH_TTL);
        list
    }

    /// Search narrowed to movie results.
    pub async fn search_movies(&self, keyword: &str) -> Vec<Subject> {
        self.search(keyword)
            .await
            .into_iter()
            .filter(|s| s.category == MediaKind::Movie)
            .collect()
    }

    /// Search narrowed to series results.
    pub async fn search_series(&self, keyword: &str) -> Vec<Subject> {
        self.search(keyword)
            .await
            .into_iter()
            .filter(|s| s.category == MediaKind::Series)
            .collect()
    }

    /// Lightweight suggest endpoint. Exact-title matches only, so it is safe
    /// to call ahead of the full search under anti-block pacing.
    pub async fn search_by_suggest(&self, keyword: &str) -> Vec<Subject> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("search_suggest_{keyword}");
        if let Some(hit) = self.search_cache.get(&cache_key) {
            return hit;
        }

        let url = format!(
            "{}/j/search_suggest?q={}",
            self.hosts.www,
            urlencoding::encode(keyword)
        );
        let response: SuggestResponse = match self.get_json(&url).await {
            Ok(response) => response,
            Err(e) => {
                warn!(keyword, error = %e, "suggest request failed");
                return Vec::new();
            }
        };

        let list: Vec<Subject> = response
            .cards
            .into_iter()
            .filter_map(|card| {
                // The endpoint also suggests books, groups and people.
                if card.kind != "movie" {
                    return None;
                }
                let sid = parse::extract_suggest_sid(&card.url);
                if sid.is_empty() {
                    return None;
                }
                Some(Subject {
                    sid,
                    name: card.title,
                    original_name: card.sub_title.unwrap_or_default(),
                    year: card.year.and_then(|y| y.parse().ok()),
                    img: card.img.unwrap_or_default(),
                    ..Default::default()
                })
            })
            .collect();
        self.search_cache.insert(cache_key, list.clone(), SEARCH_TTL);
        list
    }

    /// Fetches a full subject record. A provider error is cached as a
    /// negative entry; a structurally broken page is not cached at all so a
    /// later attempt can succeed once the block lifts.
    pub async fn get_subject(&self, sid: &str) -> Option<Subject> {
        if sid.is_empty() {
            return None;
        }

        let cache_key = format!("movie_{sid}");
        if let Some(hit) = self.subject_cache.get(&cache_key) {
            return hit;
        }

        let url = format!("{}/subject/{}/", self.hosts.movie, sid);
        let body = match self.get_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(sid, error = %e, "subject request failed");
                self.subject_cache.insert(cache_key, None, DETAIL_TTL);
                return None;
            }
        };

        match parse::parse_subject(&body, sid) {
            Some(subject) => {
                self.subject_cache
                    .insert(cache_key, Some(subject.clone()), DETAIL_TTL);
                Some(subject)
            }
            None => {
                error!(sid, "subject page missing content container, possibly blocked");
                None
            }
        }
    }

    /// Full cast/crew listing, directors and actors only.
    pub async fn get_celebrities(&self, sid: &str) -> Vec<Celebrity> {
        if sid.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("celebrities_{sid}");
        if let Some(hit) = self.celebrities_cache.get(&cache_key) {
            return hit;
        }

        let url = format!("{}/subject/{}/celebrities", self.hosts.movie, sid);
        let body = match self.get_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(sid, error = %e, "celebrities request failed");
                return Vec::new();
            }
        };

        let list = parse::parse_celebrities_page(&body);
        self.celebrities_cache
            .insert(cache_key, list.clone(), DETAIL_TTL);
        list
    }

    /// Person profile. Legacy short ids still circulate in stored metadata;
    /// they are mapped to the current id scheme through the provider's own
    /// redirect before fetching.
    pub async fn get_celebrity(&self, id: &str) -> Option<Celebrity> {
        if id.is_empty() {
            return None;
        }

        let mut id = id.to_string();
        if id.len() == 7 {
            // A failed redirect probe keeps the old id; the profile fetch may
            // still work with it.
            let legacy_url = format!("{}/celebrity/{}/", self.hosts.movie, id);
            if let Some(new_id) = self.redirect.resolve(&legacy_url, &RE_PATH_ID).await {
                id = new_id;
            }
        }

        let cache_key = format!("personage_{id}");
        if let Some(hit) = self.celebrity_cache.get(&cache_key) {
            return hit;
        }

        let url = format!("{}/personage/{}/", self.hosts.www, id);
        let body = match self.get_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%id, error = %e, "celebrity request failed");
                self.celebrity_cache.insert(cache_key, None, DETAIL_TTL);
                return None;
            }
        };

        let celebrity = parse::parse_celebrity_page(&body, &id);
        if celebrity.is_none() {
            error!(%id, "celebrity page missing content container, possibly blocked");
        }
        self.celebrity_cache
            .insert(cache_key, celebrity.clone(), DETAIL_TTL);
        celebrity
    }

    pub async fn get_celebrity_photos(&self, cid: &str) -> Vec<Photo> {
        if cid.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("personage_photo_{cid}");
        if let Some(hit) = self.photo_cache.get(&cache_key) {
            return hit;
        }

        let url = format!("{}/personage/{}/photos/", self.hosts.www, cid);
        let body = match self.get_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(cid, error = %e, "celebrity photos request failed");
                return Vec::new();
            }
        };

        let list = parse::parse_celebrity_photos(&body);
        self.photo_cache.insert(cache_key, list.clone(), DETAIL_TTL);
        list
    }

    /// Backdrop candidates for a subject, largest first as served.
    pub async fn get_wallpapers(&self, sid: &str) -> Vec<Photo> {
        if sid.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("photo_{sid}");
        if let Some(hit) = self.photo_cache.get(&cache_key) {
            return hit;
        }

        let url = format!(
            "{}/subject/{}/photos?type=W&start=0&sortby=size&size=a&subtype=a",
            self.hosts.movie, sid
        );
        let body = match self.get_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(sid, error = %e, "wallpaper request failed");
                return Vec::new();
            }
        };

        let list = parse::parse_wallpapers(&body);
        self.photo_cache.insert(cache_key, list.clone(), DETAIL_TTL);
        list
    }

    pub async fn search_celebrities(&self, keyword: &str) -> Vec<Celebrity> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("search_celebrity_{keyword}");
        if let Some(hit) = self.celebrities_cache.get(&cache_key) {
            return hit;
        }

        let url = format!(
            "{}/celebrities/search?search_text={}",
            self.hosts.movie,
            urlencoding::encode(keyword)
        );
        // Celebrity search is rare enough to skip the pacing gate.
        let body = match self.get_text_unpaced(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(keyword, error = %e, "celebrity search failed");
                return Vec::new();
            }
        };

        let list = parse::parse_celebrity_search(&body);
        self.celebrities_cache
            .insert(cache_key, list.clone(), DETAIL_TTL);
        list
    }

    /// Probes whether the configured cookies carry a live session. A network
    /// failure reports logged-in so a flaky probe does not downgrade the
    /// pacing mode of a genuinely authenticated session.
    pub async fn check_login(&self) -> bool {
        self.get_login_info().await.is_logged_in
    }

    /// Fetches the logged-in user's profile name. Landing on a login or
    /// risk-control page after redirects means the session is dead.
    pub async fn get_login_info(&self) -> LoginInfo {
        let url = format!("{}/mine/", self.hosts.www);
        self.limiter().acquire().await;
        let response = match self.client().get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "login probe failed");
                return LoginInfo {
                    name: String::new(),
                    is_logged_in: true,
                };
            }
        };

        let final_url = response.url().to_string();
        if final_url.contains("login")
            || final_url.contains("accounts.douban.com")
            || final_url.contains(RISK_CONTROL_MARKER)
        {
            return LoginInfo::default();
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "login probe failed");
                return LoginInfo {
                    name: String::new(),
                    is_logged_in: true,
                };
            }
        };
        let name = parse::parse_login_name(&body);
        LoginInfo {
            is_logged_in: !name.is_empty(),
            name,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.limiter().acquire().await;
        self.get_text_unpaced(url).await
    }

    async fn get_text_unpaced(&self, url: &str) -> Result<String> {
        let response = self.client().get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }
        Ok(response.text().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.limiter().acquire().await;
        let response = self.client().get(url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Current HTTP client, rebuilt with a fresh cookie jar whenever the
    /// configured cookie string has changed since the last request.
    fn client(&self) -> reqwest::Client {
        let cookies = self.config.snapshot().douban_cookies.clone();
        {
            let mut current = self.session_cookies.lock().unwrap();
            if *current != cookies {
                *self.http.write().unwrap() = build_http_client(&cookies, &self.hosts);
                *current = cookies;
            }
        }
        self.http.read().unwrap().clone()
    }

    fn limiter(&self) -> &RateLimiter {
        let settings = self.config.snapshot();
        if !settings.enable_anti_block {
            &self.limiter_default
        } else if settings.douban_cookies.trim().is_empty() {
            &self.limiter_guest
        } else {
            &self.limiter_authed
        }
    }
}

#[async_trait]
impl DoubanApi for DoubanClient {
    async fn search(&self, keyword: &str) -> Vec<Subject> {
        DoubanClient::search(self, keyword).await
    }

    async fn search_by_suggest(&self, keyword: &str) -> Vec<Subject> {
        DoubanClient::search_by_suggest(self, keyword).await
    }

    async fn get_subject(&self, sid: &str) -> Option<Subject> {
        DoubanClient::get_subject(self, sid).await
    }
}

fn build_http_client(cookies: &str, hosts: &DoubanHosts) -> reqwest::Client {
    let jar = Jar::default();
    for host in [&hosts.www, &hosts.movie] {
        if let Ok(url) = host.parse::<reqwest::Url>() {
            for pair in cookies.split(';') {
                let pair = pair.trim();
                if !pair.is_empty() {
                    jar.add_cookie_str(pair, &url);
                }
            }
        }
    }

    let mut headers = HeaderMap::new();
    headers.insert(REFERER, HeaderValue::from_static("https://movie.douban.com/"));

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .cookie_provider(std::sync::Arc::new(jar))
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    cards: Vec<SuggestCard>,
}

#[derive(Debug, Deserialize)]
struct SuggestCard {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    year: Option<String>,
    #[serde(default)]
    sub_title: Option<String>,
    #[serde(default)]
    img: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_follows_anti_block_settings() {
        let config = SharedConfig::default();
        let client = DoubanClient::new(config.clone());

        assert!(std::ptr::eq(client.limiter(), &client.limiter_default));

        config.modify(|s| s.enable_anti_block = true);
        assert!(std::ptr::eq(client.limiter(), &client.limiter_guest));

        config.modify(|s| s.douban_cookies = "bid=abc; dbcl2=\"123:xyz\"".to_string());
        assert!(std::ptr::eq(client.limiter(), &client.limiter_authed));
    }

    #[test]
    fn session_client_is_rebuilt_on_cookie_change() {
        let config = SharedConfig::default();
        let client = DoubanClient::new(config.clone());
        client.client();
        assert_eq!(*client.session_cookies.lock().unwrap(), "");

        config.modify(|s| s.douban_cookies = "bid=abc".to_string());
        client.client();
        assert_eq!(*client.session_cookies.lock().unwrap(), "bid=abc");
    }
}
