use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::SharedConfig;
use crate::error::{ProviderError, Result};

const DEFAULT_API_HOST: &str = "https://api4.thetvdb.com/v4/";
const ARTWORK_HOST: &str = "https://artworks.thetvdb.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
/// Issued tokens are valid for a month; refresh well before that.
const TOKEN_TTL: Duration = Duration::from_secs(20 * 24 * 60 * 60);
const TOKEN_KEY: &str = "token";
/// Hard stop for episode pagination on absurdly long-running series.
const MAX_PAGE_COUNT: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    pub id: i64,
    #[serde(default)]
    pub tvdb_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRecord {
    pub id: i64,
    #[serde(default)]
    pub season_number: i32,
    #[serde(default)]
    pub number: i32,
    #[serde(default)]
    pub aired: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub airs_before_season: Option<i32>,
    #[serde(default)]
    pub airs_before_episode: Option<i32>,
    #[serde(default)]
    pub airs_after_season: Option<i32>,
}

/// Full series record from the extended endpoint, artwork URLs already
/// absolutized.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesExtended {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub artworks: Vec<ArtworkRecord>,
    #[serde(default)]
    pub seasons: Vec<SeasonRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkRecord {
    pub id: i64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRecord {
    pub id: i64,
    #[serde(default)]
    pub number: i32,
    #[serde(default)]
    pub image: Option<String>,
}

/// Episode ordering schemes the upstream supports; `Default` is the aired
/// order virtually all library managers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonType {
    Default,
    Dvd,
    Absolute,
}

impl SeasonType {
    fn as_str(self) -> &'static str {
        match self {
            SeasonType::Default => "default",
            SeasonType::Dvd => "dvd",
            SeasonType::Absolute => "absolute",
        }
    }
}

#[async_trait]
pub trait TvdbApi: Send + Sync {
    async fn search_series(&self, keyword: &str) -> Vec<SeriesRecord>;
    async fn get_series_episodes(
        &self,
        series_id: i64,
        season_type: SeasonType,
        season_number: i32,
        language: Option<&str>,
    ) -> Vec<EpisodeRecord>;
}

/// Authenticated client for the subscription series database. Tokens are
/// obtained lazily from the configured key/PIN and reused until they expire
/// or the server rejects one.
pub struct TvdbClient {
    config: SharedConfig,
    http: reqwest::Client,
    token_cache: TtlCache<String>,
}

impl TvdbClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            token_cache: TtlCache::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.snapshot().tvdb_api_key.trim().is_empty()
    }

    fn base_url(&self) -> String {
        normalize_host(&self.config.snapshot().tvdb_host)
    }

    async fn ensure_token(&self) -> Result<String> {
        if let Some(token) = self.token_cache.get(TOKEN_KEY) {
            return Ok(token);
        }

        let settings = self.config.snapshot();
        let request = LoginRequest {
            apikey: settings.tvdb_api_key.trim().to_string(),
            pin: {
                let pin = settings.tvdb_pin.trim();
                (!pin.is_empty()).then(|| pin.to_string())
            },
        };

        let url = format!("{}login", self.base_url());
        let response = self.http.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }

        let body: ApiResponse<LoginData> = response.json().await?;
        let token = body.data.ok_or(ProviderError::NotFound)?.token;
        debug!("tvdb login succeeded");
        self.token_cache
            .insert(TOKEN_KEY, token.clone(), TOKEN_TTL);
        Ok(token)
    }

    /// GET with bearer auth; a 401 drops the cached token and retries once
    /// with a fresh login.
    async fn get_with_token<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        for attempt in 0..2 {
            let token = self.ensure_token().await?;
            let response = self.http.get(url).bearer_auth(&token).send().await?;
            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                self.token_cache.remove(TOKEN_KEY);
                continue;
            }
            if !status.is_success() {
                return Err(ProviderError::Status(status));
            }
            return Ok(response.json().await?);
        }
        Err(ProviderError::Status(reqwest::StatusCode::UNAUTHORIZED))
    }

    /// Extended record for one series, with artwork and season listings.
    pub async fn get_series(&self, id: i64) -> Option<SeriesExtended> {
        if !self.is_enabled() {
            return None;
        }

        let url = format!(
            "{}series/{}/extended?short=false&meta=translations",
            self.base_url(),
            id
        );
        let body: ApiResponse<SeriesExtended> = match self.get_with_token(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(id, error = %e, "tvdb series fetch failed");
                return None;
            }
        };

        let mut series = body.data?;
        series.image = series.image.take().map(|u| fix_image_url(&u));
        for artwork in &mut series.artworks {
            artwork.image = artwork.image.take().map(|u| fix_image_url(&u));
        }
        for season in &mut series.seasons {
            season.image = season.image.take().map(|u| fix_image_url(&u));
        }
        Some(series)
    }
}

#[async_trait]
impl TvdbApi for TvdbClient {
    async fn search_series(&self, keyword: &str) -> Vec<SeriesRecord> {
        let keyword = keyword.trim();
        if keyword.is_empty() || !self.is_enabled() {
            return Vec::new();
        }

        let url = format!(
            "{}search?type=series&query={}",
            self.base_url(),
            urlencoding::encode(keyword)
        );
        let body: ApiResponse<Vec<SeriesRecord>> = match self.get_with_token(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(keyword, error = %e, "tvdb search failed");
                return Vec::new();
            }
        };

        let mut list = body.data.unwrap_or_default();
        for record in &mut list {
            record.image_url = record.image_url.take().map(|u| fix_image_url(&u));
        }
        list
    }

    async fn get_series_episodes(
        &self,
        series_id: i64,
        season_type: SeasonType,
        season_number: i32,
        language: Option<&str>,
    ) -> Vec<EpisodeRecord> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let mut base = format!(
            "{}series/{}/episodes/{}",
            self.base_url(),
            series_id,
            season_type.as_str()
        );
        if let Some(lang) = language.and_then(normalize_language) {
            base.push('/');
            base.push_str(lang);
        }

        let mut episodes = Vec::new();
        for page in 0..MAX_PAGE_COUNT {
            let url = format!("{base}?page={page}&season={season_number}");
            let body: ApiResponse<EpisodesData> = match self.get_with_token(&url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(series_id, page, error = %e, "tvdb episode page failed");
                    break;
                }
            };

            let Some(data) = body.data else { break };
            episodes.extend(data.episodes);

            let has_next = body
                .links
                .and_then(|l| l.next)
                .map(|n| !n.is_empty())
                .unwrap_or(false);
            if !has_next {
                break;
            }
        }

        for episode in &mut episodes {
            episode.image = episode.image.take().map(|u| fix_image_url(&u));
        }
        episodes
    }
}

/// Maps common two-letter codes to the three-letter codes the API expects.
/// Anything else falls back to the untranslated endpoint.
fn normalize_language(language: &str) -> Option<&'static str> {
    let prefix = language.get(..2)?;
    match prefix {
        "zh" => Some("zho"),
        "en" => Some("eng"),
        "ja" => Some("jpn"),
        "ko" => Some("kor"),
        _ => None,
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.is_empty() {
        return DEFAULT_API_HOST.to_string();
    }

    let mut url = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    if !url.ends_with("/v4/") {
        url.push_str("v4/");
    }
    url
}

/// Artwork paths come back both absolute and host-relative.
fn fix_image_url(url: &str) -> String {
    if url.is_empty() || url.starts_with("http") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{ARTWORK_HOST}{url}")
    } else {
        format!("{ARTWORK_HOST}/{url}")
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest {
    apikey: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodesData {
    #[serde(default)]
    episodes: Vec<EpisodeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization_adds_scheme_and_version() {
        assert_eq!(normalize_host(""), "https://api4.thetvdb.com/v4/");
        assert_eq!(normalize_host("api4.thetvdb.com"), "https://api4.thetvdb.com/v4/");
        assert_eq!(
            normalize_host("https://mirror.example/"),
            "https://mirror.example/v4/"
        );
        assert_eq!(
            normalize_host("https://mirror.example/v4/"),
            "https://mirror.example/v4/"
        );
    }

    #[test]
    fn language_codes_map_to_three_letter_forms() {
        assert_eq!(normalize_language("zh-CN"), Some("zho"));
        assert_eq!(normalize_language("en"), Some("eng"));
        assert_eq!(normalize_language("ja"), Some("jpn"));
        assert_eq!(normalize_language("ko-KR"), Some("kor"));
        assert_eq!(normalize_language("fr"), None);
        assert_eq!(normalize_language("z"), None);
    }

    #[test]
    fn image_urls_are_absolutized() {
        assert_eq!(
            fix_image_url("/banners/v4/series/x.jpg"),
            "https://artworks.thetvdb.com/banners/v4/series/x.jpg"
        );
        assert_eq!(
            fix_image_url("banners/v4/series/x.jpg"),
            "https://artworks.thetvdb.com/banners/v4/series/x.jpg"
        );
        assert_eq!(
            fix_image_url("https://artworks.thetvdb.com/banners/x.jpg"),
            "https://artworks.thetvdb.com/banners/x.jpg"
        );
        assert_eq!(fix_image_url(""), "");
    }

    #[test]
    fn api_envelope_tolerates_missing_fields() {
        let login: ApiResponse<LoginData> = serde_json::from_value(serde_json::json!({
            "status": "success",
            "data": { "token": "tok" }
        }))
        .unwrap();
        assert_eq!(login.data.unwrap().token, "tok");

        let empty: ApiResponse<EpisodesData> = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.data.is_none());
        assert!(empty.links.is_none());
    }

    #[test]
    fn episode_record_deserializes_camel_case() {
        let ep: EpisodeRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "seasonNumber": 2,
            "number": 5,
            "aired": "2016-02-15",
            "name": "Gloves Off",
            "airsBeforeSeason": null
        }))
        .unwrap();
        assert_eq!(ep.season_number, 2);
        assert_eq!(ep.number, 5);
        assert_eq!(ep.aired.as_deref(), Some("2016-02-15"));
    }
}
