use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SharedConfig;
use crate::error::{ProviderError, Result};

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Search hit from the fallback catalog, trimmed to what name/year matching
/// needs.
#[derive(Debug, Clone)]
pub struct TmdbItem {
    pub id: i64,
    pub name: String,
    pub original_name: String,
    pub year: Option<i32>,
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn search_movie(&self, query: &str) -> Vec<TmdbItem>;
    async fn search_series(&self, query: &str) -> Vec<TmdbItem>;
}

/// Fallback-catalog search client. Disabled (returns nothing) until an API
/// key is configured; the key is re-read on every call so a settings edit
/// needs no restart.
pub struct TmdbClient {
    config: SharedConfig,
    http: reqwest::Client,
}

impl TmdbClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn base_url(&self) -> String {
        let host = self.config.snapshot().tmdb_host.trim().to_string();
        if host.is_empty() {
            TMDB_BASE.to_string()
        } else {
            host.trim_end_matches('/').to_string()
        }
    }

    async fn search(&self, kind: &str, query: &str) -> Result<Vec<TmdbItem>> {
        let api_key = self.config.snapshot().tmdb_api_key.trim().to_string();
        if api_key.is_empty() {
            debug!("tmdb search skipped, no api key configured");
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/search/{}?api_key={}&query={}&language=zh-CN",
            self.base_url(),
            kind,
            api_key,
            urlencoding::encode(query)
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }

        let data: SearchResponse = response.json().await?;
        Ok(data.results.into_iter().map(SearchResult::into_item).collect())
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn search_movie(&self, query: &str) -> Vec<TmdbItem> {
        match self.search("movie", query).await {
            Ok(list) => list,
            Err(e) => {
                warn!(query, error = %e, "tmdb movie search failed");
                Vec::new()
            }
        }
    }

    async fn search_series(&self, query: &str) -> Vec<TmdbItem> {
        match self.search("tv", query).await {
            Ok(list) => list,
            Err(e) => {
                warn!(query, error = %e, "tmdb series search failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Movie results carry `title`, series results `name`; one DTO covers both.
#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
}

impl SearchResult {
    fn into_item(self) -> TmdbItem {
        let year = self
            .release_date
            .as_deref()
            .or(self.first_air_date.as_deref())
            .and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok());
        TmdbItem {
            id: self.id,
            name: self.title.or(self.name).unwrap_or_default(),
            original_name: self.original_title.or(self.original_name).unwrap_or_default(),
            year,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_result_maps_movie_and_series_shapes() {
        let movie: SearchResult = serde_json::from_value(serde_json::json!({
            "id": 671,
            "title": "哈利·波特与魔法石",
            "original_title": "Harry Potter and the Philosopher's Stone",
            "release_date": "2001-11-16"
        }))
        .unwrap();
        let item = movie.into_item();
        assert_eq!(item.id, 671);
        assert_eq!(item.name, "哈利·波特与魔法石");
        assert_eq!(item.year, Some(2001));

        let series: SearchResult = serde_json::from_value(serde_json::json!({
            "id": 60059,
            "name": "风骚律师",
            "original_name": "Better Call Saul",
            "first_air_date": "2015-02-08"
        }))
        .unwrap();
        let item = series.into_item();
        assert_eq!(item.original_name, "Better Call Saul");
        assert_eq!(item.year, Some(2015));
    }

    #[test]
    fn missing_dates_leave_year_unset() {
        let result: SearchResult =
            serde_json::from_value(serde_json::json!({ "id": 1, "title": "x" })).unwrap();
        assert_eq!(result.into_item().year, None);
    }
}
