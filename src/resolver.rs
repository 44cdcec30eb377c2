//! Cross-provider best-match resolution. Given a noisy file-derived
//! name/year, each `guess_*` heuristic asks one provider for candidates and
//! applies that provider's tie-break rules; `resolve` runs them in priority
//! order and returns the first identifier it trusts.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SharedConfig;
use crate::douban::{DoubanApi, MediaKind, Subject};
use crate::tmdb::{TmdbApi, TmdbItem};
use crate::tvdb::{SeriesRecord, TvdbApi};
use crate::utils::{parse_chinese_season_number, to_chinese_number};

/// File-derived candidate the host hands us after its own name parsing.
#[derive(Debug, Clone)]
pub struct MediaLookup {
    pub name: String,
    pub year: Option<i32>,
    pub kind: MediaKind,
}

impl MediaLookup {
    pub fn movie(name: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            name: name.into(),
            year,
            kind: MediaKind::Movie,
        }
    }

    pub fn series(name: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            name: name.into(),
            year,
            kind: MediaKind::Series,
        }
    }
}

/// Identifier in whichever provider's namespace won the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderId {
    Douban(String),
    Tmdb(i64),
    Tvdb(String),
}

pub struct Resolver {
    config: SharedConfig,
    douban: Arc<dyn DoubanApi>,
    tmdb: Arc<dyn TmdbApi>,
    tvdb: Arc<dyn TvdbApi>,
}

impl Resolver {
    pub fn new(
        config: SharedConfig,
        douban: Arc<dyn DoubanApi>,
        tmdb: Arc<dyn TmdbApi>,
        tvdb: Arc<dyn TvdbApi>,
    ) -> Self {
        Self {
            config,
            douban,
            tmdb,
            tvdb,
        }
    }

    /// Primary-provider guess. Under anti-block mode with a known year the
    /// cheap suggest endpoint is consulted first; its looser hits are only
    /// trusted when they line up with the requested name/year. Full search
    /// enforces category and, when known, exact year.
    pub async fn guess_by_douban(&self, lookup: &MediaLookup) -> Option<Subject> {
        let name = lookup.name.trim();
        if name.is_empty() {
            return None;
        }

        if self.config.snapshot().enable_anti_block {
            if let Some(year) = lookup.year {
                let suggestions = self.douban.search_by_suggest(name).await;
                let exact = suggestions
                    .iter()
                    .find(|s| s.name == name && s.year == Some(year));
                if let Some(hit) = exact.or_else(|| {
                    suggestions.iter().find(|s| s.year == Some(year))
                }) {
                    debug!(name, sid = %hit.sid, "matched via suggest");
                    return self.douban.get_subject(&hit.sid).await;
                }
            }
        }

        let results = self.douban.search(name).await;
        let hit = results.into_iter().find(|s| {
            s.category == lookup.kind
                && match lookup.year {
                    Some(year) => s.year == Some(year),
                    None => true,
                }
        })?;
        info!(name, sid = %hit.sid, "matched via search");
        Some(hit)
    }

    /// Season lookup by premiere year. A season-suffix number parsed from a
    /// candidate's title ("… 第二季") must agree with the requested season,
    /// otherwise a same-year sibling season would be accepted.
    pub async fn guess_douban_season_by_year(
        &self,
        name: &str,
        year: i32,
        season_number: Option<i32>,
    ) -> Option<Subject> {
        let lookup = MediaLookup::series(name, Some(year));
        let subject = self.guess_by_douban(&lookup).await?;
        if let (Some(wanted), Some(found)) =
            (season_number, parse_chinese_season_number(&subject.name))
        {
            if wanted != found {
                debug!(name, year, wanted, found, "season suffix mismatch, rejecting");
                return None;
            }
        }
        Some(subject)
    }

    /// Season lookup by title shape: accepts "<series>N" or the Chinese
    /// ordinal form "<series> 第N季", requiring a rated series entry so that
    /// unreleased placeholders are not matched.
    pub async fn guess_douban_season_by_name(
        &self,
        name: &str,
        season_number: i32,
    ) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        // Season 1 rarely carries a numeral in its title.
        let numbered_name = if season_number == 1 {
            name.to_string()
        } else {
            format!("{name}{season_number}")
        };
        let chinese_name = format!("{name} 第{}季", to_chinese_number(season_number));

        let results = self.douban.search(name).await;
        results
            .into_iter()
            .find(|s| {
                s.category == MediaKind::Series
                    && s.rating > 0.0
                    && (s.name == numbered_name || s.name == chinese_name)
            })
            .map(|s| s.sid)
    }

    /// Fallback-catalog guess, used when the primary provider comes up dry.
    pub async fn guess_by_tmdb(&self, lookup: &MediaLookup) -> Option<TmdbItem> {
        let name = lookup.name.trim();
        if name.is_empty() || !self.config.snapshot().enable_tmdb_match {
            return None;
        }

        match lookup.kind {
            MediaKind::Movie => {
                let results = self.tmdb.search_movie(name).await;
                results
                    .iter()
                    .find(|r| r.name == name || r.original_name == name)
                    .or_else(|| results.first())
                    .cloned()
            }
            MediaKind::Series => {
                let results = self.tmdb.search_series(name).await;
                let titled = |r: &TmdbItem| r.name == name || r.original_name == name;
                results
                    .iter()
                    .find(|r| titled(r) && lookup.year.is_some() && r.year == lookup.year)
                    .or_else(|| {
                        lookup
                            .year
                            .and_then(|y| results.iter().find(|r| r.year == Some(y)))
                    })
                    .or_else(|| results.iter().find(|r| titled(r)))
                    .or_else(|| results.first())
                    .cloned()
            }
        }
    }

    /// Series guess against the subscription catalog.
    pub async fn guess_by_tvdb(&self, name: &str, year: Option<i32>) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let results = self.tvdb.search_series(name).await;
        let by_year = year.and_then(|y| {
            results
                .iter()
                .find(|r| r.name == name && r.year.as_deref() == Some(y.to_string().as_str()))
        });
        by_year
            .or_else(|| results.iter().find(|r| r.name == name))
            .or_else(|| results.first())
            .map(series_identifier)
    }

    /// Runs the provider heuristics in priority order: the primary scraped
    /// provider first, then the fallback catalog when enabled.
    pub async fn resolve(&self, lookup: &MediaLookup) -> Option<ProviderId> {
        if let Some(subject) = self.guess_by_douban(lookup).await {
            return Some(ProviderId::Douban(subject.sid));
        }
        if let Some(item) = self.guess_by_tmdb(lookup).await {
            info!(name = %lookup.name, id = item.id, "falling back to catalog match");
            return Some(ProviderId::Tmdb(item.id));
        }
        None
    }
}

fn series_identifier(record: &SeriesRecord) -> String {
    record
        .tvdb_id
        .clone()
        .unwrap_or_else(|| record.id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::Settings;
    use crate::tvdb::{EpisodeRecord, SeasonType};

    #[derive(Default)]
    struct FakeDouban {
        suggest: Vec<Subject>,
        search: Vec<Subject>,
        subjects: Vec<Subject>,
        suggest_calls: AtomicUsize,
        search_calls: AtomicUsize,
    }

    #[async_trait]
    impl DoubanApi for FakeDouban {
        async fn search(&self, _keyword: &str) -> Vec<Subject> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.search.clone()
        }

        async fn search_by_suggest(&self, _keyword: &str) -> Vec<Subject> {
            self.suggest_calls.fetch_add(1, Ordering::SeqCst);
            self.suggest.clone()
        }

        async fn get_subject(&self, sid: &str) -> Option<Subject> {
            self.subjects.iter().find(|s| s.sid == sid).cloned()
        }
    }

    #[derive(Default)]
    struct FakeTmdb {
        movies: Vec<TmdbItem>,
        series: Vec<TmdbItem>,
    }

    #[async_trait]
    impl TmdbApi for FakeTmdb {
        async fn search_movie(&self, _query: &str) -> Vec<TmdbItem> {
            self.movies.clone()
        }

        async fn search_series(&self, _query: &str) -> Vec<TmdbItem> {
            self.series.clone()
        }
    }

    #[derive(Default)]
    struct FakeTvdb {
        series: Vec<SeriesRecord>,
    }

    #[async_trait]
    impl TvdbApi for FakeTvdb {
        async fn search_series(&self, _keyword: &str) -> Vec<SeriesRecord> {
            self.series.clone()
        }

        async fn get_series_episodes(
            &self,
            _series_id: i64,
            _season_type: SeasonType,
            _season_number: i32,
            _language: Option<&str>,
        ) -> Vec<EpisodeRecord> {
            Vec::new()
        }
    }

    fn subject(sid: &str, name: &str, year: i32, kind: MediaKind, rating: f32) -> Subject {
        Subject {
            sid: sid.to_string(),
            name: name.to_string(),
            year: Some(year),
            category: kind,
            rating,
            ..Default::default()
        }
    }

    fn resolver(config: SharedConfig, douban: FakeDouban, tmdb: FakeTmdb) -> Resolver {
        Resolver::new(
            config,
            Arc::new(douban),
            Arc::new(tmdb),
            Arc::new(FakeTvdb::default()),
        )
    }

    #[tokio::test]
    async fn anti_block_prefers_exact_suggest_match() {
        let config = SharedConfig::new(Settings {
            enable_anti_block: true,
            ..Default::default()
        });
        let wanted = subject("1295038", "哈利波特与魔法石", 2001, MediaKind::Movie, 9.2);
        let douban = FakeDouban {
            suggest: vec![
                subject("999", "哈利波特与密室", 2001, MediaKind::Movie, 0.0),
                wanted.clone(),
            ],
            subjects: vec![wanted],
            ..Default::default()
        };
        let r = resolver(config, douban, FakeTmdb::default());

        let hit = r
            .guess_by_douban(&MediaLookup::movie("哈利波特与魔法石", Some(2001)))
            .await
            .unwrap();
        assert_eq!(hit.sid, "1295038");
        assert_eq!(hit.year, Some(2001));
    }

    #[tokio::test]
    async fn suggest_is_skipped_without_anti_block() {
        let douban = Arc::new(FakeDouban {
            search: vec![subject("42", "某电影", 2010, MediaKind::Movie, 7.0)],
            ..Default::default()
        });
        let r = Resolver::new(
            SharedConfig::default(),
            douban.clone(),
            Arc::new(FakeTmdb::default()),
            Arc::new(FakeTvdb::default()),
        );

        let hit = r
            .guess_by_douban(&MediaLookup::movie("某电影", Some(2010)))
            .await
            .unwrap();
        assert_eq!(hit.sid, "42");
        assert_eq!(douban.suggest_calls.load(Ordering::SeqCst), 0);
        assert_eq!(douban.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_search_requires_exact_year_when_known() {
        let douban = FakeDouban {
            search: vec![subject("1", "某电影", 2009, MediaKind::Movie, 7.0)],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), douban, FakeTmdb::default());

        assert!(r
            .guess_by_douban(&MediaLookup::movie("某电影", Some(2010)))
            .await
            .is_none());
        assert!(r
            .guess_by_douban(&MediaLookup::movie("某电影", None))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn category_mismatch_is_rejected() {
        let douban = FakeDouban {
            search: vec![subject("1", "某剧", 2010, MediaKind::Series, 8.0)],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), douban, FakeTmdb::default());

        assert!(r
            .guess_by_douban(&MediaLookup::movie("某剧", Some(2010)))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn season_year_guess_rejects_wrong_season_suffix() {
        let douban = FakeDouban {
            search: vec![subject("2", "风骚律师 第三季", 2017, MediaKind::Series, 9.5)],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), douban, FakeTmdb::default());

        assert!(r
            .guess_douban_season_by_year("风骚律师", 2017, Some(2))
            .await
            .is_none());
        assert!(r
            .guess_douban_season_by_year("风骚律师", 2017, Some(3))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn season_name_guess_accepts_both_title_shapes() {
        let douban = FakeDouban {
            search: vec![
                subject("10", "爱死机", 2019, MediaKind::Series, 9.2),
                subject("11", "爱死机 第二季", 2021, MediaKind::Series, 8.3),
                subject("12", "爱死机3", 2022, MediaKind::Series, 8.5),
            ],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), douban, FakeTmdb::default());

        assert_eq!(
            r.guess_douban_season_by_name("爱死机", 1).await,
            Some("10".to_string())
        );
        assert_eq!(
            r.guess_douban_season_by_name("爱死机", 2).await,
            Some("11".to_string())
        );
        assert_eq!(
            r.guess_douban_season_by_name("爱死机", 3).await,
            Some("12".to_string())
        );
        assert_eq!(r.guess_douban_season_by_name("爱死机", 4).await, None);
    }

    #[tokio::test]
    async fn season_name_guess_requires_a_rating() {
        let douban = FakeDouban {
            search: vec![subject("11", "爱死机 第二季", 2021, MediaKind::Series, 0.0)],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), douban, FakeTmdb::default());
        assert_eq!(r.guess_douban_season_by_name("爱死机", 2).await, None);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_catalog_when_enabled() {
        let tmdb = FakeTmdb {
            movies: vec![TmdbItem {
                id: 671,
                name: "哈利·波特与魔法石".to_string(),
                original_name: "Harry Potter and the Philosopher's Stone".to_string(),
                year: Some(2001),
            }],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), FakeDouban::default(), tmdb);

        let id = r
            .resolve(&MediaLookup::movie("哈利·波特与魔法石", Some(2001)))
            .await;
        assert_eq!(id, Some(ProviderId::Tmdb(671)));

        r.config.modify(|s| s.enable_tmdb_match = false);
        let id = r
            .resolve(&MediaLookup::movie("哈利·波特与魔法石", Some(2001)))
            .await;
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn tmdb_series_guess_matches_on_original_name() {
        let tmdb = FakeTmdb {
            series: vec![
                TmdbItem {
                    id: 100,
                    name: "无关条目".to_string(),
                    original_name: "Unrelated".to_string(),
                    year: Some(2014),
                },
                TmdbItem {
                    id: 60059,
                    name: "风骚律师".to_string(),
                    original_name: "Better Call Saul".to_string(),
                    year: Some(2015),
                },
            ],
            ..Default::default()
        };
        let r = resolver(SharedConfig::default(), FakeDouban::default(), tmdb);

        // The localized listing still matches a query in the original title.
        let hit = r
            .guess_by_tmdb(&MediaLookup::series("Better Call Saul", Some(2015)))
            .await
            .unwrap();
        assert_eq!(hit.id, 60059);

        let hit = r
            .guess_by_tmdb(&MediaLookup::series("Better Call Saul", None))
            .await
            .unwrap();
        assert_eq!(hit.id, 60059);
    }

    #[tokio::test]
    async fn tvdb_guess_prefers_exact_name_and_year() {
        let tvdb = FakeTvdb {
            series: vec![
                SeriesRecord {
                    id: 1,
                    tvdb_id: Some("273181".to_string()),
                    name: "Better Call Saul".to_string(),
                    year: Some("2015".to_string()),
                    ..Default::default()
                },
                SeriesRecord {
                    id: 2,
                    tvdb_id: None,
                    name: "Better Call Saul Extras".to_string(),
                    year: Some("2016".to_string()),
                    ..Default::default()
                },
            ],
        };
        let r = Resolver::new(
            SharedConfig::default(),
            Arc::new(FakeDouban::default()),
            Arc::new(FakeTmdb::default()),
            Arc::new(tvdb),
        );

        assert_eq!(
            r.guess_by_tvdb("Better Call Saul", Some(2015)).await,
            Some("273181".to_string())
        );
        // Unknown year still lands on the exact-name candidate.
        assert_eq!(
            r.guess_by_tvdb("Better Call Saul", None).await,
            Some("273181".to_string())
        );
    }

    #[tokio::test]
    async fn empty_name_short_circuits_every_guess() {
        let r = resolver(
            SharedConfig::default(),
            FakeDouban::default(),
            FakeTmdb::default(),
        );
        assert!(r.guess_by_douban(&MediaLookup::movie("", None)).await.is_none());
        assert!(r.guess_by_tmdb(&MediaLookup::movie("  ", None)).await.is_none());
        assert!(r.guess_by_tvdb("", None).await.is_none());
        assert!(r.guess_douban_season_by_name(" ", 1).await.is_none());
    }
}
