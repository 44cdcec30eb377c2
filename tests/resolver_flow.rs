//! End-to-end resolution against a mocked scraped provider: suggest-first
//! matching under anti-block pacing, then the detail fetch.

use std::sync::Arc;

use cinescout::config::{Settings, SharedConfig};
use cinescout::douban::{DoubanClient, DoubanHosts, MediaKind};
use cinescout::tmdb::TmdbClient;
use cinescout::tvdb::TvdbClient;
use cinescout::{MediaLookup, ProviderId, Resolver};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUBJECT_PAGE: &str = r#"<html>
<head>
<title>哈利·波特与魔法石 (豆瓣)</title>
<meta name="keywords" content="哈利·波特与魔法石,Harry Potter and the Sorcerer's Stone">
</head>
<body><div id="content">
<h1><span>哈利·波特与魔法石 Harry Potter and the Sorcerer's Stone</span><span class="year">(2001)</span></h1>
<div id="info">导演: 克里斯·哥伦布
类型: 奇幻 / 冒险
上映日期: 2002-01-26(中国大陆) / 2001-11-16(美国)
IMDb: tt0241527
</div>
<div class="rating_self"><strong class="rating_num">9.2</strong></div>
</div></body></html>"#;

#[tokio::test]
async fn anti_block_resolution_prefers_exact_suggest_match() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/j/search_suggest"))
        .and(query_param("q", "哈利波特与魔法石"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cards": [
                {
                    "type": "book",
                    "title": "哈利·波特与魔法石",
                    "url": "https://book.douban.com/subject/1037546/",
                    "year": "2001"
                },
                {
                    "type": "movie",
                    "title": "哈利·波特与密室",
                    "url": "https://movie.douban.com/subject/1296996/",
                    "year": "2002"
                },
                {
                    "type": "movie",
                    "title": "哈利波特与魔法石",
                    "url": "https://movie.douban.com/subject/1295038/",
                    "year": "2001",
                    "sub_title": "Harry Potter and the Sorcerer's Stone"
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/subject/1295038/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBJECT_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    // Cookies put the client in the authenticated pacing mode, keeping the
    // inter-request delay short enough for a test.
    let config = SharedConfig::new(Settings {
        enable_anti_block: true,
        douban_cookies: "bid=test".to_string(),
        enable_tmdb_match: false,
        ..Default::default()
    });
    let douban = DoubanClient::with_hosts(
        config.clone(),
        DoubanHosts {
            www: server.uri(),
            movie: server.uri(),
        },
    );
    let resolver = Resolver::new(
        config.clone(),
        Arc::new(douban),
        Arc::new(TmdbClient::new(config.clone())),
        Arc::new(TvdbClient::new(config)),
    );

    let lookup = MediaLookup::movie("哈利波特与魔法石", Some(2001));
    let subject = resolver.guess_by_douban(&lookup).await.unwrap();
    assert_eq!(subject.sid, "1295038");
    assert_eq!(subject.category, MediaKind::Movie);
    assert_eq!(subject.year, Some(2001));

    // The full resolve path answers from the subject cache now.
    assert_eq!(
        resolver.resolve(&lookup).await,
        Some(ProviderId::Douban("1295038".to_string()))
    );
}
