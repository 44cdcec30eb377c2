//! Field-extraction grammar for the scraped provider's HTML pages: one
//! selector or regex per field, applied to the parsed document. Everything
//! here is pure and testable against fixed fixtures.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::text::{format_overview, parse_celebrity_name, split_tags};
use super::{Celebrity, MediaKind, Photo, Subject};

static RE_SID: Lazy<Regex> = Lazy::new(|| Regex::new(r"sid: (\d+?),").unwrap());
static RE_CAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.+?)\]").unwrap());
static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"([12][890][0-9][0-9])").unwrap());
static RE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d+?)/").unwrap());
static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<title>([\s\S]+?)</title>").unwrap());
static RE_KEYWORD_META: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<meta name="keywords" content="(.+?)""#).unwrap());
static RE_ORIGINAL_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"原名[:：](.+?)\s*?/").unwrap());
static RE_DIRECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"导演: (.+?)\n").unwrap());
static RE_WRITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"编剧: (.+?)\n").unwrap());
static RE_ACTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"主演: (.+?)\n").unwrap());
static RE_GENRE: Lazy<Regex> = Lazy::new(|| Regex::new(r"类型: (.+?)\n").unwrap());
static RE_COUNTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"制片国家/地区: (.+?)\n").unwrap());
static RE_LANGUAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"语言: (.+?)\n").unwrap());
static RE_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"片长: (.+?)\n").unwrap());
static RE_SCREEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(上映日期|首播): (.+?)\n").unwrap());
static RE_SUBNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"又名: (.+?)\n").unwrap());
static RE_IMDB: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)IMDb: (tt\d+)").unwrap());
static RE_SITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"官方网站: (.+?)\n").unwrap());
static RE_ROLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([饰|配]?\s*?(.+?)\)").unwrap());
static RE_BACKGROUND_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"url\(([^)]+?)\)").unwrap());
static RE_LIFEDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.+?) 至 (.+)").unwrap());
static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_IMG_HOST: Lazy<Regex> = Lazy::new(|| Regex::new(r"//(img\d+?)\.").unwrap());
static RE_PHOTO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/photo/(\d+?)/").unwrap());
static RE_LOGIN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"db-usr-profile[^>]*>[\s\S]*?<h1>([^<]*)<").unwrap());
static RE_SUGGEST_SID: Lazy<Regex> = Lazy::new(|| Regex::new(r"subject/(\d+?)/").unwrap());

static SEL_SEARCH_RESULT: Lazy<Selector> = Lazy::new(|| sel("div.result-list .result"));
static SEL_RATING_INFO: Lazy<Selector> = Lazy::new(|| sel("div.rating-info"));
static SEL_RATING_NUMS: Lazy<Selector> = Lazy::new(|| sel("div.rating-info>.rating_nums"));
static SEL_RATING_SPAN: Lazy<Selector> = Lazy::new(|| sel("div.rating-info>span"));
static SEL_RESULT_IMG: Lazy<Selector> = Lazy::new(|| sel("a.nbg>img"));
static SEL_TITLE_LINK: Lazy<Selector> = Lazy::new(|| sel("div.title a"));
static SEL_TITLE_CAT: Lazy<Selector> = Lazy::new(|| sel("div.title>h3>span"));
static SEL_RESULT_DESC: Lazy<Selector> = Lazy::new(|| sel("div.content>p"));
static SEL_CONTENT: Lazy<Selector> = Lazy::new(|| sel("#content"));
static SEL_H1_SPAN: Lazy<Selector> = Lazy::new(|| sel("h1>span"));
static SEL_H1_YEAR: Lazy<Selector> = Lazy::new(|| sel("h1>span.year"));
static SEL_RATING_NUM: Lazy<Selector> = Lazy::new(|| sel("div.rating_self strong.rating_num"));
static SEL_POSTER_IMG: Lazy<Selector> = Lazy::new(|| sel("a.nbgnbg>img"));
static SEL_EPISODE_LIST: Lazy<Selector> = Lazy::new(|| sel("div.episode_list"));
static SEL_INTRO_ALL: Lazy<Selector> = Lazy::new(|| sel("div#link-report-intra>span.all"));
static SEL_INTRO: Lazy<Selector> = Lazy::new(|| sel("div#link-report-intra>span"));
static SEL_INFO: Lazy<Selector> = Lazy::new(|| sel("#info"));
static SEL_SUBJECT_CELEBRITY: Lazy<Selector> = Lazy::new(|| sel("#celebrities li.celebrity"));
static SEL_CELEBRITY_NAME_LINK: Lazy<Selector> = Lazy::new(|| sel("div.info a.name"));
static SEL_CELEBRITY_AVATAR: Lazy<Selector> = Lazy::new(|| sel("div.avatar"));
static SEL_CELEBRITY_ROLE: Lazy<Selector> = Lazy::new(|| sel("div.info span.role"));
static SEL_CELEBRITY_SECTION: Lazy<Selector> = Lazy::new(|| sel("div#celebrities>.list-wrapper"));
static SEL_H2: Lazy<Selector> = Lazy::new(|| sel("h2"));
static SEL_SECTION_CELEBRITY: Lazy<Selector> =
    Lazy::new(|| sel("ul.celebrities-list li.celebrity"));
static SEL_AVATAR_IMG: Lazy<Selector> = Lazy::new(|| sel("img.avatar"));
static SEL_SUBJECT_NAME: Lazy<Selector> = Lazy::new(|| sel("h1.subject-name"));
static SEL_PROPERTY_ITEM: Lazy<Selector> = Lazy::new(|| sel("ul.subject-property>li"));
static SEL_PROPERTY_LABEL: Lazy<Selector> = Lazy::new(|| sel("span.label"));
static SEL_PROPERTY_VALUE: Lazy<Selector> = Lazy::new(|| sel("span.value"));
static SEL_PERSON_INTRO: Lazy<Selector> = Lazy::new(|| sel("section.subject-intro div.content"));
static SEL_PHOTO_ITEM: Lazy<Selector> = Lazy::new(|| sel(".poster-col3>li"));
static SEL_A: Lazy<Selector> = Lazy::new(|| sel("a"));
static SEL_IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static SEL_PHOTO_PROP: Lazy<Selector> = Lazy::new(|| sel("div.prop"));
static SEL_CELEBRITY_RESULT: Lazy<Selector> = Lazy::new(|| sel("div.article .result"));
static SEL_RESULT_PIC: Lazy<Selector> = Lazy::new(|| sel("div.pic img"));
static SEL_RESULT_H3_LINK: Lazy<Selector> = Lazy::new(|| sel("h3>a"));

/// Marker the provider's block page carries; used only for diagnostics.
pub(crate) const RISK_CONTROL_MARKER: &str = "sec.douban.com";

fn sel(css: &str) -> Selector {
    // Inputs are literals; a parse failure is a programming error.
    Selector::parse(css).unwrap()
}

fn match1(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn text_of(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector).next().map(|n| n.text().collect())
}

fn attr_of(el: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    el.select(selector)
        .next()
        .and_then(|n| n.value().attr(attr))
        .map(str::to_string)
}

pub(crate) fn extract_suggest_sid(url: &str) -> String {
    match1(&RE_SUGGEST_SID, url)
}

pub(crate) fn parse_year(text: &str) -> Option<i32> {
    match1(&RE_YEAR, text).parse().ok()
}

pub(crate) fn parse_search_results(html: &str) -> Vec<Subject> {
    let doc = Html::parse_document(html);
    let mut list = Vec::new();

    for el in doc.select(&SEL_SEARCH_RESULT) {
        let rating_info = text_of(el, &SEL_RATING_INFO).unwrap_or_default();
        if rating_info.contains("尚未播出") {
            continue;
        }

        let cat_label = match1(&RE_CAT, &text_of(el, &SEL_TITLE_CAT).unwrap_or_default());
        let Some(category) = MediaKind::from_label(&cat_label) else {
            continue;
        };

        let onclick = attr_of(el, &SEL_TITLE_LINK, "onclick").unwrap_or_default();
        let sid = match1(&RE_SID, &onclick);
        let name = text_of(el, &SEL_TITLE_LINK)
            .unwrap_or_default()
            .trim()
            .to_string();
        let rating = text_of(el, &SEL_RATING_NUMS)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0);
        // The trailing span of the rating block holds "year / 原名:... / cast".
        let subject_str = el
            .select(&SEL_RATING_SPAN)
            .last()
            .map(|n| n.text().collect::<String>())
            .unwrap_or_default();
        let original_name = match1(&RE_ORIGINAL_NAME, &subject_str);

        list.push(Subject {
            sid,
            original_name: if original_name.is_empty() {
                name.clone()
            } else {
                original_name.trim().to_string()
            },
            name,
            rating,
            year: parse_year(&subject_str),
            img: attr_of(el, &SEL_RESULT_IMG, "src").unwrap_or_default(),
            intro: text_of(el, &SEL_RESULT_DESC)
                .unwrap_or_default()
                .trim()
                .to_string(),
            category,
            ..Default::default()
        });
    }

    list
}

/// Page title, preferring the first `<meta keywords>` segment over `<title>`.
fn page_title(body: &str) -> String {
    let keyword = match1(&RE_KEYWORD_META, body);
    if let Some(first) = keyword.split(',').next() {
        if !first.trim().is_empty() {
            return first.trim().to_string();
        }
    }
    match1(&RE_TITLE, body).replace("(豆瓣)", "").trim().to_string()
}

/// Extracts a full subject record from a detail page. Returns `None` when the
/// primary content container is missing, which signals an anti-scraping page
/// or a structural change rather than a genuine not-found.
pub(crate) fn parse_subject(body: &str, sid: &str) -> Option<Subject> {
    let doc = Html::parse_document(body);
    let content = doc.select(&SEL_CONTENT).next()?;

    let name = page_title(body);
    let name_str = text_of(content, &SEL_H1_SPAN).unwrap_or_default();
    let original_name = name_str.replace(&name, "").trim().to_string();
    let year = parse_year(&text_of(content, &SEL_H1_YEAR).unwrap_or_default());
    let rating = text_of(content, &SEL_RATING_NUM)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0.0);
    let category = if content.select(&SEL_EPISODE_LIST).next().is_some() {
        MediaKind::Series
    } else {
        MediaKind::Movie
    };
    let intro = text_of(content, &SEL_INTRO_ALL)
        .or_else(|| text_of(content, &SEL_INTRO))
        .unwrap_or_default();

    let info = text_of(content, &SEL_INFO).unwrap_or_default();
    let screen = RE_SCREEN
        .captures(&info)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut celebrities = Vec::new();
    for node in content.select(&SEL_SUBJECT_CELEBRITY) {
        let href = attr_of(node, &SEL_CELEBRITY_NAME_LINK, "href").unwrap_or_default();
        let style = attr_of(node, &SEL_CELEBRITY_AVATAR, "style").unwrap_or_default();
        celebrities.push(Celebrity {
            id: match1(&RE_ID, &href),
            name: text_of(node, &SEL_CELEBRITY_NAME_LINK)
                .unwrap_or_default()
                .trim()
                .to_string(),
            role: text_of(node, &SEL_CELEBRITY_ROLE)
                .unwrap_or_default()
                .trim()
                .to_string(),
            img: match1(&RE_BACKGROUND_IMAGE, &style),
            ..Default::default()
        });
    }

    Some(Subject {
        sid: sid.to_string(),
        name,
        original_name,
        year,
        rating,
        img: attr_of(content, &SEL_POSTER_IMG, "src").unwrap_or_default(),
        intro: format_overview(&intro),
        subnames: split_tags(&match1(&RE_SUBNAME, &info)),
        director: match1(&RE_DIRECTOR, &info).trim().to_string(),
        writer: match1(&RE_WRITER, &info).trim().to_string(),
        actor: match1(&RE_ACTOR, &info).trim().to_string(),
        genres: split_tags(&match1(&RE_GENRE, &info)),
        countries: split_tags(&match1(&RE_COUNTRY, &info)),
        languages: split_tags(&match1(&RE_LANGUAGE, &info)),
        duration: match1(&RE_DURATION, &info).trim().to_string(),
        screen: screen.trim().to_string(),
        site: match1(&RE_SITE, &info).trim().to_string(),
        imdb: match1(&RE_IMDB, &info),
        category,
        celebrities,
    })
}

/// Cast/crew listing page, restricted to director/actor sections.
pub(crate) fn parse_celebrities_page(html: &str) -> Vec<Celebrity> {
    let doc = Html::parse_document(html);
    let mut list = Vec::new();

    for section in doc.select(&SEL_CELEBRITY_SECTION) {
        let heading = text_of(section, &SEL_H2).unwrap_or_default();
        if !heading.contains("导演") && !heading.contains("演员") {
            continue;
        }

        for node in section.select(&SEL_SECTION_CELEBRITY) {
            let raw_name = text_of(node, &SEL_CELEBRITY_NAME_LINK).unwrap_or_default();
            let name = parse_celebrity_name(&raw_name);
            // Some cast entries carry no name at all.
            if name.is_empty() {
                continue;
            }

            let href = attr_of(node, &SEL_CELEBRITY_NAME_LINK, "href").unwrap_or_default();
            let style = attr_of(node, &SEL_CELEBRITY_AVATAR, "style").unwrap_or_default();
            let role_str = text_of(node, &SEL_CELEBRITY_ROLE).unwrap_or_default();
            let role_type = {
                let mut parts = role_str.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(first), Some(_)) => first.to_string(),
                    _ => String::new(),
                }
            };
            let mut role = match1(&RE_ROLE, &role_str).trim().to_string();
            if role.is_empty() {
                role = role_type.clone();
            }

            list.push(Celebrity {
                id: match1(&RE_ID, &href),
                name,
                role,
                role_type,
                img: match1(&RE_BACKGROUND_IMAGE, &style),
                ..Default::default()
            });
        }
    }

    list
}

/// Person profile page. `None` when the content container is absent.
pub(crate) fn parse_celebrity_page(body: &str, id: &str) -> Option<Celebrity> {
    let doc = Html::parse_document(body);
    let content = doc.select(&SEL_CONTENT).next()?;

    let name_str = text_of(content, &SEL_SUBJECT_NAME).unwrap_or_default();
    let name = parse_celebrity_name(&name_str);
    let mut celebrity = Celebrity {
        id: id.to_string(),
        foreign_name: name_str.replace(&name, "").trim().to_string(),
        name,
        img: attr_of(content, &SEL_AVATAR_IMG, "src").unwrap_or_default(),
        ..Default::default()
    };

    for li in content.select(&SEL_PROPERTY_ITEM) {
        let label = text_of(li, &SEL_PROPERTY_LABEL).unwrap_or_default();
        let value = text_of(li, &SEL_PROPERTY_VALUE)
            .unwrap_or_default()
            .trim()
            .to_string();
        match label.trim() {
            "性别:" => celebrity.gender = value,
            "星座:" => celebrity.constellation = value,
            "出生日期:" => celebrity.birthdate = value,
            "去世日期:" => celebrity.deathdate = value,
            "生卒日期:" => {
                if let Some(caps) = RE_LIFEDATE.captures(&value) {
                    celebrity.birthdate = caps[1].trim().to_string();
                    celebrity.deathdate = caps[2].trim().to_string();
                }
            }
            "出生地:" => celebrity.birthplace = value,
            "职业:" => celebrity.role = value,
            "更多外文名:" => celebrity.nickname = value,
            "IMDb编号:" => celebrity.imdb = value,
            _ => {}
        }
    }

    // Paragraph breaks become newlines before the remaining markup goes.
    let intro_html = content
        .select(&SEL_PERSON_INTRO)
        .next()
        .map(|n| n.inner_html())
        .unwrap_or_default();
    let with_breaks = intro_html.replace("</p>", "\n");
    let intro = RE_HTML_TAG.replace_all(&with_breaks, "");
    celebrity.intro = format_overview(&intro);

    Some(celebrity)
}

pub(crate) fn parse_celebrity_photos(html: &str) -> Vec<Photo> {
    let doc = Html::parse_document(html);
    let mut list = Vec::new();

    for node in doc.select(&SEL_PHOTO_ITEM) {
        let href = attr_of(node, &SEL_A, "href").unwrap_or_default();
        let mut photo = Photo {
            id: match1(&RE_PHOTO_ID, &href),
            raw: attr_of(node, &SEL_IMG, "src"),
            ..Default::default()
        };
        photo.set_size(text_of(node, &SEL_PHOTO_PROP).unwrap_or_default().trim());
        list.push(photo);
    }

    list
}

/// The wallpaper listing only exposes thumbnails; full-size URLs are
/// synthesized from the photo id and the image-host token of the thumbnail.
pub(crate) fn parse_wallpapers(html: &str) -> Vec<Photo> {
    let doc = Html::parse_document(html);
    let mut list = Vec::new();

    for node in doc.select(&SEL_PHOTO_ITEM) {
        let id = node.value().attr("data-id").unwrap_or_default().to_string();
        let thumb = attr_of(node, &SEL_IMG, "src").unwrap_or_default();
        let host = {
            let found = match1(&RE_IMG_HOST, &thumb);
            if found.is_empty() {
                "img2".to_string()
            } else {
                found
            }
        };

        let mut photo = Photo {
            small: Some(wallpaper_url(&host, "s", &id)),
            medium: Some(wallpaper_url(&host, "m", &id)),
            large: Some(wallpaper_url(&host, "l", &id)),
            raw: Some(wallpaper_url(&host, "raw", &id)),
            id,
            ..Default::default()
        };
        photo.set_size(text_of(node, &SEL_PHOTO_PROP).unwrap_or_default().trim());
        list.push(photo);
    }

    list
}

fn wallpaper_url(host: &str, size: &str, id: &str) -> String {
    format!("https://{host}.doubanio.com/view/photo/{size}/public/p{id}.jpg")
}

pub(crate) fn parse_celebrity_search(html: &str) -> Vec<Celebrity> {
    let doc = Html::parse_document(html);
    let mut list = Vec::new();

    for el in doc.select(&SEL_CELEBRITY_RESULT) {
        let href = attr_of(el, &SEL_RESULT_H3_LINK, "href").unwrap_or_default();
        let name_str = text_of(el, &SEL_RESULT_H3_LINK)
            .unwrap_or_default()
            .trim()
            .to_string();
        let name = name_str
            .split_once(' ')
            .map(|(first, _)| first.to_string())
            .unwrap_or(name_str);

        list.push(Celebrity {
            id: match1(&RE_ID, &href),
            name,
            img: attr_of(el, &SEL_RESULT_PIC, "src").unwrap_or_default(),
            ..Default::default()
        });
    }

    list
}

pub(crate) fn parse_login_name(body: &str) -> String {
    match1(&RE_LOGIN_NAME, body).trim().to_string()
}
