use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod client;
mod parse;
mod text;

pub use client::{DoubanClient, DoubanHosts};
pub use text::parse_celebrity_name;

/// Category discriminator for a [`Subject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Series,
}

impl MediaKind {
    /// The scraped provider labels categories in Chinese; anything else
    /// (books, music, games) is out of scope.
    pub(crate) fn from_label(label: &str) -> Option<Self> {
        match label {
            "电影" => Some(MediaKind::Movie),
            "电视剧" => Some(MediaKind::Series),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonKind {
    Director,
    Actor,
}

/// Canonical movie/series record assembled from the scraped provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subject {
    pub sid: String,
    pub name: String,
    pub original_name: String,
    pub subnames: Vec<String>,
    pub rating: f32,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub duration: String,
    /// Premiere dates free text, e.g. "2002-01-26(中国大陆) / 2001-11-16(美国)".
    pub screen: String,
    pub site: String,
    pub director: String,
    pub writer: String,
    pub actor: String,
    pub imdb: String,
    pub intro: String,
    pub img: String,
    pub category: MediaKind,
    pub celebrities: Vec<Celebrity>,
}

impl Subject {
    pub fn premiere_date(&self) -> Option<NaiveDate> {
        let first = self.screen.split('/').next()?;
        let date = first.split('(').next()?.trim();
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    pub fn img_medium(&self) -> String {
        self.img.replace("s_ratio_poster", "m")
    }

    pub fn img_large(&self) -> String {
        self.img.replace("s_ratio_poster", "l")
    }
}

/// Canonical person record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Celebrity {
    pub id: String,
    pub name: String,
    /// Remainder of the raw heading after the disambiguated name.
    pub foreign_name: String,
    pub img: String,
    pub role: String,
    /// Raw role heading ("导演", "演员", ...); empty when the page does not
    /// state one, see [`Celebrity::person_kind`].
    pub role_type: String,
    pub intro: String,
    pub gender: String,
    pub constellation: String,
    pub birthdate: String,
    pub deathdate: String,
    pub birthplace: String,
    pub nickname: String,
    pub imdb: String,
}

impl Celebrity {
    /// Derives the role kind from the role text when not explicitly set.
    pub fn person_kind(&self) -> PersonKind {
        let marker = if self.role_type.is_empty() {
            &self.role
        } else {
            &self.role_type
        };
        if marker.contains("导演") {
            PersonKind::Director
        } else {
            PersonKind::Actor
        }
    }

    /// Foreign names are only surfaced for non-Chinese people, recognizable
    /// by the middle-dot transliteration mark in the resolved name.
    pub fn display_original_name(&self) -> Option<&str> {
        if self.name.contains('·') && !self.birthplace.contains("中国") && !self.foreign_name.is_empty() {
            Some(&self.foreign_name)
        } else {
            None
        }
    }

    pub fn img_medium(&self) -> String {
        self.img
            .replace("/raw/", "/m/")
            .replace("/s_ratio_poster/", "/m/")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    /// Size string as scraped, "WxH".
    pub size: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
    pub raw: Option<String>,
}

impl Photo {
    pub(crate) fn set_size(&mut self, size: &str) {
        self.size = size.to_string();
        if let Some((w, h)) = size.split_once('x') {
            self.width = w.trim().parse().ok();
            self.height = h.trim().parse().ok();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginInfo {
    pub name: String,
    pub is_logged_in: bool,
}

/// Seam the resolver consumes; production code uses [`DoubanClient`].
#[async_trait]
pub trait DoubanApi: Send + Sync {
    async fn search(&self, keyword: &str) -> Vec<Subject>;
    async fn search_by_suggest(&self, keyword: &str) -> Vec<Subject>;
    async fn get_subject(&self, sid: &str) -> Option<Subject>;
}
