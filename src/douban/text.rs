use once_cell::sync::Lazy;
use regex::Regex;

// Inline whitespace runs after a newline; plain newlines stay untouched.
static RE_OVERVIEW_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[^\S\n]+").unwrap());

const WATERMARK: &str = "©豆瓣";

pub(crate) fn has_chinese(s: &str) -> bool {
    s.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Disambiguates a raw celebrity heading that may hold a native-script name,
/// a foreign name, or both ("佩吉·陆 Peggy Lu", "Antony Coleman Antony
/// Coleman" duplication artifacts, plain "Dick Cook").
pub fn parse_celebrity_name(raw: &str) -> String {
    let s = raw.trim();
    let Some(idx) = s.find(' ') else {
        // No space: a pure native-script name.
        return s.to_string();
    };

    let first = &s[..idx];
    if has_chinese(first) {
        return first.trim().to_string();
    }

    // Foreign name repeated twice: keep everything before the repeat.
    let rest = &s[idx..];
    if let Some(pos) = find_ignore_ascii_case(rest, first) {
        return s[..idx + pos].trim().to_string();
    }

    s.to_string()
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Normalizes a scraped synopsis: strips the provider watermark and collapses
/// inline whitespace while preserving paragraph newlines.
pub(crate) fn format_overview(intro: &str) -> String {
    let without_watermark = intro.replace(WATERMARK, "");
    RE_OVERVIEW_SPACE
        .replace_all(&without_watermark, "\n")
        .trim()
        .to_string()
}

pub(crate) fn split_tags(s: &str) -> Vec<String> {
    s.split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}
