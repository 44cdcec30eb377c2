use once_cell::sync::Lazy;
use regex::Regex;

static RE_SEASON_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s第([0-9零一二三四五六七八九]+?)(季|部)").unwrap());

const DIGIT_CHARS: [(char, char); 10] = [
    ('一', '1'),
    ('二', '2'),
    ('三', '3'),
    ('四', '4'),
    ('五', '5'),
    ('六', '6'),
    ('七', '7'),
    ('八', '8'),
    ('九', '9'),
    ('零', '0'),
];

/// Maps positional Chinese numerals to an integer ("十二" style compounds are
/// not used by the provider's season titles, only digit-per-character forms).
pub fn chinese_number_to_int(s: &str) -> Option<i32> {
    if s.is_empty() {
        return None;
    }
    let digits: String = s
        .chars()
        .map(|c| {
            DIGIT_CHARS
                .iter()
                .find(|(zh, _)| *zh == c)
                .map(|(_, d)| *d)
                .unwrap_or(c)
        })
        .collect();
    digits.parse().ok()
}

pub fn to_chinese_number(number: i32) -> String {
    number
        .to_string()
        .chars()
        .map(|c| {
            DIGIT_CHARS
                .iter()
                .find(|(_, d)| *d == c)
                .map(|(zh, _)| *zh)
                .unwrap_or(c)
        })
        .collect()
}

/// Extracts the season number from a " 第N季"/" 第N部" title suffix, accepting
/// both ASCII digits and Chinese numerals.
pub fn parse_chinese_season_number(name: &str) -> Option<i32> {
    let caps = RE_SEASON_SUFFIX.captures(name)?;
    let raw = caps.get(1)?.as_str();
    raw.parse().ok().or_else(|| chinese_number_to_int(raw))
}
