use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateLayout {
    Iso,
    Slash,
    MonthName,
    MonthAbbrev,
}

struct DatePattern {
    layout: DateLayout,
    regex: Regex,
}

static DATE_PATTERNS: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    let pattern = |layout, re: &str| DatePattern {
        layout,
        regex: Regex::new(re).expect("invalid regex: date pattern"),
    };
    vec![
        pattern(DateLayout::Iso, r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b"),
        pattern(DateLayout::Slash, r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b"),
        pattern(
            DateLayout::MonthName,
            r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
        ),
        pattern(
            DateLayout::MonthAbbrev,
            r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
        ),
    ]
});

pub fn find_date_text(text: &str) -> Option<&str> {
    DATE_PATTERNS
        .iter()
        .find_map(|p| p.regex.find(text))
        .map(|m| m.as_str())
}

pub fn looks_like_date(text: &str) -> bool {
    find_date_text(text).is_some()
}

pub(crate) fn starts_with_date(text: &str) -> bool {
    DATE_PATTERNS
        .iter()
        .any(|p| p.regex.find(text).is_some_and(|m| m.start() == 0))
}

/// Parse free-form date text into a calendar date.
///
/// The first pattern that matches structurally decides the outcome: if its
/// fields do not form a real date the text is rejected, later patterns are
/// not consulted.
pub fn normalize_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (layout, caps) = DATE_PATTERNS
        .iter()
        .find_map(|p| p.regex.captures(text).map(|c| (p.layout, c)))?;

    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let (year, month, day) = match layout {
        DateLayout::Iso => (num(1)? as i32, num(2)?, num(3)?),
        DateLayout::Slash => (num(3)? as i32, num(1)?, num(2)?),
        DateLayout::MonthName | DateLayout::MonthAbbrev => {
            (num(3)? as i32, month_number(caps.get(1)?.as_str())?, num(2)?)
        }
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn canonical_date(text: &str) -> Option<String> {
    normalize_date(text).map(|d| d.format("%Y-%m-%d").to_string())
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
