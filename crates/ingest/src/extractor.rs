use anyhow::{Context, Result};
use chamber_core::{DESCRIPTION_MAX_CHARS, LOCATION_MAX_CHARS, TIME_MAX_CHARS, TITLE_MAX_CHARS};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::dates::{find_date_text, starts_with_date};
use crate::locator::{parse_selector, RawCandidate, TITLE_ELEMENTS};
use crate::sources::SourceSpec;
use crate::text::{bounded, clean_text};

static RE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}:\d{2}\s*[AP]\.?M\.?(?:\s*[-–]\s*\d{1,2}:\d{2}\s*[AP]\.?M\.?)?",
    )
    .expect("invalid regex: time")
});

static RE_LABELED_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:location|venue|where)\b[:\s]+([^\n]+)").expect("invalid regex: location")
});

static RE_AT_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bat\b[:\s]+([^\n]+)").expect("invalid regex: at-location")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub date_text: Option<String>,
    pub time_text: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub link: String,
}

pub struct FieldExtractor {
    heading: Selector,
    anchor: Selector,
    emphasis: Selector,
    paragraph: Selector,
    linked_anchor: Selector,
    origin: Url,
    index_url: String,
}

impl FieldExtractor {
    pub fn for_source(source: &SourceSpec) -> Result<Self> {
        let origin = Url::parse(source.origin)
            .with_context(|| format!("invalid origin for source {}", source.key))?;

        Ok(Self {
            heading: parse_selector(TITLE_ELEMENTS)?,
            anchor: parse_selector("a")?,
            emphasis: parse_selector("strong, b")?,
            paragraph: parse_selector("p, .description, .event-description")?,
            linked_anchor: parse_selector("a[href]")?,
            origin,
            index_url: source.index_url.to_string(),
        })
    }

    pub fn extract(&self, candidate: &RawCandidate<'_>) -> ExtractedFields {
        ExtractedFields {
            title: self.title(candidate),
            date_text: find_date_text(&candidate.text).map(str::to_string),
            time_text: RE_TIME
                .find(&candidate.text)
                .and_then(|m| bounded(m.as_str(), TIME_MAX_CHARS)),
            location: location(&candidate.text),
            description: self.description(candidate),
            link: self.link(candidate.element),
        }
    }

    fn title(&self, candidate: &RawCandidate<'_>) -> Option<String> {
        [&self.heading, &self.anchor, &self.emphasis]
            .into_iter()
            .find_map(|selector| first_text(candidate.element, selector))
            .or_else(|| candidate.lines.first().cloned())
            .and_then(|title| bounded(&title, TITLE_MAX_CHARS))
    }

    fn description(&self, candidate: &RawCandidate<'_>) -> Option<String> {
        first_text(candidate.element, &self.paragraph)
            .or_else(|| {
                let rest = candidate.lines.iter().skip(1).take(2).cloned().collect::<Vec<_>>();
                (!rest.is_empty()).then(|| rest.join(" "))
            })
            .and_then(|d| bounded(&d, DESCRIPTION_MAX_CHARS))
    }

    fn link(&self, element: ElementRef<'_>) -> String {
        element
            .select(&self.linked_anchor)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_link(&self.origin, href))
            .unwrap_or_else(|| self.index_url.clone())
    }
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).find_map(|el| {
        let text = clean_text(&el.text().collect::<Vec<_>>().join(" "));
        (!text.is_empty()).then_some(text)
    })
}

fn location(text: &str) -> Option<String> {
    RE_LABELED_LOCATION
        .captures(text)
        .and_then(|caps| caps.get(1))
        .or_else(|| {
            RE_AT_LOCATION
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .find(|m| !starts_with_when(m.as_str()))
        })
        .and_then(|m| bounded(m.as_str(), LOCATION_MAX_CHARS))
}

// "at 7:30 AM" names a time, not a place
fn starts_with_when(text: &str) -> bool {
    RE_TIME.find(text).is_some_and(|m| m.start() == 0)
        || starts_with_date(text)
}

/// Absolute http(s) form of `href`, or `None` for fragments and other schemes.
pub fn resolve_link(origin: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = origin.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

pub fn discover_events_link(document: &Html, origin: &Url) -> Option<String> {
    let selector = parse_selector(r#"a[href*="event"], a[href*="calendar"]"#).ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    if !href.contains("event") {
        return None;
    }
    resolve_link(origin, href)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::find_source;
    use chamber_core::Chamber;

    fn extract_first(html: &str) -> ExtractedFields {
        let source = SourceSpec {
            key: "test",
            name: "Test Chamber",
            chamber: Chamber::Bethesda,
            index_url: "https://www.bethesda.test/events",
            origin: "https://www.bethesda.test",
            requires_rendering: false,
            discover_events_link: false,
            selectors: &[".event"],
            keywords: &[],
        };
        let document = Html::parse_document(html);
        let selector = Selector::parse(".event").unwrap();
        let element = document.select(&selector).next().unwrap();
        let candidate = RawCandidate::new(element);
        FieldExtractor::for_source(&source).unwrap().extract(&candidate)
    }

    #[test]
    fn full_card() {
        let fields = extract_first(
            r#"<div class="event">
                 <h3>Bethesda Business Expo</h3>
                 <span class="date">March 12, 2026</span>
                 <span>10:00 AM - 4:00 PM</span>
                 <div>Location: Bethesda North Marriott, 5701 Marinelli Rd</div>
                 <p>Annual expo featuring local businesses.</p>
                 <a href="/events/expo-2026">Details</a>
               </div>"#,
        );
        assert_eq!(fields.title.as_deref(), Some("Bethesda Business Expo"));
        assert_eq!(fields.date_text.as_deref(), Some("March 12, 2026"));
        assert_eq!(fields.time_text.as_deref(), Some("10:00 AM - 4:00 PM"));
        assert_eq!(
            fields.location.as_deref(),
            Some("Bethesda North Marriott, 5701 Marinelli Rd")
        );
        assert_eq!(
            fields.description.as_deref(),
            Some("Annual expo featuring local businesses.")
        );
        assert_eq!(fields.link, "https://www.bethesda.test/events/expo-2026");
    }

    #[test]
    fn title_falls_back_through_link_strong_and_first_line() {
        let from_link = extract_first(r#"<div class="event"><a href="x">Spring Mixer</a> 4/1/2026</div>"#);
        assert_eq!(from_link.title.as_deref(), Some("Spring Mixer"));
        assert_eq!(from_link.link, "https://www.bethesda.test/x");

        let from_strong = extract_first(r#"<div class="event"><strong>Fall Gala Dinner</strong></div>"#);
        assert_eq!(from_strong.title.as_deref(), Some("Fall Gala Dinner"));

        let from_line = extract_first(
            r#"<div class="event"><span>Leadership Summit</span><span>4/1/2026</span></div>"#,
        );
        assert_eq!(from_line.title.as_deref(), Some("Leadership Summit"));
    }

    #[test]
    fn description_falls_back_to_following_lines() {
        let fields = extract_first(
            r#"<div class="event"><span>Women in Business</span><span>Networking lunch</span><span>Members free</span><span>ignored</span></div>"#,
        );
        assert_eq!(fields.description.as_deref(), Some("Networking lunch Members free"));
    }

    #[test]
    fn missing_link_defaults_to_index() {
        let fields = extract_first(r#"<div class="event"><h4>Ribbon Cutting</h4><a href="javascript:void(0)">x</a></div>"#);
        assert_eq!(fields.link, "https://www.bethesda.test/events");
        assert_eq!(fields.date_text, None);
        assert_eq!(fields.time_text, None);
    }

    #[test]
    fn first_date_in_priority_order() {
        let fields = extract_first(
            r#"<div class="event"><h3>Mixer Series</h3><p>March 3, 2025 and January 5, 2025</p></div>"#,
        );
        assert_eq!(fields.date_text.as_deref(), Some("March 3, 2025"));
    }

    #[test]
    fn fields_are_truncated() {
        let long = "A".repeat(500);
        let fields = extract_first(&format!(
            r#"<div class="event"><h3>{long}</h3><p>{long}</p><div>Venue: {long}</div></div>"#
        ));
        assert_eq!(fields.title.unwrap().chars().count(), TITLE_MAX_CHARS);
        assert_eq!(fields.description.unwrap().chars().count(), DESCRIPTION_MAX_CHARS);
        assert_eq!(fields.location.unwrap().chars().count(), LOCATION_MAX_CHARS);
    }

    #[test]
    fn at_label_is_a_fallback() {
        let fields = extract_first(
            r#"<div class="event"><h3>Tech Meetup</h3><div>Join us at Innovation Center</div></div>"#,
        );
        assert_eq!(fields.location.as_deref(), Some("Innovation Center"));
    }

    #[test]
    fn at_followed_by_a_time_is_not_a_place() {
        let fields = extract_first(
            r#"<div class="event"><h3>Networking Breakfast</h3><p>Doors open at 7:30 AM</p><span>4/2/2026</span></div>"#,
        );
        assert_eq!(fields.location, None);
        assert_eq!(fields.time_text.as_deref(), Some("7:30 AM"));

        let later = extract_first(
            r#"<div class="event"><h3>Awards Gala</h3><p>Starts at 6:00 PM</p><p>Dinner at The Universities at Shady Grove</p></div>"#,
        );
        assert_eq!(
            later.location.as_deref(),
            Some("The Universities at Shady Grove")
        );
    }

    #[test]
    fn relative_and_foreign_links() {
        let origin = Url::parse("https://web.mcccmd.com").unwrap();
        assert_eq!(
            resolve_link(&origin, "/events/details/mixer-1").as_deref(),
            Some("https://web.mcccmd.com/events/details/mixer-1")
        );
        assert_eq!(
            resolve_link(&origin, "events/2").as_deref(),
            Some("https://web.mcccmd.com/events/2")
        );
        assert_eq!(
            resolve_link(&origin, "https://other.org/e").as_deref(),
            Some("https://other.org/e")
        );
        assert_eq!(resolve_link(&origin, "#top"), None);
        assert_eq!(resolve_link(&origin, "mailto:info@mcccmd.com"), None);
    }

    #[test]
    fn discovers_events_page_from_homepage() {
        let ggcc = find_source("ggcc").unwrap();
        let origin = Url::parse(ggcc.origin).unwrap();
        let home = Html::parse_document(
            r#"<nav><a href="/about">About</a><a href="/events/calendar">Events</a></nav>"#,
        );
        assert_eq!(
            discover_events_link(&home, &origin).as_deref(),
            Some("https://www.ggchamber.org/events/calendar")
        );

        let calendar_only = Html::parse_document(r#"<a href="/calendar">Calendar</a>"#);
        assert_eq!(discover_events_link(&calendar_only, &origin), None);
    }
}
