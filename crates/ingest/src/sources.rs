use chamber_core::Chamber;

pub const DEFAULT_SELECTORS: &[&str] = &[
    ".event",
    ".event-item",
    ".calendar-event",
    "[data-event]",
    ".event-list-item",
    "article.event",
    ".event-card",
];

#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub chamber: Chamber,
    /// Page that lists events, also the fallback link for listings without one.
    pub index_url: &'static str,
    pub origin: &'static str,
    pub requires_rendering: bool,
    /// `index_url` is a homepage; follow its first events link.
    pub discover_events_link: bool,
    pub selectors: &'static [&'static str],
    pub keywords: &'static [&'static str],
}

pub const SOURCES: &[SourceSpec] = &[
    SourceSpec {
        key: "mccc",
        name: "Montgomery County Chamber of Commerce",
        chamber: Chamber::MontgomeryCounty,
        index_url: "https://web.mcccmd.com/events",
        origin: "https://web.mcccmd.com",
        requires_rendering: true,
        discover_events_link: false,
        selectors: &[
            ".event",
            ".event-item",
            ".calendar-event",
            "[data-event]",
            ".event-list-item",
            "article.event",
            ".event-card",
            "tr.event-row",
            ".event-row",
            "div[class*=\"event\"]",
        ],
        keywords: &["mixer", "excelerator", "networking"],
    },
    SourceSpec {
        key: "ggcc",
        name: "Gaithersburg-Germantown Chamber of Commerce",
        chamber: Chamber::Gaithersburg,
        index_url: "https://www.ggchamber.org/",
        origin: "https://www.ggchamber.org",
        requires_rendering: true,
        discover_events_link: true,
        selectors: &[
            ".event",
            ".event-item",
            ".calendar-event",
            "[data-event]",
            ".event-list-item",
        ],
        keywords: &["event"],
    },
    SourceSpec {
        key: "mdchamber",
        name: "Maryland Chamber of Commerce",
        chamber: Chamber::Maryland,
        index_url: "https://www.mdchamber.org/events/",
        origin: "https://www.mdchamber.org",
        requires_rendering: false,
        discover_events_link: false,
        selectors: DEFAULT_SELECTORS,
        keywords: &["event", "luncheon", "summit", "reception"],
    },
];

pub fn find_source(key: &str) -> Option<&'static SourceSpec> {
    SOURCES.iter().find(|s| s.key.eq_ignore_ascii_case(key))
}
