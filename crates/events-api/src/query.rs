use chamber_core::{Chamber, EventRecord};
use chrono::{Days, Months, NaiveDate};
use ingest::upcoming;
use serde::Deserialize;
use std::str::FromStr;
use utoipa::IntoParams;

/// Date window offered by the listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateRange {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl DateRange {
    /// `date` is assumed to be on or after `today`.
    fn contains(self, date: NaiveDate, today: NaiveDate) -> bool {
        match self {
            DateRange::All => true,
            DateRange::Today => date == today,
            DateRange::Week => today.checked_add_days(Days::new(7)).map_or(true, |end| date <= end),
            DateRange::Month => today.checked_add_months(Months::new(1)).map_or(true, |end| date <= end),
        }
    }
}

impl FromStr for DateRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(DateRange::All),
            "today" => Ok(DateRange::Today),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            other => Err(format!("unknown range '{other}'")),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Chamber tag, or `all`.
    pub chamber: Option<String>,
    /// One of `all`, `today`, `week`, `month`.
    pub range: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFilter {
    pub chamber: Option<Chamber>,
    pub range: DateRange,
}

impl EventFilter {
    /// Parse query parameters, collecting one detail line per bad field.
    pub fn from_query(query: &EventsQuery) -> Result<Self, Vec<String>> {
        let mut details = Vec::new();

        let chamber = match query.chamber.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(tag) if tag.eq_ignore_ascii_case("all") => None,
            Some(tag) => match tag.parse::<Chamber>() {
                Ok(chamber) => Some(chamber),
                Err(e) => {
                    details.push(format!("chamber: {e}"));
                    None
                }
            },
        };
        let range = match query.range.as_deref().unwrap_or("").parse::<DateRange>() {
            Ok(range) => range,
            Err(e) => {
                details.push(format!("range: {e}"));
                DateRange::All
            }
        };

        if details.is_empty() {
            Ok(Self { chamber, range })
        } else {
            Err(details)
        }
    }

    /// Upcoming events matching this filter, ordered by date.
    pub fn apply(&self, events: Vec<EventRecord>, today: NaiveDate) -> Vec<EventRecord> {
        upcoming(events, today)
            .into_iter()
            .filter(|e| self.chamber.map_or(true, |c| e.chamber == c))
            .filter(|e| self.range.contains(e.date, today))
            .collect()
    }
}
