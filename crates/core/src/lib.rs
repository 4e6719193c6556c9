use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

pub const PROJECT_NAME: &str = "chamber-events";
pub const PROJECT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const TITLE_MAX_CHARS: usize = 200;
pub const TITLE_MIN_CHARS: usize = 6;
pub const TIME_MAX_CHARS: usize = 40;
pub const LOCATION_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 300;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus<'a> {
    pub status: &'a str,
    pub service: &'a str,
    pub version: &'a str,
}

pub fn health_status(service: &'static str) -> HealthStatus<'static> {
    HealthStatus {
        status: "ok",
        service,
        version: PROJECT_VERSION,
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse<'a> {
    pub service: &'a str,
    pub project: &'a str,
    pub version: &'a str,
}

/// Chambers of commerce whose listings the catalog can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Chamber {
    Gaithersburg,
    Rockville,
    Bethesda,
    SilverSpring,
    MontgomeryCounty,
    Maryland,
}

impl Chamber {
    pub const ALL: [Chamber; 6] = [
        Chamber::Gaithersburg,
        Chamber::Rockville,
        Chamber::Bethesda,
        Chamber::SilverSpring,
        Chamber::MontgomeryCounty,
        Chamber::Maryland,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chamber::Gaithersburg => "gaithersburg",
            Chamber::Rockville => "rockville",
            Chamber::Bethesda => "bethesda",
            Chamber::SilverSpring => "silver-spring",
            Chamber::MontgomeryCounty => "montgomery-county",
            Chamber::Maryland => "maryland",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Chamber::Gaithersburg => "Gaithersburg-Germantown Chamber of Commerce",
            Chamber::Rockville => "Rockville Chamber of Commerce",
            Chamber::Bethesda => "Bethesda-Chevy Chase Chamber of Commerce",
            Chamber::SilverSpring => "Silver Spring Chamber of Commerce",
            Chamber::MontgomeryCounty => "Montgomery County Chamber of Commerce",
            Chamber::Maryland => "Maryland Chamber of Commerce",
        }
    }
}

impl fmt::Display for Chamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChamber(pub String);

impl fmt::Display for UnknownChamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown chamber '{}'", self.0)
    }
}

impl std::error::Error for UnknownChamber {}

impl FromStr for Chamber {
    type Err = UnknownChamber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Chamber::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownChamber(s.to_string()))
    }
}

/// A canonical event listing as stored in the catalog and served to the front-end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct EventRecord {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub chamber: Chamber,
    pub date: NaiveDate,
    #[serde(default)]
    #[validate(length(max = 40))]
    pub time: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub description: String,
    #[validate(url)]
    pub link: String,
}

impl EventRecord {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(&self.title, self.date)
    }
}

/// Deduplication identity: title compared case-insensitively, plus the date.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    title: String,
    date: NaiveDate,
}

impl IdentityKey {
    pub fn new(title: &str, date: NaiveDate) -> Self {
        Self {
            title: title.to_lowercase(),
            date,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl Catalog {
    pub fn new(last_updated: DateTime<Utc>, events: Vec<EventRecord>) -> Self {
        Self {
            last_updated,
            events,
        }
    }
}

/// One ingest run as kept in the run ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub fetched_records: i64,
    pub retained_events: i64,
    /// `replaced`, `touched` or `skipped`; absent while the run is in flight.
    pub outcome: Option<String>,
    pub catalog_hash: Option<String>,
    pub sources: Vec<SourceStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: String,
    pub chamber: Chamber,
    pub url: String,
    pub candidates: i64,
    pub records: i64,
    pub error: Option<String>,
}
