use chamber_core::{Chamber, EventRecord, TITLE_MIN_CHARS};

use crate::dates::normalize_date;
use crate::extractor::ExtractedFields;

/// Why a candidate did not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingTitle,
    ShortTitle,
    MissingDate,
    InvalidDate,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingTitle => "missing_title",
            Rejection::ShortTitle => "short_title",
            Rejection::MissingDate => "missing_date",
            Rejection::InvalidDate => "invalid_date",
        }
    }
}

/// Validate extracted fields and build a record tagged with `chamber`.
pub fn assemble(fields: ExtractedFields, chamber: Chamber) -> Result<EventRecord, Rejection> {
    let title = fields.title.ok_or(Rejection::MissingTitle)?;
    if title.chars().count() < TITLE_MIN_CHARS {
        return Err(Rejection::ShortTitle);
    }
    let date_text = fields.date_text.ok_or(Rejection::MissingDate)?;
    let date = normalize_date(&date_text).ok_or(Rejection::InvalidDate)?;

    Ok(EventRecord {
        title,
        chamber,
        date,
        time: fields.time_text.unwrap_or_default(),
        location: fields.location.unwrap_or_default(),
        description: fields.description.unwrap_or_default(),
        link: fields.link,
    })
}
