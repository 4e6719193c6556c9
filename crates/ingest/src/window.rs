use chamber_core::EventRecord;
use chrono::NaiveDate;

pub fn upcoming(mut records: Vec<EventRecord>, today: NaiveDate) -> Vec<EventRecord> {
    records.retain(|r| r.date >= today);
    records.sort_by_key(|r| r.date);
    records
}
