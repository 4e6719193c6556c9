use chamber_core::{EventRecord, IdentityKey};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct SeenKeys {
    keys: HashSet<IdentityKey>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, key: IdentityKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub events: Vec<EventRecord>,
    pub duplicates_dropped: usize,
}

pub fn dedup_into(
    seen: &mut SeenKeys,
    out: &mut MergeOutcome,
    records: impl IntoIterator<Item = EventRecord>,
) {
    for record in records {
        if seen.admit(record.identity_key()) {
            out.events.push(record);
        } else {
            out.duplicates_dropped += 1;
        }
    }
}

// existing records first; `fresh` must be in source order
pub fn merge_with_catalog(existing: Vec<EventRecord>, fresh: Vec<EventRecord>) -> MergeOutcome {
    let mut seen = SeenKeys::new();
    let mut out = MergeOutcome::default();
    dedup_into(&mut seen, &mut out, existing);
    dedup_into(&mut seen, &mut out, fresh);
    out
}
