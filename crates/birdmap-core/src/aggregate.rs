//! Merge candidate records from many batches into one ranked collection.
//!
//! Steps, in order:
//! 1. concatenate every batch
//! 2. drop records outside the state filter (case-insensitive)
//! 3. drop records older than `latest − max_age_days`, where `latest` is the
//!    newest surviving observation
//! 4. collapse records sharing a [`SourceId`], keeping the most complete
//! 5. stable sort, newest first

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Days;
use tracing::{debug, info};

use crate::sighting::{AlertBatch, ObservedAt, SightingRecord, SourceId};

/// Caller-supplied filters; each is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Keep only records whose state matches, ignoring case.
    pub state: Option<String>,
    /// Keep only records at most this many days older than the newest record.
    pub max_age_days: Option<u32>,
}

impl Filter {
    fn state_matches(&self, record: &SightingRecord) -> bool {
        let Some(wanted) = self.state.as_deref() else {
            return true;
        };
        let wanted = wanted.trim().to_lowercase();
        record
            .state
            .as_deref()
            .is_some_and(|s| s.trim().to_lowercase() == wanted)
    }
}

/// What happened to the candidates on the way through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub batches: usize,
    pub candidates: usize,
    /// Entries the extractor or adapter already skipped.
    pub skipped: usize,
    pub dropped_state: usize,
    pub dropped_age: usize,
    pub duplicates: usize,
}

/// Deduplicated records, newest first. Never empty.
#[derive(Debug, Clone)]
pub struct AggregatedCollection {
    records: Vec<SightingRecord>,
    stats: AggregateStats,
}

impl AggregatedCollection {
    pub fn records(&self) -> &[SightingRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SightingRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest observation in the collection.
    pub fn latest(&self) -> ObservedAt {
        self.records[0].observed_at
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    /// Distinct species names, sorted.
    pub fn species(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.records.iter().map(|r| r.species.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Outcome of aggregation: either something to render, or nothing.
#[derive(Debug, Clone)]
pub enum Aggregated {
    Sightings(AggregatedCollection),
    /// Every candidate was filtered out (or there were none).
    Empty(AggregateStats),
}

impl Aggregated {
    pub fn stats(&self) -> &AggregateStats {
        match self {
            Aggregated::Sightings(c) => c.stats(),
            Aggregated::Empty(stats) => stats,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Aggregated::Empty(_))
    }

    pub fn into_collection(self) -> Option<AggregatedCollection> {
        match self {
            Aggregated::Sightings(c) => Some(c),
            Aggregated::Empty(_) => None,
        }
    }
}

/// Merge `batches` under `filter`.
pub fn aggregate<I>(batches: I, filter: &Filter) -> Aggregated
where
    I: IntoIterator<Item = AlertBatch>,
{
    let mut stats = AggregateStats::default();

    // 1-2. Concatenate, applying the state filter on the way in.
    let mut survivors = Vec::new();
    for batch in batches {
        stats.batches += 1;
        stats.candidates += batch.records.len();
        stats.skipped += batch.skipped;
        for record in batch.records {
            if filter.state_matches(&record) {
                survivors.push(record);
            } else {
                stats.dropped_state += 1;
            }
        }
    }

    // 3. Age window anchored on the newest survivor.
    if let Some(max_age) = filter.max_age_days
        && let Some(latest) = survivors.iter().map(|r| r.observed_at.date).max()
        && let Some(cutoff) = latest.checked_sub_days(Days::new(u64::from(max_age)))
    {
        let before = survivors.len();
        survivors.retain(|r| r.observed_at.date >= cutoff);
        stats.dropped_age = before - survivors.len();
        debug!(%latest, %cutoff, dropped = stats.dropped_age, "applied age window");
    }

    // 4. Deduplicate; the winner keeps the first-seen slot.
    let mut slots: HashMap<SourceId, usize> = HashMap::with_capacity(survivors.len());
    let mut records: Vec<SightingRecord> = Vec::with_capacity(survivors.len());
    for record in survivors {
        let id = record.source_id();
        match slots.get(&id) {
            Some(&slot) => {
                stats.duplicates += 1;
                if record.completeness_cmp(&records[slot]) == Ordering::Greater {
                    records[slot] = record;
                }
            }
            None => {
                slots.insert(id, records.len());
                records.push(record);
            }
        }
    }

    // 5. Newest first; `sort_by` is stable so ties keep insertion order.
    records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));

    info!(
        candidates = stats.candidates,
        kept = records.len(),
        dropped_state = stats.dropped_state,
        dropped_age = stats.dropped_age,
        duplicates = stats.duplicates,
        "aggregated sightings"
    );

    if records.is_empty() {
        Aggregated::Empty(stats)
    } else {
        Aggregated::Sightings(AggregatedCollection { records, stats })
    }
}
