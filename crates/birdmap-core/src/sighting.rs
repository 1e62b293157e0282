//! Sighting records shared by every stage of the pipeline.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::keys;

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Validate and build a coordinate pair.
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoreError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(CoreError::InvalidCoordinates { lat, lon });
        }
        Ok(Self { lat, lon })
    }
}

/// When a sighting was made: a date, and the time of day when the report
/// carried one.
///
/// Ordering is chronological; a missing time sorts before any time on the
/// same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservedAt {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl ObservedAt {
    pub fn new(date: NaiveDate, time: Option<NaiveTime>) -> Self {
        Self { date, time }
    }

    pub fn on(date: NaiveDate) -> Self {
        Self { date, time: None }
    }
}

impl fmt::Display for ObservedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "{} {}", self.date.format("%b %d, %Y"), t.format("%H:%M")),
            None => write!(f, "{}", self.date.format("%b %d, %Y")),
        }
    }
}

/// Which ingestion path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    AlertEmail,
    Api,
}

/// Identity key of a real-world sighting. See [`keys::source_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub(crate) fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One reported sighting of one species at one place and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightingRecord {
    /// Common name, e.g. "Snowy Owl".
    pub species: String,
    pub scientific_name: Option<String>,
    /// Individuals reported; `None` when uncounted ("X") or not given.
    pub count: Option<u32>,
    /// Reviewed and accepted by a regional reviewer.
    pub confirmed: bool,
    /// Free-text place description as reported.
    pub location_name: String,
    pub coordinates: Option<Coordinates>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub observed_at: ObservedAt,
    pub observer: Option<String>,
    pub comments: Option<String>,
    pub checklist_url: Option<String>,
    pub origin: Origin,
}

impl SightingRecord {
    /// Build a record from its required fields; optional fields start empty.
    pub fn new(
        species: impl Into<String>,
        location_name: impl Into<String>,
        observed_at: ObservedAt,
        origin: Origin,
    ) -> Result<Self, CoreError> {
        let species = species.into().trim().to_string();
        let location_name = location_name.into().trim().to_string();
        if species.is_empty() {
            return Err(CoreError::MissingField("species"));
        }
        if location_name.is_empty() {
            return Err(CoreError::MissingField("location_name"));
        }
        Ok(Self {
            species,
            scientific_name: None,
            count: None,
            confirmed: false,
            location_name,
            coordinates: None,
            county: None,
            state: None,
            observed_at,
            observer: None,
            comments: None,
            checklist_url: None,
            origin,
        })
    }

    /// Identity key; recomputed from the current field values.
    pub fn source_id(&self) -> SourceId {
        keys::source_id(self)
    }

    /// Compare how complete two reports of the same sighting are.
    ///
    /// Coordinates outrank comments; `Equal` means neither is preferred.
    pub fn completeness_cmp(&self, other: &Self) -> Ordering {
        self.completeness().cmp(&other.completeness())
    }

    fn completeness(&self) -> (bool, bool) {
        let has_comments = self
            .comments
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        (self.coordinates.is_some(), has_comments)
    }
}

/// Candidate records produced from one document or one API page.
#[derive(Debug, Clone, Default)]
pub struct AlertBatch {
    /// Where the batch came from (file name, region code), for diagnostics.
    pub label: String,
    pub records: Vec<SightingRecord>,
    /// Entries seen but dropped as malformed or out of window.
    pub skipped: usize,
}

impl AlertBatch {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
