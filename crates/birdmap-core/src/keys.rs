//! Key normalisation for sighting identity and pin grouping.
//!
//! Alert text and API entries spell the same place or species with varying
//! case and spacing ("Plum Island  (MA)" vs "plum island (ma)"), so every
//! comparison key goes through [`normalize_name`] first.
//!
//! # Identity
//!
//! A [`SourceId`] is a SHA-256 digest over the normalised tuple
//! `(species, place, observed_at, observer)`, where `place` is the
//! normalised location name stripped of its region tail, or the rounded
//! coordinates when the name is blank. The digest is truncated to 128 bits
//! (32 hex chars).
//!
//! Alert emails write places as `"Sandy Point SP, Anne Arundel, Maryland, US"`
//! while the API reports `"Sandy Point SP"` with county and state in separate
//! fields; stripping the tail gives both the same key.

use sha2::{Digest, Sha256};

use crate::sighting::{Coordinates, ObservedAt, SightingRecord, SourceId};

/// Decimal places kept when comparing coordinates.
///
/// 5 places is roughly 1.1 m of latitude: two GPS fixes for the same
/// parking lot merge, two ends of a reservoir do not.
pub const COORD_PRECISION: i32 = 5;

const FIELD_SEP: char = '\u{1f}';

/// Trailing location parts naming a country rather than a state.
const COUNTRY_SUFFIXES: &[&str] =
    &["us", "usa", "united states", "ca", "canada", "mx", "mexico"];

pub(crate) fn is_country(part: &str) -> bool {
    COUNTRY_SUFFIXES.contains(&part.trim().to_ascii_lowercase().as_str())
}

/// Lowercase, trim, and collapse inner whitespace runs to one space.
pub fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scale a coordinate to an integer grid of [`COORD_PRECISION`] places.
pub fn round_coord(v: f64) -> i64 {
    (v * 10f64.powi(COORD_PRECISION)).round() as i64
}

/// Rounded `(lat, lon)` grid cell for a coordinate pair.
pub fn coord_cell(c: &Coordinates) -> (i64, i64) {
    (round_coord(c.lat), round_coord(c.lon))
}

/// Normalised place name without a trailing `, county, state, country`.
///
/// Only parts matching the record's own county and state (or a known
/// country) are removed, and the first part always stays.
pub fn place_stem(location_name: &str, county: Option<&str>, state: Option<&str>) -> String {
    let mut parts: Vec<String> = location_name
        .split(',')
        .map(normalize_name)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() > 1 && parts.last().is_some_and(|p| is_country(p)) {
        parts.pop();
    }
    for region in [state, county] {
        let Some(region) = region.map(normalize_name) else {
            continue;
        };
        if parts.len() > 1 && parts.last() == Some(&region) {
            parts.pop();
        }
    }
    parts.join(", ")
}

fn place_key(record: &SightingRecord) -> String {
    let stem = place_stem(
        &record.location_name,
        record.county.as_deref(),
        record.state.as_deref(),
    );
    if !stem.is_empty() {
        return stem;
    }
    match record.coordinates.as_ref() {
        Some(c) => {
            let (lat, lon) = coord_cell(c);
            format!("@{lat},{lon}")
        }
        None => String::new(),
    }
}

fn observed_key(at: &ObservedAt) -> String {
    match at.time {
        Some(t) => format!("{}T{}", at.date.format("%Y-%m-%d"), t.format("%H:%M")),
        None => at.date.format("%Y-%m-%d").to_string(),
    }
}

/// Derive the identity key of a sighting.
pub fn source_id(record: &SightingRecord) -> SourceId {
    let material = [
        normalize_name(&record.species),
        place_key(record),
        observed_key(&record.observed_at),
        normalize_name(record.observer.as_deref().unwrap_or_default()),
    ]
    .join(&FIELD_SEP.to_string());

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    SourceId::from_hex(&digest[..32])
}
