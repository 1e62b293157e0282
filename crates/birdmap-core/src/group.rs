//! Spatial grouping of ranked sightings into map pins.
//!
//! Records are keyed by their coordinates rounded to [`COORD_PRECISION`]
//! places. A record without coordinates borrows the key of any record with
//! the same place name (ignoring a trailing county/state/country) that has
//! them; failing that it lands in a
//! name-keyed bucket whose pin is placed approximately (the centroid of
//! other sightings in the same county, else the same state) or not at all.
//!
//! Groups come out in the order of their newest member, so newer pins are
//! painted last and sit on top.

use std::collections::HashMap;

use tracing::debug;

use crate::colorize::{RankedSighting, Rgb};
use crate::keys::{COORD_PRECISION, coord_cell, normalize_name, place_stem};
use crate::sighting::{Coordinates, SightingRecord};

/// What a pin is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PinKey {
    /// Coordinates scaled by `10^COORD_PRECISION` and rounded.
    Cell { lat: i64, lon: i64 },
    /// Normalised location name, for records with nowhere precise to go.
    Place(String),
}

/// How trustworthy a pin's position is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Reported coordinates.
    Exact,
    /// Centroid of nearby sightings in the same county or state.
    Approximate,
    /// No position could be derived.
    Unplaced,
}

/// One map marker and the sightings behind it, newest first.
#[derive(Debug, Clone)]
pub struct PinGroup {
    pub key: PinKey,
    pub position: Option<Coordinates>,
    pub placement: Placement,
    /// Color of the newest member.
    pub color: Rgb,
    pub members: Vec<RankedSighting>,
}

impl PinGroup {
    /// The newest member. Groups are never empty.
    pub fn newest(&self) -> &RankedSighting {
        &self.members[0]
    }

    /// Place name shown as the pin heading.
    pub fn location_name(&self) -> &str {
        &self.newest().record.location_name
    }

    /// Distinct species at this pin, sorted.
    pub fn species(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .members
            .iter()
            .map(|m| m.record.species.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Group ranked sightings (in collection order) into pins.
pub fn group_sightings(sightings: Vec<RankedSighting>) -> Vec<PinGroup> {
    // Place names that are pinned somewhere precise, first fix wins.
    let mut named_cells: HashMap<String, (PinKey, Coordinates)> = HashMap::new();
    for s in &sightings {
        if let Some(c) = s.record.coordinates {
            named_cells
                .entry(place_name(&s.record))
                .or_insert_with(|| (cell_key(&c), c));
        }
    }

    let centroids = RegionCentroids::from_sightings(&sightings);

    let mut slots: HashMap<PinKey, usize> = HashMap::new();
    let mut groups: Vec<PinGroup> = Vec::new();

    for sighting in sightings {
        let name = place_name(&sighting.record);
        let (key, position) = match sighting.record.coordinates {
            Some(c) => (cell_key(&c), Some(c)),
            None => match named_cells.get(&name) {
                Some((key, c)) => (key.clone(), Some(*c)),
                None => (PinKey::Place(name), None),
            },
        };

        match slots.get(&key) {
            Some(&slot) => groups[slot].members.push(sighting),
            None => {
                let (position, placement) = match position {
                    Some(c) => (Some(c), Placement::Exact),
                    None => match centroids.locate(&sighting) {
                        Some(c) => (Some(c), Placement::Approximate),
                        None => (None, Placement::Unplaced),
                    },
                };
                slots.insert(key.clone(), groups.len());
                groups.push(PinGroup {
                    key,
                    position,
                    placement,
                    color: sighting.color,
                    members: vec![sighting],
                });
            }
        }
    }

    debug!(
        groups = groups.len(),
        precision = COORD_PRECISION,
        "grouped sightings into pins"
    );
    groups
}

fn place_name(record: &SightingRecord) -> String {
    place_stem(
        &record.location_name,
        record.county.as_deref(),
        record.state.as_deref(),
    )
}

fn cell_key(c: &Coordinates) -> PinKey {
    let (lat, lon) = coord_cell(c);
    PinKey::Cell { lat, lon }
}

/// Mean position of precisely-placed sightings per county and per state.
#[derive(Debug, Default)]
struct RegionCentroids {
    counties: HashMap<(String, String), Centroid>,
    states: HashMap<String, Centroid>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Centroid {
    lat: f64,
    lon: f64,
    n: u32,
}

impl Centroid {
    fn add(&mut self, c: &Coordinates) {
        self.lat += c.lat;
        self.lon += c.lon;
        self.n += 1;
    }

    fn mean(&self) -> Option<Coordinates> {
        if self.n == 0 {
            return None;
        }
        let n = f64::from(self.n);
        Coordinates::new(self.lat / n, self.lon / n).ok()
    }
}

impl RegionCentroids {
    fn from_sightings(sightings: &[RankedSighting]) -> Self {
        let mut out = Self::default();
        for s in sightings {
            let (Some(c), Some(state)) = (s.record.coordinates, s.record.state.as_deref()) else {
                continue;
            };
            let state = normalize_name(state);
            if let Some(county) = s.record.county.as_deref() {
                out.counties
                    .entry((normalize_name(county), state.clone()))
                    .or_default()
                    .add(&c);
            }
            out.states.entry(state).or_default().add(&c);
        }
        out
    }

    fn locate(&self, sighting: &RankedSighting) -> Option<Coordinates> {
        let state = normalize_name(sighting.record.state.as_deref()?);
        let by_county = sighting.record.county.as_deref().and_then(|county| {
            self.counties
                .get(&(normalize_name(county), state.clone()))
                .and_then(Centroid::mean)
        });
        by_county.or_else(|| self.states.get(&state).and_then(Centroid::mean))
    }
}
