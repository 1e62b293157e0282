//! Recency coloring: newest sightings bright red, oldest blue-grey.
//!
//! Color depends only on a record's position within the collection, not on
//! absolute dates, so the same batch always yields the same palette.

use std::fmt;

use crate::aggregate::AggregatedCollection;
use crate::sighting::SightingRecord;

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Per-channel linear blend toward `to`; `t` is clamped to `[0, 1]` and
    /// channels truncate toward zero.
    pub fn lerp(self, to: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t) as u8;
        Rgb::new(channel(self.r, to.r), channel(self.g, to.g), channel(self.b, to.b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Color at rank 0 (newest): `#e74c3c`.
pub const NEWEST: Rgb = Rgb::new(0xe7, 0x4c, 0x3c);
/// Color at rank 1 (oldest): `#2c3e50`.
pub const OLDEST: Rgb = Rgb::new(0x2c, 0x3e, 0x50);

/// `index / (count − 1)`, or 0 for a single record.
pub fn fractional_rank(index: usize, count: usize) -> f64 {
    if count <= 1 {
        0.0
    } else {
        index as f64 / (count - 1) as f64
    }
}

/// Gradient color for a fractional rank.
pub fn rank_color(rank: f64) -> Rgb {
    NEWEST.lerp(OLDEST, rank)
}

/// A record annotated with its recency rank and color.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSighting {
    pub record: SightingRecord,
    /// 0 = newest, 1 = oldest.
    pub rank: f64,
    pub color: Rgb,
}

/// Rank and color every record of a sorted collection.
pub fn colorize(collection: AggregatedCollection) -> Vec<RankedSighting> {
    let count = collection.len();
    collection
        .into_records()
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let rank = fractional_rank(i, count);
            RankedSighting {
                record,
                rank,
                color: rank_color(rank),
            }
        })
        .collect()
}
