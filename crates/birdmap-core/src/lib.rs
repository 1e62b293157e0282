//! Core pipeline for birdmap: alert extraction, API adaptation, aggregation,
//! recency coloring and pin grouping.

pub mod aggregate;
pub mod colorize;
pub mod ebird;
mod error;
pub mod extract;
pub mod group;
pub mod keys;
pub mod message;
pub mod sighting;

pub use aggregate::{AggregateStats, Aggregated, AggregatedCollection, Filter, aggregate};
pub use colorize::{RankedSighting, Rgb, colorize};
pub use ebird::{NotableObservation, ObservationWindow, Rejection, adapt_observation};
pub use error::CoreError;
pub use extract::{extract_records, extract_sightings};
pub use group::{PinGroup, PinKey, Placement, group_sightings};
pub use keys::{COORD_PRECISION, normalize_name, place_stem};
pub use message::AlertDocument;
pub use sighting::{AlertBatch, Coordinates, ObservedAt, Origin, SightingRecord, SourceId};
