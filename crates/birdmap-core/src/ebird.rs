//! eBird API notable-observation entries and their conversion to
//! [`SightingRecord`]s.
//!
//! Shape follows `GET /v2/data/obs/{region}/recent/notable?detail=full`.

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sighting::{Coordinates, ObservedAt, Origin, SightingRecord};

const CHECKLIST_BASE: &str = "https://ebird.org/checklist";

/// One entry of the notable-observations feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotableObservation {
    pub species_code: Option<String>,
    pub com_name: String,
    pub sci_name: Option<String>,
    pub loc_id: Option<String>,
    pub loc_name: Option<String>,
    /// `YYYY-MM-DD HH:MM`, or `YYYY-MM-DD` when no time was recorded.
    pub obs_dt: String,
    pub how_many: Option<u32>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub obs_valid: bool,
    pub obs_reviewed: bool,
    pub location_private: bool,
    pub sub_id: Option<String>,
    pub user_display_name: Option<String>,
    /// State or province name (`detail=full` only).
    pub subnational1_name: Option<String>,
    /// County name (`detail=full` only).
    pub subnational2_name: Option<String>,
}

/// The day range a query asked for: `days_back` days up to `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationWindow {
    pub as_of: NaiveDate,
    pub days_back: u32,
}

impl ObservationWindow {
    pub fn new(as_of: NaiveDate, days_back: u32) -> Self {
        Self { as_of, days_back }
    }

    /// Earliest date inside the window.
    pub fn earliest(&self) -> NaiveDate {
        self.as_of
            .checked_sub_days(Days::new(u64::from(self.days_back)))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.earliest() && date <= self.as_of
    }
}

/// Why an entry did not become a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The source returned an entry outside the requested window.
    OutsideWindow(NaiveDate),
    /// A required field was missing or unparsable.
    Malformed(&'static str),
}

/// Convert one notable observation into a sighting record.
///
/// Performs no filtering beyond the window check: region bounds are the
/// query's business.
pub fn adapt_observation(
    obs: &NotableObservation,
    window: &ObservationWindow,
) -> Result<SightingRecord, Rejection> {
    let observed_at = parse_obs_dt(&obs.obs_dt).ok_or(Rejection::Malformed("obsDt"))?;
    if !window.contains(observed_at.date) {
        debug!(
            species = %obs.com_name,
            date = %observed_at.date,
            "dropping observation outside requested window"
        );
        return Err(Rejection::OutsideWindow(observed_at.date));
    }

    let coordinates = match (obs.lat, obs.lng) {
        (Some(lat), Some(lng)) => Coordinates::new(lat, lng).ok(),
        _ => None,
    };

    let location_name = obs
        .loc_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| coordinates.map(|c| format!("{:.5}, {:.5}", c.lat, c.lon)))
        .ok_or(Rejection::Malformed("locName"))?;

    let mut record = SightingRecord::new(&obs.com_name, location_name, observed_at, Origin::Api)
        .map_err(|_| Rejection::Malformed("comName"))?;
    record.scientific_name = obs.sci_name.clone().filter(|s| !s.is_empty());
    record.count = obs.how_many.filter(|&n| n > 0);
    record.confirmed = obs.obs_reviewed && obs.obs_valid;
    record.coordinates = coordinates;
    record.county = obs.subnational2_name.clone();
    record.state = obs.subnational1_name.clone();
    record.observer = obs.user_display_name.clone().filter(|s| !s.is_empty());
    record.checklist_url = obs
        .sub_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|id| format!("{CHECKLIST_BASE}/{id}"));
    Ok(record)
}

fn parse_obs_dt(s: &str) -> Option<ObservedAt> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Some(ObservedAt::new(dt.date(), Some(dt.time())));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(ObservedAt::on)
}
