//! Query configuration and the source seam between fetching and adapting.

use std::fmt;

use async_trait::async_trait;
use birdmap_core::{AlertBatch, NotableObservation, ObservationWindow, Rejection, adapt_observation};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::SyncError;

/// Days the notable-observations endpoint accepts for `back`.
pub const DAYS_BACK_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

/// eBird API token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, SyncError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(SyncError::InvalidQuery("API key is empty".into()));
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// A validated region code and look-back window.
///
/// Region codes are hierarchical: country (`US`), state (`US-MA`), county
/// (`US-MA-009`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionQuery {
    region: String,
    days_back: u32,
}

impl RegionQuery {
    pub fn new(region: &str, days_back: u32) -> Result<Self, SyncError> {
        let region = region.trim().to_ascii_uppercase();
        if !is_region_code(&region) {
            return Err(SyncError::InvalidQuery(format!(
                "'{region}' is not a region code like US, US-MA or US-MA-009"
            )));
        }
        if !DAYS_BACK_RANGE.contains(&days_back) {
            return Err(SyncError::InvalidQuery(format!(
                "days back must be within {}..={}, got {days_back}",
                DAYS_BACK_RANGE.start(),
                DAYS_BACK_RANGE.end()
            )));
        }
        Ok(Self { region, days_back })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn days_back(&self) -> u32 {
        self.days_back
    }
}

fn is_region_code(code: &str) -> bool {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.is_empty() || parts.len() > 3 {
        return false;
    }
    let country_ok = parts[0].len() == 2 && parts[0].chars().all(|c| c.is_ascii_uppercase());
    country_ok
        && parts[1..]
            .iter()
            .all(|p| (1..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Something that can answer a notable-observations query.
#[async_trait]
pub trait NotableSource {
    async fn fetch_notable(&self, query: &RegionQuery)
    -> Result<Vec<NotableObservation>, SyncError>;
}

/// Fetch one region query and adapt its entries into a batch.
///
/// Entries outside `as_of − days_back ..= as_of` are dropped even though the
/// source was asked for exactly that window.
pub async fn collect_notable<S>(
    source: &S,
    query: &RegionQuery,
    as_of: NaiveDate,
) -> Result<AlertBatch, SyncError>
where
    S: NotableSource + ?Sized + Sync,
{
    info!(region = %query.region(), days_back = query.days_back(), "fetching notable observations");
    let entries = source.fetch_notable(query).await?;
    let window = ObservationWindow::new(as_of, query.days_back());

    let mut batch = AlertBatch::new(format!("eBird {}", query.region()));
    let mut outside = 0usize;
    for obs in &entries {
        match adapt_observation(obs, &window) {
            Ok(record) => batch.records.push(record),
            Err(Rejection::OutsideWindow(_)) => {
                outside += 1;
                batch.skipped += 1;
            }
            Err(Rejection::Malformed(field)) => {
                debug!(species = %obs.com_name, field, "skipping malformed observation");
                batch.skipped += 1;
            }
        }
    }

    info!(
        fetched = entries.len(),
        kept = batch.records.len(),
        outside_window = outside,
        "collected notable observations"
    );
    Ok(batch)
}
