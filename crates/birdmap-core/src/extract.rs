//! Record extraction from rare bird alert text.
//!
//! An alert lists one sighting per block: a species header followed by
//! bulleted detail lines.
//!
//! ```text
//! Snowy Owl (Bubo scandiacus) (2) CONFIRMED
//! - Reported Feb 05, 2026 15:08 by Jane Doe
//! - Plum Island, Essex, Massachusetts, US
//! - Map: http://maps.google.com/?ie=UTF8&t=p&z=13&q=42.7,-70.8&ll=42.7,-70.8
//! - Checklist: https://ebird.org/checklist/S123456
//! - Comments: "Perched on the dunes."
//! ```
//!
//! Layout drifts between regions and mailer versions, so each line is
//! matched on its own and an entry is only judged when it is closed (by the
//! next header, a separator rule, or the end of the text). Entries missing
//! species, location or a resolvable date are skipped and counted.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;
use tracing::debug;

use crate::keys::is_country;
use crate::message::AlertDocument;
use crate::sighting::{AlertBatch, Coordinates, ObservedAt, Origin, SightingRecord};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<common>.+?)\s+\((?P<sci>[A-Z][a-z][^()]*(?:\([^()]*\)[^()]*)?)\)(?:\s*\((?P<count>\d+|[Xx])\))?(?:\s*(?P<confirmed>CONFIRMED))?\s*$",
    )
    .expect("header pattern")
});

static REPORTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Reported\s+(?P<when>.+?)(?:\s+by\s+(?P<observer>.+?))?\s*$")
        .expect("reported pattern")
});

static TIME_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<date>.+?)[\s,]+(?P<h>\d{1,2}):(?P<m>\d{2})(?:\s*(?P<ampm>[AaPp][Mm]))?$")
        .expect("time pattern")
});

static YEARLESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<month>[A-Za-z]{3,9})\.?\s+(?P<day>\d{1,2})$").expect("yearless pattern")
});

static MAP_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&](?:q|ll|query)=(?P<lat>-?\d{1,2}(?:\.\d+)?)(?:,|%2C)\s*(?P<lon>-?\d{1,3}(?:\.\d+)?)")
        .expect("map pattern")
});

static COORD_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?(?P<lat>-?\d{1,2}(?:\.\d+)?)\s*,\s*(?P<lon>-?\d{1,3}(?:\.\d+)?)\)?$")
        .expect("coordinate pair pattern")
});

/// Date layouts carrying an explicit year. `%b` also accepts full month names.
const DATED_FORMATS: &[&str] = &["%b %d, %Y", "%b %d %Y", "%Y-%m-%d", "%m/%d/%Y", "%d %b %Y"];

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// How far back a year-less date may be pushed to find a valid calendar day (Feb 29).
const MAX_YEAR_BACKTRACK: i32 = 8;

/// Extract sightings from one alert document, using its dateline to resolve
/// year-less dates.
pub fn extract_records(document: &AlertDocument) -> AlertBatch {
    let mut batch = extract_sightings(&document.body, document.dateline);
    batch.label = document.label.clone();
    batch
}

/// Extract sightings from alert body text.
///
/// `dateline` is the date the alert was sent. Without it, entries whose
/// report date has no year are skipped.
pub fn extract_sightings(body: &str, dateline: Option<NaiveDate>) -> AlertBatch {
    let mut batch = AlertBatch::default();
    let mut current: Option<PendingEntry> = None;

    let mut lines = body.lines().peekable();
    while let Some(raw) = lines.next() {
        let line = raw.trim();

        if is_separator(line) {
            close(&mut current, dateline, &mut batch);
            continue;
        }

        let (bulleted, rest) = match line.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, line),
        };

        let in_comment = current.as_ref().is_some_and(PendingEntry::comment_open);
        let details_follow = lines.peek().is_some_and(|next| starts_details(next));
        if !bulleted
            && (!in_comment || details_follow)
            && let Some(caps) = HEADER.captures(line)
        {
            close(&mut current, dateline, &mut batch);
            current = Some(PendingEntry::from_header(&caps));
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        if line.is_empty() {
            entry.continuing_comment = false;
            continue;
        }

        entry.absorb(bulleted, rest, dateline);
    }

    close(&mut current, dateline, &mut batch);
    batch
}

/// Whether `line` reads as the first detail line of an entry.
fn starts_details(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('-') || REPORTED.is_match(line) || split_label(line).is_some()
}

fn is_separator(line: &str) -> bool {
    line.starts_with("***") || line.starts_with("---") || line.starts_with("===")
}

fn close(current: &mut Option<PendingEntry>, dateline: Option<NaiveDate>, batch: &mut AlertBatch) {
    let Some(entry) = current.take() else {
        return;
    };
    let species = entry.species.clone();
    match entry.finish(dateline) {
        Ok(record) => batch.records.push(record),
        Err(reason) => {
            debug!(species = %species, reason, "skipping malformed alert entry");
            batch.skipped += 1;
        }
    }
}

/// Fields collected for the entry currently being read.
#[derive(Debug, Default)]
struct PendingEntry {
    species: String,
    scientific_name: Option<String>,
    count: Option<u32>,
    confirmed: bool,
    location: Option<String>,
    coordinates: Option<Coordinates>,
    map_seen: bool,
    reported: Option<String>,
    observed: Option<ObservedAt>,
    observer: Option<String>,
    comments: Option<String>,
    checklist_url: Option<String>,
    continuing_comment: bool,
}

impl PendingEntry {
    fn from_header(caps: &regex::Captures<'_>) -> Self {
        Self {
            species: caps["common"].trim().to_string(),
            scientific_name: Some(caps["sci"].trim().to_string()),
            count: caps.name("count").and_then(|c| c.as_str().parse().ok()),
            confirmed: caps.name("confirmed").is_some(),
            ..Default::default()
        }
    }

    /// A multi-line comment is still being read: unquoted, or quoted with
    /// the closing quote not yet seen.
    fn comment_open(&self) -> bool {
        self.continuing_comment
            && self.comments.as_deref().is_none_or(|c| {
                let c = c.trim_start();
                !c.starts_with('"') || c.matches('"').count() % 2 == 1
            })
    }

    fn absorb(&mut self, bulleted: bool, rest: &str, dateline: Option<NaiveDate>) {
        if let Some(caps) = REPORTED.captures(rest) {
            self.continuing_comment = false;
            let when = caps["when"].to_string();
            self.observed = parse_reported(&when, dateline);
            self.reported = Some(when);
            if let Some(observer) = caps.name("observer") {
                self.observer = non_empty(observer.as_str());
            }
            return;
        }

        if let Some((label, value)) = split_label(rest) {
            self.continuing_comment = false;
            match label.as_str() {
                "map" => {
                    self.map_seen = true;
                    if self.coordinates.is_none() {
                        self.coordinates = map_coordinates(value);
                    }
                }
                "coordinates" | "coords" | "gps" | "lat/long" => {
                    self.coordinates = self.coordinates.or_else(|| coordinate_pair(value));
                }
                "checklist" => self.checklist_url = non_empty(value),
                "comments" => {
                    self.comments = non_empty(value);
                    self.continuing_comment = true;
                }
                "location" => {
                    if self.location.is_none() {
                        self.location = non_empty(value);
                    }
                }
                "observer" => self.observer = non_empty(value),
                "date" => {
                    self.observed = parse_reported(value, dateline);
                    self.reported = Some(value.to_string());
                }
                _ => {}
            }
            return;
        }

        if bulleted {
            self.continuing_comment = false;
            if self.location.is_none() && !self.map_seen {
                self.location = non_empty(rest);
            }
        } else if self.continuing_comment
            && let Some(comments) = self.comments.as_mut()
        {
            comments.push(' ');
            comments.push_str(rest);
        }
    }

    fn finish(self, dateline: Option<NaiveDate>) -> Result<SightingRecord, &'static str> {
        let location = self.location.ok_or("no location line")?;
        let observed = match (self.observed, self.reported) {
            (Some(at), _) => at,
            (None, Some(_)) if dateline.is_none() => return Err("report date needs a dateline"),
            (None, Some(_)) => return Err("unparsable report date"),
            (None, None) => return Err("no report line"),
        };

        let mut record = SightingRecord::new(self.species, location, observed, Origin::AlertEmail)
            .map_err(|_| "blank species or location")?;
        let (county, state) = split_region(&record.location_name);
        record.scientific_name = self.scientific_name;
        record.count = self.count;
        record.confirmed = self.confirmed;
        record.coordinates = self.coordinates;
        record.county = county;
        record.state = state;
        record.observer = self.observer;
        record.comments = self
            .comments
            .map(|c| c.trim().trim_matches('"').trim().to_string())
            .filter(|c| !c.is_empty());
        record.checklist_url = self.checklist_url;
        Ok(record)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Split `Label: value` when the label is one an alert field uses.
fn split_label(rest: &str) -> Option<(String, &str)> {
    let (label, value) = rest.split_once(':')?;
    let label = label.trim().to_ascii_lowercase();
    match label.as_str() {
        "map" | "coordinates" | "coords" | "gps" | "lat/long" | "checklist" | "comments"
        | "media" | "location" | "observer" | "date" => Some((label, value.trim())),
        _ => None,
    }
}

fn map_coordinates(value: &str) -> Option<Coordinates> {
    let caps = MAP_QUERY.captures(value)?;
    to_coordinates(&caps)
}

fn coordinate_pair(value: &str) -> Option<Coordinates> {
    let caps = COORD_PAIR.captures(value.trim())?;
    to_coordinates(&caps)
}

fn to_coordinates(caps: &regex::Captures<'_>) -> Option<Coordinates> {
    let lat: f64 = caps["lat"].parse().ok()?;
    let lon: f64 = caps["lon"].parse().ok()?;
    Coordinates::new(lat, lon).ok()
}

/// Parse the `when` part of a report line: a date, optionally followed by
/// a `HH:MM` time (12-hour with AM/PM also accepted).
pub fn parse_reported(when: &str, dateline: Option<NaiveDate>) -> Option<ObservedAt> {
    let when = when.trim();
    let (date_part, time) = match TIME_SUFFIX.captures(when) {
        Some(caps) => {
            let mut hour: u32 = caps["h"].parse().ok()?;
            let minute: u32 = caps["m"].parse().ok()?;
            if let Some(ampm) = caps.name("ampm") {
                let pm = ampm.as_str().eq_ignore_ascii_case("pm");
                hour = match (pm, hour) {
                    (false, 12) => 0,
                    (true, h) if h < 12 => h + 12,
                    (_, h) => h,
                };
            }
            let date_part = caps.name("date").map_or("", |m| m.as_str());
            (date_part, Some(NaiveTime::from_hms_opt(hour, minute, 0)?))
        }
        None => (when, None),
    };

    let date_part = date_part.trim().trim_end_matches(',');
    let date = parse_date(date_part, dateline)?;
    Some(ObservedAt::new(date, time))
}

fn parse_date(text: &str, dateline: Option<NaiveDate>) -> Option<NaiveDate> {
    if let Some(date) = DATED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    {
        return Some(date);
    }

    let caps = YEARLESS.captures(text)?;
    let month = month_number(&caps["month"])?;
    let day: u32 = caps["day"].parse().ok()?;
    resolve_year(month, day, dateline?)
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| m.starts_with(&name))
        .map(|i| i as u32 + 1)
}

/// Pick the most recent year in which `month/day` exists and does not fall
/// after `dateline`.
pub fn resolve_year(month: u32, day: u32, dateline: NaiveDate) -> Option<NaiveDate> {
    (0..=MAX_YEAR_BACKTRACK).find_map(|back| {
        NaiveDate::from_ymd_opt(dateline.year() - back, month, day).filter(|d| *d <= dateline)
    })
}

/// Derive `(county, state)` from a comma-separated location line.
///
/// The last part is the state once a trailing country is dropped; the part
/// before it is the county when at least one more part precedes it.
pub fn split_region(location: &str) -> (Option<String>, Option<String>) {
    let mut parts: Vec<&str> = location
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() >= 2
        && let Some(last) = parts.last()
        && is_country(last)
    {
        parts.pop();
    }

    let n = parts.len();
    let state = (n >= 2).then(|| parts[n - 1].to_string());
    let county = (n >= 3).then(|| parts[n - 2].to_string());
    (county, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const ALERT: &str = "\
*** Species Summary:

- Snowy Owl (1 Essex)
- Tufted Duck (1 Barnstable)

*** Detailed Report

Snowy Owl (Bubo scandiacus) (2) CONFIRMED
- Reported Feb 05, 2026 15:08 by Jane Doe
- Plum Island, Essex, Massachusetts, US
- Map: http://maps.google.com/?ie=UTF8&t=p&z=13&q=42.7,-70.8&ll=42.7,-70.8
- Checklist: https://ebird.org/checklist/S123456
- Comments: \"Perched on the dunes
near lot 1.\"
- Media: 1 Photo

Tufted Duck (Aythya fuligula) (X)
- Reported Feb 04, 2026 by John Roe
- Mill Pond, Barnstable, Massachusetts
- Checklist: https://ebird.org/checklist/S654321

Ross's Gull (Rhodostethia rosea)
- Reported Feb 04, 2026 08:00 by Someone
- Map: http://maps.google.com/?q=41.5,-70.6

***********

You received this message because you are subscribed to eBird Rare Bird Alerts.
";

    #[test]
    fn extracts_well_formed_entries_and_skips_broken_one() {
        let batch = extract_sightings(ALERT, Some(date(2026, 2, 6)));
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 1, "Ross's Gull has no location line");

        let owl = &batch.records[0];
        assert_eq!(owl.species, "Snowy Owl");
        assert_eq!(owl.scientific_name.as_deref(), Some("Bubo scandiacus"));
        assert_eq!(owl.count, Some(2));
        assert!(owl.confirmed);
        assert_eq!(owl.location_name, "Plum Island, Essex, Massachusetts, US");
        assert_eq!(owl.state.as_deref(), Some("Massachusetts"));
        assert_eq!(owl.county.as_deref(), Some("Essex"));
        let c = owl.coordinates.unwrap();
        assert_eq!((c.lat, c.lon), (42.7, -70.8));
        assert_eq!(
            owl.observed_at,
            ObservedAt::new(date(2026, 2, 5), NaiveTime::from_hms_opt(15, 8, 0))
        );
        assert_eq!(owl.observer.as_deref(), Some("Jane Doe"));
        assert_eq!(owl.comments.as_deref(), Some("Perched on the dunes near lot 1."));
        assert_eq!(
            owl.checklist_url.as_deref(),
            Some("https://ebird.org/checklist/S123456")
        );
        assert_eq!(owl.origin, Origin::AlertEmail);
    }

    #[test]
    fn entry_without_coordinates_is_kept() {
        let batch = extract_sightings(ALERT, Some(date(2026, 2, 6)));
        let duck = &batch.records[1];
        assert_eq!(duck.species, "Tufted Duck");
        assert_eq!(duck.count, None, "X means present but uncounted");
        assert!(!duck.confirmed);
        assert!(duck.coordinates.is_none());
        assert_eq!(duck.observed_at, ObservedAt::on(date(2026, 2, 4)));
    }

    #[test]
    fn summary_lines_before_first_header_are_ignored() {
        let batch = extract_sightings("- Snowy Owl (1 Essex)\n- Smew (2 Suffolk)\n", None);
        assert!(batch.records.is_empty());
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn yearless_date_resolves_against_dateline() {
        let body = "\
Smew (Mergellus albellus)
- Reported Dec 30 07:15 by A. Birder
- Quabbin Reservoir, Hampshire, Massachusetts
";
        let batch = extract_sightings(body, Some(date(2026, 1, 2)));
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].observed_at.date, date(2025, 12, 30));
    }

    #[test]
    fn yearless_date_without_dateline_is_skipped() {
        let body = "\
Smew (Mergellus albellus)
- Reported Dec 30 by A. Birder
- Quabbin Reservoir, Hampshire, Massachusetts
";
        let batch = extract_sightings(body, None);
        assert!(batch.records.is_empty());
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn resolve_year_handles_leap_day_and_same_day() {
        assert_eq!(resolve_year(2, 29, date(2026, 3, 1)), Some(date(2024, 2, 29)));
        assert_eq!(resolve_year(2, 6, date(2026, 2, 6)), Some(date(2026, 2, 6)));
        assert_eq!(resolve_year(2, 7, date(2026, 2, 6)), Some(date(2025, 2, 7)));
        assert_eq!(resolve_year(2, 30, date(2026, 3, 1)), None);
    }

    #[test]
    fn alternate_layout_with_labels_and_coordinate_pair() {
        let body = "\
Ivory Gull (Pagophila eburnea) (1)
Date: 2026-02-03 16:45
Observer: Pat Lee
Location: Gloucester Harbor, Essex, Massachusetts
Coordinates: 42.61, -70.66
Comments: Adult on the breakwater.
";
        let batch = extract_sightings(body, None);
        assert_eq!(batch.records.len(), 1);
        let gull = &batch.records[0];
        assert_eq!(gull.observer.as_deref(), Some("Pat Lee"));
        assert_eq!(gull.state.as_deref(), Some("Massachusetts"));
        assert_eq!(gull.coordinates.unwrap().lat, 42.61);
        assert_eq!(
            gull.observed_at,
            ObservedAt::new(date(2026, 2, 3), NaiveTime::from_hms_opt(16, 45, 0))
        );
        assert_eq!(gull.comments.as_deref(), Some("Adult on the breakwater."));
    }

    #[test]
    fn google_maps_search_url_and_encoded_comma() {
        assert!(map_coordinates("https://www.google.com/maps/search/?api=1&query=38.9%2C-76.5").is_some());
        assert!(map_coordinates("http://maps.google.com/?q=95.0,-70.0").is_none());
        assert!(map_coordinates("no coordinates here").is_none());
    }

    #[test]
    fn reported_time_variants() {
        let d = Some(date(2026, 2, 10));
        let at = parse_reported("Feb 05, 2026 3:08 PM", d).unwrap();
        assert_eq!(at.time, NaiveTime::from_hms_opt(15, 8, 0));
        let at = parse_reported("February 5, 2026", d).unwrap();
        assert_eq!(at, ObservedAt::on(date(2026, 2, 5)));
        assert!(parse_reported("sometime last week", d).is_none());
    }

    #[test]
    fn observer_with_by_in_name_is_kept_whole() {
        let caps = REPORTED
            .captures("Reported Feb 05, 2026 15:08 by Abby Kirby")
            .unwrap();
        assert_eq!(&caps["when"], "Feb 05, 2026 15:08");
        assert_eq!(&caps["observer"], "Abby Kirby");
    }

    #[test]
    fn hybrid_and_domestic_headers() {
        let caps = HEADER
            .captures("Mallard (Domestic type) (Anas platyrhynchos (Domestic type)) (3)")
            .unwrap();
        assert_eq!(&caps["common"], "Mallard (Domestic type)");
        assert_eq!(&caps["count"], "3");

        let caps = HEADER
            .captures("Snow x Ross's Goose (hybrid) (Anser caerulescens x rossii)")
            .unwrap();
        assert_eq!(&caps["common"], "Snow x Ross's Goose (hybrid)");
    }

    #[test]
    fn split_region_variants() {
        assert_eq!(
            split_region("Plum Island, Essex, Massachusetts, US"),
            (Some("Essex".into()), Some("Massachusetts".into()))
        );
        assert_eq!(
            split_region("Mill Pond, Maryland"),
            (None, Some("Maryland".into()))
        );
        assert_eq!(split_region("Somewhere"), (None, None));
    }

    #[test]
    fn header_shaped_comment_line_stays_in_the_comment() {
        let body = "\
Ivory Gull (Pagophila eburnea) (1)
- Reported Feb 03, 2026 16:45 by Pat Lee
- Gloucester Harbor, Essex, Massachusetts, US
- Comments: \"Adult on the breakwater.
Seen with Glaucous Gull (Larus hyperboreus)
until dusk.\"
Smew (Mergellus albellus)
- Reported Feb 02, 2026 by A
- Mill Pond, Barnstable, Massachusetts
- Comments: Drake, no quotes here
Iceland Gull (Larus glaucoides)
- Reported Feb 01, 2026 by B
- Race Point Beach, Barnstable, Massachusetts
";
        let batch = extract_sightings(body, None);
        assert_eq!(batch.records.len(), 3);
        assert_eq!(
            batch.records[0].comments.as_deref(),
            Some("Adult on the breakwater. Seen with Glaucous Gull (Larus hyperboreus) until dusk.")
        );
        assert_eq!(batch.records[1].comments.as_deref(), Some("Drake, no quotes here"));
        assert_eq!(batch.records[2].species, "Iceland Gull");
    }

    #[test]
    fn extract_records_carries_document_label() {
        let doc = AlertDocument::from_text("alert.txt", ALERT).with_dateline(date(2026, 2, 6));
        let batch = extract_records(&doc);
        assert_eq!(batch.label, "alert.txt");
        assert_eq!(batch.records.len(), 2);
    }
}
