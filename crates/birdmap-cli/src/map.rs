//! Self-contained Leaflet map for grouped sightings.
//!
//! The page loads Leaflet from a CDN and carries its data as one embedded
//! JSON object; nothing else is fetched at view time.

use birdmap_core::{PinGroup, Placement, RankedSighting};
use chrono::NaiveDate;
use serde::Serialize;

/// View used when no pin has a position (roughly the contiguous US).
const DEFAULT_CENTER: [f64; 2] = [39.8, -98.6];
const DEFAULT_ZOOM: u8 = 4;

/// Everything the page script needs.
#[derive(Debug, Serialize)]
pub struct MapData {
    pub title: String,
    pub sightings: usize,
    pub locations: usize,
    pub pins: Vec<Pin>,
    pub unplaced: Vec<Pin>,
    pub legend: Vec<LegendEntry>,
    pub default_center: [f64; 2],
    pub default_zoom: u8,
}

#[derive(Debug, Serialize)]
pub struct Pin {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub approximate: bool,
    pub color: String,
    /// Distinct species, for the hover tooltip.
    pub tooltip: String,
    pub entries: Vec<PopupEntry>,
}

#[derive(Debug, Serialize)]
pub struct PopupEntry {
    pub species: String,
    pub count: Option<u32>,
    pub confirmed: bool,
    pub observed: String,
    pub observer: Option<String>,
    pub comments: Option<String>,
    pub checklist: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct LegendEntry {
    pub date: String,
    pub color: String,
}

impl MapData {
    pub fn new(title: &str, groups: &[PinGroup]) -> Self {
        let sightings = groups.iter().map(|g| g.members.len()).sum();
        let (unplaced, pins): (Vec<&PinGroup>, Vec<&PinGroup>) = groups
            .iter()
            .partition(|g| g.placement == Placement::Unplaced);

        Self {
            title: title.to_string(),
            sightings,
            locations: groups.len(),
            pins: pins.into_iter().map(pin).collect(),
            unplaced: unplaced.into_iter().map(pin).collect(),
            legend: legend(groups),
            default_center: DEFAULT_CENTER,
            default_zoom: DEFAULT_ZOOM,
        }
    }
}

fn pin(group: &PinGroup) -> Pin {
    Pin {
        name: group.location_name().to_string(),
        lat: group.position.map(|c| c.lat),
        lon: group.position.map(|c| c.lon),
        approximate: group.placement == Placement::Approximate,
        color: group.color.hex(),
        tooltip: group.species().join(", "),
        entries: popup_entries(&group.members),
    }
}

/// One entry per member, newest first.
fn popup_entries(members: &[RankedSighting]) -> Vec<PopupEntry> {
    members
        .iter()
        .map(|m| {
            let r = &m.record;
            PopupEntry {
                species: r.species.clone(),
                count: r.count,
                confirmed: r.confirmed,
                observed: r.observed_at.to_string(),
                observer: r.observer.clone(),
                comments: r.comments.clone(),
                checklist: r.checklist_url.clone(),
            }
        })
        .collect()
}

/// Distinct observation dates, newest first, each with the color of its
/// first record. Empty unless there is more than one date.
fn legend(groups: &[PinGroup]) -> Vec<LegendEntry> {
    let mut members: Vec<&RankedSighting> = groups.iter().flat_map(|g| &g.members).collect();
    members.sort_by(|a, b| a.rank.total_cmp(&b.rank));

    let mut dates: Vec<(NaiveDate, &RankedSighting)> = Vec::new();
    for m in members {
        let date = m.record.observed_at.date;
        if !dates.iter().any(|(d, _)| *d == date) {
            dates.push((date, m));
        }
    }
    if dates.len() < 2 {
        return Vec::new();
    }
    dates
        .into_iter()
        .map(|(date, m)| LegendEntry {
            date: date.format("%b %d, %Y").to_string(),
            color: m.color.hex(),
        })
        .collect()
}

/// Render the complete HTML document.
pub fn render(data: &MapData) -> serde_json::Result<String> {
    let json = serde_json::to_string(data)?
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026");
    let title = escape_html(&data.title);
    Ok(fill(TEMPLATE, &[("{{TITLE}}", title.as_str()), ("{{DATA}}", json.as_str())]))
}

/// Substitute placeholders in one left-to-right pass; inserted values are
/// never rescanned.
fn fill(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((at, key, value)) = slots
        .iter()
        .filter_map(|&(key, value)| rest.find(key).map(|at| (at, key, value)))
        .min_by_key(|&(at, _, _)| at)
    {
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + key.len()..];
    }
    out.push_str(rest);
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{TITLE}}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
  html, body { margin: 0; height: 100%; font-family: system-ui, sans-serif; }
  #header { padding: 8px 12px; background: #2c3e50; color: #fff; }
  #header h1 { margin: 0; font-size: 18px; }
  #header .counts { font-size: 13px; opacity: 0.8; }
  #wrap { position: absolute; top: 56px; bottom: 0; left: 0; right: 0; display: flex; }
  #map { flex: 1; }
  #unplaced { width: 280px; overflow-y: auto; padding: 8px; border-left: 1px solid #ccc; font-size: 13px; }
  #unplaced:empty { display: none; }
  .legend { background: #fff; padding: 6px 8px; border-radius: 4px; font-size: 12px; line-height: 18px; }
  .legend i { display: inline-block; width: 12px; height: 12px; margin-right: 6px; border-radius: 50%; vertical-align: middle; }
  .entry { margin: 4px 0; }
  .entry .meta { color: #555; font-size: 12px; }
</style>
</head>
<body>
<div id="header"><h1>{{TITLE}}</h1><div class="counts" id="counts"></div></div>
<div id="wrap"><div id="map"></div><div id="unplaced"></div></div>
<script>
const DATA = {{DATA}};

function esc(s) {
  const d = document.createElement("div");
  d.textContent = s == null ? "" : String(s);
  return d.innerHTML;
}

function entryHtml(e) {
  let head = "<b>" + esc(e.species) + "</b>";
  if (e.count != null) head += " (" + e.count + ")";
  if (e.confirmed) head += " &#10003;";
  let meta = esc(e.observed);
  if (e.observer) meta += " by " + esc(e.observer);
  let html = '<div class="entry">' + head + '<div class="meta">' + meta + "</div>";
  if (e.comments) html += "<div>" + esc(e.comments) + "</div>";
  if (e.checklist) html += '<a href="' + esc(e.checklist) + '" target="_blank" rel="noopener">checklist</a>';
  return html + "</div>";
}

function pinHtml(p) {
  let html = "<h3>" + esc(p.name) + "</h3>";
  if (p.approximate) html += "<div><i>approximate location</i></div>";
  return html + p.entries.map(entryHtml).join("");
}

document.getElementById("counts").textContent =
  DATA.sightings + " sightings at " + DATA.locations + " locations";

const map = L.map("map");
L.tileLayer("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", {
  maxZoom: 18,
  attribution: "&copy; OpenStreetMap contributors"
}).addTo(map);

// Oldest first so the newest pins are drawn on top.
const bounds = [];
DATA.pins.slice().reverse().forEach(function (p) {
  const marker = L.circleMarker([p.lat, p.lon], {
    radius: 8,
    color: p.color,
    fillColor: p.color,
    fillOpacity: 0.8,
    weight: 2,
    dashArray: p.approximate ? "4 4" : null
  }).addTo(map);
  marker.bindTooltip(esc(p.tooltip));
  marker.bindPopup(pinHtml(p), { maxHeight: 320 });
  bounds.push([p.lat, p.lon]);
});

if (bounds.length > 0) {
  map.fitBounds(bounds, { padding: [30, 30], maxZoom: 12 });
} else {
  map.setView(DATA.default_center, DATA.default_zoom);
}

if (DATA.unplaced.length > 0) {
  const panel = document.getElementById("unplaced");
  panel.innerHTML = "<h3>Unmapped locations</h3>" + DATA.unplaced.map(function (p) {
    return '<div style="border-left: 4px solid ' + p.color + '; padding-left: 6px;">' + pinHtml(p) + "</div>";
  }).join("");
}

if (DATA.legend.length > 1) {
  const legend = L.control({ position: "bottomleft" });
  legend.onAdd = function () {
    const div = L.DomUtil.create("div", "legend");
    div.innerHTML = DATA.legend.map(function (l) {
      return '<div><i style="background:' + l.color + '"></i>' + esc(l.date) + "</div>";
    }).join("");
    return div;
  };
  legend.addTo(map);
}
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use birdmap_core::{
        AlertBatch, Coordinates, Filter, ObservedAt, Origin, SightingRecord, aggregate, colorize,
        group_sightings,
    };

    fn record(species: &str, place: &str, day: u32, coords: Option<(f64, f64)>) -> SightingRecord {
        let at = ObservedAt::on(NaiveDate::from_ymd_opt(2026, 2, day).unwrap());
        let mut r = SightingRecord::new(species, place, at, Origin::AlertEmail).unwrap();
        r.coordinates = coords.map(|(lat, lon)| Coordinates::new(lat, lon).unwrap());
        r
    }

    fn groups(records: Vec<SightingRecord>) -> Vec<PinGroup> {
        let batch = AlertBatch {
            label: "t".into(),
            records,
            skipped: 0,
        };
        let collection = aggregate([batch], &Filter::default())
            .into_collection()
            .unwrap();
        group_sightings(colorize(collection))
    }

    #[test]
    fn unplaced_groups_go_to_the_side_panel() {
        let data = MapData::new(
            "Alerts",
            &groups(vec![
                record("Smew", "Pier", 5, Some((42.0, -70.0))),
                record("Dovekie", "Nowhere known", 4, None),
            ]),
        );
        assert_eq!(data.sightings, 2);
        assert_eq!(data.locations, 2);
        assert_eq!(data.pins.len(), 1);
        assert_eq!(data.unplaced.len(), 1);
        assert_eq!(data.unplaced[0].name, "Nowhere known");
        assert!(data.unplaced[0].lat.is_none());
    }

    #[test]
    fn popup_lists_every_member_newest_first() {
        let mut a = record("Smew", "Pier", 6, Some((42.0, -70.0)));
        a.observer = Some("A".into());
        let mut b = record("Smew", "Pier", 5, Some((42.0, -70.0)));
        b.observer = Some("B".into());
        let mut c = record("Smew", "Pier", 4, Some((42.0, -70.0)));
        c.count = Some(2);

        let data = MapData::new("t", &groups(vec![c, a, b]));
        let entries = &data.pins[0].entries;
        let observers: Vec<Option<&str>> = entries.iter().map(|e| e.observer.as_deref()).collect();
        assert_eq!(observers, [Some("A"), Some("B"), None]);
        assert_eq!(entries[2].count, Some(2));
        assert_eq!(data.pins[0].tooltip, "Smew");
    }

    #[test]
    fn legend_lists_dates_only_when_there_are_several() {
        let one = MapData::new("t", &groups(vec![record("Smew", "Pier", 5, Some((42.0, -70.0)))]));
        assert!(one.legend.is_empty());

        let many = MapData::new(
            "t",
            &groups(vec![
                record("Smew", "Pier", 5, Some((42.0, -70.0))),
                record("Dovekie", "Dock", 5, Some((41.0, -70.0))),
                record("Razorbill", "Jetty", 3, Some((40.0, -70.0))),
            ]),
        );
        assert_eq!(
            many.legend,
            [
                LegendEntry {
                    date: "Feb 05, 2026".into(),
                    color: "#e74c3c".into()
                },
                LegendEntry {
                    date: "Feb 03, 2026".into(),
                    color: "#2c3e50".into()
                },
            ]
        );
    }

    #[test]
    fn rendered_page_escapes_title_and_embedded_data() {
        let mut r = record("Smew", "<script>alert(1)</script>", 5, Some((42.0, -70.0)));
        r.comments = Some("a </script> b".into());
        let html = render(&MapData::new("Rare & <odd>", &groups(vec![r]))).unwrap();

        assert!(html.contains("<title>Rare &amp; &lt;odd&gt;</title>"));
        assert!(!html.contains("</script> b"));
        assert!(html.contains("\\u003c/script\\u003e b"));
        assert!(html.contains("leaflet.js"));
    }

    #[test]
    fn placeholder_text_in_title_is_not_expanded() {
        let html = render(&MapData::new("Alerts {{DATA}} {{TITLE}}", &[])).unwrap();
        assert!(html.contains("<title>Alerts {{DATA}} {{TITLE}}</title>"));
        assert_eq!(html.matches("\"default_zoom\":4").count(), 1);
        assert!(html.contains("\"title\":\"Alerts {{DATA}} {{TITLE}}\""));
    }

    #[test]
    fn fill_replaces_each_slot_where_it_occurs() {
        assert_eq!(fill("a{{X}}b{{Y}}c{{X}}", &[("{{X}}", "1"), ("{{Y}}", "{{X}}")]), "a1b{{X}}c1");
    }

    #[test]
    fn empty_map_falls_back_to_default_view() {
        let data = MapData::new("Nothing", &[]);
        let html = render(&data).unwrap();
        assert!(html.contains("\"default_center\":[39.8,-98.6]"));
        assert!(html.contains("\"default_zoom\":4"));
        assert!(html.contains("\"pins\":[]"));
    }
}
