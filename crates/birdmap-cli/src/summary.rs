//! Plain-text run summary on stdout.

use std::io::{self, Write};

use birdmap_core::{AlertBatch, Aggregated, Filter};

/// Per-input tally, taken before the batches are consumed by aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCount {
    pub label: String,
    pub records: usize,
    pub skipped: usize,
}

impl From<&AlertBatch> for BatchCount {
    fn from(batch: &AlertBatch) -> Self {
        Self {
            label: batch.label.clone(),
            records: batch.records.len(),
            skipped: batch.skipped,
        }
    }
}

pub fn write_summary(
    out: &mut impl Write,
    counts: &[BatchCount],
    filter: &Filter,
    outcome: &Aggregated,
) -> io::Result<()> {
    for c in counts {
        write!(out, "  {}: {} sightings", c.label, c.records)?;
        if c.skipped > 0 {
            write!(out, " ({} skipped)", c.skipped)?;
        }
        writeln!(out)?;
    }

    let stats = outcome.stats();
    if let Some(state) = &filter.state {
        writeln!(
            out,
            "State filter '{state}': removed {}",
            stats.dropped_state
        )?;
    }
    if let Some(days) = filter.max_age_days {
        writeln!(out, "Last {days} days: removed {}", stats.dropped_age)?;
    }
    if stats.duplicates > 0 {
        writeln!(out, "Duplicates merged: {}", stats.duplicates)?;
    }

    match outcome {
        Aggregated::Empty(_) => writeln!(out, "No sightings found.")?,
        Aggregated::Sightings(collection) => {
            writeln!(out, "Total unique sightings: {}", collection.len())?;
            let species = collection.species();
            writeln!(out, "Species ({}):", species.len())?;
            for name in species {
                writeln!(out, "  {name}")?;
            }
        }
    }
    Ok(())
}
