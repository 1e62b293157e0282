//! Input discovery: turn command-line paths into alert documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use birdmap_core::AlertDocument;
use chrono::{DateTime, Local};
use tracing::{debug, warn};

const ALERT_EXTENSIONS: &[&str] = &["eml", "txt"];

/// Documents that loaded, plus how many paths were passed over.
#[derive(Debug, Default)]
pub struct LoadedInputs {
    pub documents: Vec<AlertDocument>,
    pub failed: usize,
}

/// Expand `paths` into a file list. Files named explicitly are kept as
/// given; directories contribute their `.eml` and `.txt` files, sorted.
pub fn discover(paths: &[PathBuf]) -> (Vec<PathBuf>, usize) {
    let mut files = Vec::new();
    let mut failed = 0;
    for path in paths {
        if path.is_dir() {
            match alert_files_in(path) {
                Ok(mut found) => {
                    debug!(dir = %path.display(), count = found.len(), "scanned directory");
                    files.append(&mut found);
                }
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "skipping unreadable directory");
                    failed += 1;
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    (files, failed)
}

fn alert_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_alert_extension(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn has_alert_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ALERT_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
}

fn is_mime(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
}

/// Read one file. `.eml` files are parsed as MIME messages; anything else is
/// a raw alert body dated by its modification time.
pub fn load_document(path: &Path) -> anyhow::Result<AlertDocument> {
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    if is_mime(path) {
        return AlertDocument::from_mime(label, &raw)
            .with_context(|| format!("parsing message {}", path.display()));
    }

    let doc = AlertDocument::from_text(label, String::from_utf8_lossy(&raw));
    let modified = fs::metadata(path).and_then(|m| m.modified());
    Ok(match modified {
        Ok(mtime) => doc.with_dateline(DateTime::<Local>::from(mtime).date_naive()),
        Err(_) => doc,
    })
}

/// Discover and load every input, skipping what cannot be read.
pub fn load_inputs(paths: &[PathBuf]) -> LoadedInputs {
    let (files, mut failed) = discover(paths);
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        match load_document(&file) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!(file = %file.display(), error = format!("{e:#}"), "skipping input");
                failed += 1;
            }
        }
    }
    LoadedInputs { documents, failed }
}
