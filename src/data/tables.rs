// ============================================================
// Layer 4 — Label Table Readers
// ============================================================
// Reads the CSV tables a run depends on:
//
//   label tables       → (image id, grade) per row
//   duplicate table    → ids of images that appear more than once
//                        with a known grade
//   pseudo-label table → (image id, predicted grade) for the
//                        unlabelled test set
//
// Columns are looked up by header name, so extra columns are
// ignored and column order does not matter.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::error::TrainError;

/// One (id, grade) row of a label table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    pub id:    String,
    pub grade: u8,
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
        TrainError::integrity(format!("'{}' has no column '{name}'", path.display())).into()
    })
}

/// Parse a grade written as an integer ("3") or as a float ("2.7" → 3).
pub fn parse_grade(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    if let Ok(g) = raw.parse::<u8>() {
        return Some(g);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.round() <= f64::from(u8::MAX) {
        Some(f.round() as u8)
    } else {
        None
    }
}

/// Read `(id_column, grade_column)` pairs from a CSV label table.
pub fn read_label_table(path: &Path, id_column: &str, grade_column: &str) -> Result<Vec<LabelRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Cannot open label table '{}'", path.display()))?;
    let headers = reader.headers()?.clone();
    let id_idx    = column(&headers, id_column, path)?;
    let grade_idx = column(&headers, grade_column, path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad CSV row in '{}'", path.display()))?;
        let id  = record.get(id_idx).unwrap_or_default().trim().to_string();
        let raw = record.get(grade_idx).unwrap_or_default();
        let grade = parse_grade(raw).ok_or_else(|| {
            TrainError::integrity(format!(
                "'{}' row {}: grade '{raw}' is not a non-negative number",
                path.display(),
                line + 2
            ))
        })?;
        rows.push(LabelRow { id, grade });
    }

    tracing::debug!("Read {} labelled rows from '{}'", rows.len(), path.display());
    Ok(rows)
}

/// Ids flagged in the duplicate table: rows whose image hash occurs
/// more than once (`strMd5_count > 1`) and that carry a grade.
pub fn read_duplicate_ids(path: &Path) -> Result<HashSet<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Cannot open duplicate table '{}'", path.display()))?;
    let headers = reader.headers()?.clone();
    let id_idx    = column(&headers, "id_code", path)?;
    let count_idx = column(&headers, "strMd5_count", path)?;
    let grade_idx = column(&headers, "diagnosis", path)?;

    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad CSV row in '{}'", path.display()))?;
        let count = record
            .get(count_idx)
            .and_then(|c| c.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        let graded = record.get(grade_idx).is_some_and(|g| parse_grade(g).is_some());
        if count > 1.0 && graded {
            ids.insert(record.get(id_idx).unwrap_or_default().trim().to_string());
        }
    }

    tracing::debug!("{} duplicated images flagged in '{}'", ids.len(), path.display());
    Ok(ids)
}
