use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ValidationError;
use super::snapshot::StructureSnapshot;

/// One entry of a submitted response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub indicator: u32,
    pub score: u16,
}

/// Stored response record. The indicator id is a plain integer rather than a
/// template reference so that later template edits cannot cascade into
/// historical evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorResponse {
    pub indicator: u32,
    pub score: u16,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of one upsert, mostly useful for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerDiff {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// Validate a full submission against the snapshot before anything is
/// written. The first violation fails the whole submission, naming the
/// indicator and the snapshot version it was checked against.
pub fn validate(
    snapshot: &StructureSnapshot,
    version: &str,
    entries: &[ResponseEntry],
) -> Result<(), ValidationError> {
    let legal = snapshot.indicator_ids();

    for entry in entries {
        if !legal.contains(&entry.indicator) {
            return Err(ValidationError::UnknownIndicator {
                indicator: entry.indicator,
                version: version.to_string(),
            });
        }
        let max = snapshot
            .indicator(entry.indicator)
            .map(|indicator| indicator.max_score())
            .unwrap_or(0);
        if entry.score > max {
            return Err(ValidationError::ScoreOutOfBounds {
                indicator: entry.indicator,
                score: entry.score,
                max,
            });
        }
    }

    Ok(())
}

/// Apply a validated submission as an authoritative snapshot of the full
/// response set: insert new records, update changed ones, prune records whose
/// indicator is absent from the submission. Duplicate indicator ids within
/// one payload collapse last-wins before diffing.
///
/// Unchanged records keep their original `recorded_at`, so resubmitting an
/// identical payload leaves stored state byte-for-byte untouched.
pub fn apply(
    records: &mut Vec<IndicatorResponse>,
    entries: &[ResponseEntry],
    now: DateTime<Utc>,
) -> LedgerDiff {
    let submitted: BTreeMap<u32, u16> = entries
        .iter()
        .map(|entry| (entry.indicator, entry.score))
        .collect();
    let existing: BTreeSet<u32> = records.iter().map(|record| record.indicator).collect();

    let mut diff = LedgerDiff::default();

    records.retain_mut(|record| match submitted.get(&record.indicator) {
        Some(&score) if score == record.score => {
            diff.unchanged += 1;
            true
        }
        Some(&score) => {
            record.score = score;
            record.recorded_at = now;
            diff.updated += 1;
            true
        }
        None => {
            diff.removed += 1;
            false
        }
    });

    for (&indicator, &score) in &submitted {
        if !existing.contains(&indicator) {
            records.push(IndicatorResponse {
                indicator,
                score,
                recorded_at: now,
            });
            diff.created += 1;
        }
    }

    records.sort_by_key(|record| record.indicator);
    diff
}

/// Score recorded for an indicator, if any.
pub fn score_for(records: &[IndicatorResponse], indicator: u32) -> Option<u16> {
    records
        .iter()
        .find(|record| record.indicator == indicator)
        .map(|record| record.score)
}
