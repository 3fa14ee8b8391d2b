//! Derived views: filter a fetched collection by the current criteria and
//! summarize what is left.
//!
//! `project` is pure. It borrows the records, never reorders or mutates
//! them, and builds a fresh view on every call.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::filters::FilterCriteria;
use crate::types::{Client, Lead};

/// Leads at or above this score are "hot targets".
pub const HOT_LEAD_SCORE: f64 = 75.0;
/// Clients at or above this upsell score are "high yield".
pub const HIGH_YIELD_CLIENT_SCORE: f64 = 70.0;
/// Risk scores at or above this mark a client "at risk".
pub const AT_RISK_SCORE: f64 = 50.0;
/// Cut for the expansion-targets side panel.
pub const TARGET_SCORE: f64 = 70.0;

/// Field accessors the pipeline needs from a backend record.
pub trait ScoredRecord {
    /// Score at or above which the record counts toward `high_score_count`.
    const HIGH_SCORE_CUT: f64;

    fn id(&self) -> i64;
    fn company(&self) -> &str;
    fn sector(&self) -> &str;
    fn region(&self) -> Option<&str>;
    fn score(&self) -> f64;

    /// Support-risk score, for records that carry one.
    fn risk_score(&self) -> Option<f64> {
        None
    }
}

impl ScoredRecord for Lead {
    const HIGH_SCORE_CUT: f64 = HOT_LEAD_SCORE;

    fn id(&self) -> i64 {
        self.id
    }
    fn company(&self) -> &str {
        &self.company
    }
    fn sector(&self) -> &str {
        &self.sector
    }
    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
    fn score(&self) -> f64 {
        self.lead_score
    }
}

impl ScoredRecord for Client {
    const HIGH_SCORE_CUT: f64 = HIGH_YIELD_CLIENT_SCORE;

    fn id(&self) -> i64 {
        self.id
    }
    fn company(&self) -> &str {
        &self.company
    }
    fn sector(&self) -> &str {
        &self.sector
    }
    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
    fn score(&self) -> f64 {
        self.upsell_score
    }
    fn risk_score(&self) -> Option<f64> {
        Some(self.risk_score)
    }
}

/// Aggregates over a filtered view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub count: usize,
    pub average_score: f64,
    pub high_score_count: usize,
    pub at_risk_count: usize,
    pub sector_counts: BTreeMap<String, usize>,
}

/// Filtered records (input order) plus their summary.
#[derive(Debug, Clone)]
pub struct DerivedView<'a, T> {
    pub records: Vec<&'a T>,
    pub summary: Summary,
}

/// Whether `record` satisfies every clause of `criteria`.
pub fn matches<T: ScoredRecord>(record: &T, criteria: &FilterCriteria) -> bool {
    if !criteria.sectors.is_empty() && !criteria.sectors.contains(record.sector()) {
        return false;
    }
    if !criteria.regions.is_empty() {
        match record.region() {
            Some(region) if criteria.regions.contains(region) => {}
            _ => return false,
        }
    }
    let score = record.score();
    if score < criteria.min_score as f64 || score > criteria.max_score as f64 {
        return false;
    }
    if !criteria.search_query.is_empty() {
        let needle = criteria.search_query.to_lowercase();
        let hit = record.company().to_lowercase().contains(&needle)
            || record.sector().to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    true
}

pub fn project<'a, T: ScoredRecord>(records: &'a [T], criteria: &FilterCriteria) -> DerivedView<'a, T> {
    let filtered: Vec<&T> = records.iter().filter(|r| matches(*r, criteria)).collect();
    let summary = summarize(&filtered);
    DerivedView {
        records: filtered,
        summary,
    }
}

pub fn summarize<T: ScoredRecord>(records: &[&T]) -> Summary {
    let count = records.len();
    let average_score = if count == 0 {
        0.0
    } else {
        records.iter().map(|r| r.score()).sum::<f64>() / count as f64
    };
    let high_score_count = records
        .iter()
        .filter(|r| r.score() >= T::HIGH_SCORE_CUT)
        .count();
    let at_risk_count = records
        .iter()
        .filter(|r| r.risk_score().is_some_and(|risk| risk >= AT_RISK_SCORE))
        .count();

    let mut sector_counts = BTreeMap::new();
    for record in records {
        *sector_counts.entry(record.sector().to_string()).or_insert(0) += 1;
    }

    Summary {
        count,
        average_score,
        high_score_count,
        at_risk_count,
        sector_counts,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Score,
    Company,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Stable sort of a view's records. The summary is order-independent and
/// left untouched.
pub fn sort_view<T: ScoredRecord>(view: &mut DerivedView<'_, T>, key: SortKey, order: SortOrder) {
    view.records.sort_by(|a, b| {
        let ord = match key {
            SortKey::Score => a.score().partial_cmp(&b.score()).unwrap_or(Ordering::Equal),
            SortKey::Company => a
                .company()
                .to_lowercase()
                .cmp(&b.company().to_lowercase()),
            SortKey::Id => a.id().cmp(&b.id()),
        };
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
}

/// Records scoring at least `cut`, best first.
pub fn top_targets<T: ScoredRecord>(records: &[T], cut: f64) -> Vec<&T> {
    let mut targets: Vec<&T> = records.iter().filter(|r| r.score() >= cut).collect();
    targets.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
    targets
}
