//! Filter store: the single owner of the current filter criteria.
//!
//! Every mutator replaces the whole criteria value and broadcasts the new
//! value to subscribers (URL sync, views). Mutators are total: out-of-range
//! scores are clamped, never rejected.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub const MIN_SCORE: u8 = 0;
pub const MAX_SCORE: u8 = 100;

/// User-chosen constraints applied to every entity view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub sectors: BTreeSet<String>,
    pub regions: BTreeSet<String>,
    pub min_score: u8,
    pub max_score: u8,
    pub search_query: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            sectors: BTreeSet::new(),
            regions: BTreeSet::new(),
            min_score: MIN_SCORE,
            max_score: MAX_SCORE,
            search_query: String::new(),
        }
    }
}

impl FilterCriteria {
    /// Criteria under which every record passes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn has_score_bounds(&self) -> bool {
        self.min_score != MIN_SCORE || self.max_score != MAX_SCORE
    }

    /// Number of active constraints, for the "Filters (n)" badge.
    pub fn active_count(&self) -> usize {
        [
            !self.sectors.is_empty(),
            !self.regions.is_empty(),
            self.has_score_bounds(),
            !self.search_query.is_empty(),
        ]
        .iter()
        .filter(|active| **active)
        .count()
    }

    pub fn with_sectors<I, S>(mut self, sectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sectors = normalize_set(sectors);
        self
    }

    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = normalize_set(regions);
        self
    }

    pub fn with_score_range(mut self, min: i64, max: i64) -> Self {
        let (min, max) = clamp_score_range(min, max);
        self.min_score = min;
        self.max_score = max;
        self
    }

    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }
}

/// Clamp both bounds into [0, 100], then pull `min` down to `max` if needed.
pub fn clamp_score_range(min: i64, max: i64) -> (u8, u8) {
    let max = max.clamp(MIN_SCORE as i64, MAX_SCORE as i64);
    let min = min.clamp(MIN_SCORE as i64, MAX_SCORE as i64).min(max);
    (min as u8, max as u8)
}

fn normalize_set<I, S>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items
        .into_iter()
        .map(Into::into)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Process-wide holder of the current [`FilterCriteria`].
pub struct FilterStore {
    tx: watch::Sender<FilterCriteria>,
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStore {
    pub fn new() -> Self {
        Self::with_criteria(FilterCriteria::empty())
    }

    pub fn with_criteria(criteria: FilterCriteria) -> Self {
        let (tx, _rx) = watch::channel(criteria);
        Self { tx }
    }

    /// Snapshot of the current criteria.
    pub fn criteria(&self) -> FilterCriteria {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every change of the criteria.
    pub fn subscribe(&self) -> watch::Receiver<FilterCriteria> {
        self.tx.subscribe()
    }

    pub fn set_sectors<I, S>(&self, sectors: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next = self.criteria().with_sectors(sectors);
        self.replace(next);
    }

    pub fn set_regions<I, S>(&self, regions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next = self.criteria().with_regions(regions);
        self.replace(next);
    }

    pub fn set_score_range(&self, min: i64, max: i64) {
        let next = self.criteria().with_score_range(min, max);
        self.replace(next);
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        let next = self.criteria().with_search_query(query);
        self.replace(next);
    }

    pub fn reset_filters(&self) {
        self.replace(FilterCriteria::empty());
    }

    /// Replace the whole criteria, re-normalizing the score range.
    pub fn apply(&self, criteria: FilterCriteria) {
        let min = criteria.min_score as i64;
        let max = criteria.max_score as i64;
        self.replace(criteria.with_score_range(min, max));
    }

    /// Returns true when the stored value changed. Subscribers are only
    /// woken on an actual change.
    fn replace(&self, next: FilterCriteria) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            log::debug!("Filters updated: {:?}", self.tx.borrow());
        }
        changed
    }
}
