//! Mirrors the filter store into a shareable query string and back.
//!
//! Two one-way flows keep the sync free of feedback loops:
//! - load: runs once per synchronizer, parses the address into the store
//! - persist: on every store change, writes the non-default fields back,
//!   replacing the address rather than adding history

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use url::form_urlencoded;

use crate::error::ApiError;
use crate::filters::{clamp_score_range, FilterCriteria, FilterStore, MAX_SCORE, MIN_SCORE};

pub const PARAM_SECTORS: &str = "sectors";
pub const PARAM_REGIONS: &str = "regions";
pub const PARAM_QUERY: &str = "q";
pub const PARAM_MIN_SCORE: &str = "minScore";
pub const PARAM_MAX_SCORE: &str = "maxScore";

/// Parse a query component into criteria. Absent or malformed fields fall
/// back to their defaults; this never fails.
pub fn parse_query(query: &str) -> FilterCriteria {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut criteria = FilterCriteria::empty();
    let mut min = MIN_SCORE as i64;
    let mut max = MAX_SCORE as i64;

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            PARAM_SECTORS => criteria = criteria.with_sectors(split_list(&value)),
            PARAM_REGIONS => criteria = criteria.with_regions(split_list(&value)),
            PARAM_QUERY => criteria.search_query = value.into_owned(),
            PARAM_MIN_SCORE => min = value.trim().parse().unwrap_or(MIN_SCORE as i64),
            PARAM_MAX_SCORE => max = value.trim().parse().unwrap_or(MAX_SCORE as i64),
            _ => {}
        }
    }

    let (min, max) = clamp_score_range(min, max);
    criteria.min_score = min;
    criteria.max_score = max;
    criteria
}

fn split_list(value: &str) -> Vec<&str> {
    value.split(',').filter(|s| !s.is_empty()).collect()
}

/// Serialize only the non-default fields. Empty criteria give "".
pub fn to_query(criteria: &FilterCriteria) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    if !criteria.sectors.is_empty() {
        out.append_pair(PARAM_SECTORS, &join_set(&criteria.sectors));
    }
    if !criteria.regions.is_empty() {
        out.append_pair(PARAM_REGIONS, &join_set(&criteria.regions));
    }
    if !criteria.search_query.is_empty() {
        out.append_pair(PARAM_QUERY, &criteria.search_query);
    }
    if criteria.min_score != MIN_SCORE {
        out.append_pair(PARAM_MIN_SCORE, &criteria.min_score.to_string());
    }
    if criteria.max_score != MAX_SCORE {
        out.append_pair(PARAM_MAX_SCORE, &criteria.max_score.to_string());
    }
    out.finish()
}

fn join_set(items: &std::collections::BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Build a full link that reproduces `criteria` when opened.
pub fn share_link(base: &str, criteria: &FilterCriteria) -> Result<String, ApiError> {
    let mut url = url::Url::parse(base).map_err(|e| ApiError::InvalidUrl(format!("{base}: {e}")))?;
    let query = to_query(criteria);
    url.set_query(if query.is_empty() { None } else { Some(&query) });
    Ok(url.to_string())
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// The navigable address whose query component mirrors the filters.
pub trait Address: Send + Sync {
    fn current_query(&self) -> String;

    /// Replace the query in place. Never adds a history entry.
    fn replace_query(&self, query: &str) -> Result<(), ApiError>;
}

/// In-process address, used for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAddress {
    query: Mutex<String>,
    replacements: AtomicUsize,
}

impl MemoryAddress {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Mutex::new(query.into()),
            replacements: AtomicUsize::new(0),
        }
    }

    /// How many times the query was replaced.
    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }
}

impl Address for MemoryAddress {
    fn current_query(&self) -> String {
        self.query.lock().clone()
    }

    fn replace_query(&self, query: &str) -> Result<(), ApiError> {
        *self.query.lock() = query.to_string();
        self.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Address persisted to a file (`~/.tcis/filters.query`), so the last filter
/// configuration survives between runs.
#[derive(Debug, Clone)]
pub struct FileAddress {
    path: PathBuf,
}

impl FileAddress {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self, ApiError> {
        Ok(Self::new(crate::util::tcis_home()?.join("filters.query")))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Address for FileAddress {
    fn current_query(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to read {}: {}", self.path.display(), e);
                }
                String::new()
            }
        }
    }

    fn replace_query(&self, query: &str) -> Result<(), ApiError> {
        crate::util::write_atomic(&self.path, query.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

pub struct UrlSynchronizer {
    store: Arc<FilterStore>,
    address: Arc<dyn Address>,
    loaded: AtomicBool,
}

impl UrlSynchronizer {
    pub fn new(store: Arc<FilterStore>, address: Arc<dyn Address>) -> Self {
        Self {
            store,
            address,
            loaded: AtomicBool::new(false),
        }
    }

    /// Apply the address to the store. Only the first call does anything;
    /// returns whether this call performed the load.
    pub fn load(&self) -> bool {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return false;
        }

        let parsed = parse_query(&self.address.current_query());
        if !parsed.sectors.is_empty() {
            self.store.set_sectors(parsed.sectors.iter().cloned());
        }
        if !parsed.regions.is_empty() {
            self.store.set_regions(parsed.regions.iter().cloned());
        }
        if !parsed.search_query.is_empty() {
            self.store.set_search_query(parsed.search_query.clone());
        }
        if parsed.has_score_bounds() {
            self.store
                .set_score_range(parsed.min_score as i64, parsed.max_score as i64);
        }
        log::debug!("Filters loaded from address: {} active", parsed.active_count());
        true
    }

    /// Write `criteria` to the address. Skips the write when the address
    /// already holds the same query; returns whether a write happened.
    pub fn persist(&self, criteria: &FilterCriteria) -> Result<bool, ApiError> {
        let query = to_query(criteria);
        if self.address.current_query() == query {
            return Ok(false);
        }
        self.address.replace_query(&query)?;
        Ok(true)
    }

    fn persist_logged(&self, criteria: &FilterCriteria) {
        if let Err(e) = self.persist(criteria) {
            log::warn!("Failed to persist filters: {}", e);
        }
    }

    /// Load once, then persist on every store change until the handle is
    /// stopped or dropped.
    pub fn spawn(self) -> SyncHandle {
        let task = tokio::spawn(async move {
            self.load();
            let mut rx = self.store.subscribe();
            let initial = rx.borrow_and_update().clone();
            self.persist_logged(&initial);

            while rx.changed().await.is_ok() {
                let criteria = rx.borrow_and_update().clone();
                self.persist_logged(&criteria);
            }
        });
        SyncHandle { task }
    }
}

/// Owns the background persist task.
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
