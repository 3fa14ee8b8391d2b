//! In-memory query cache with prefix invalidation.
//!
//! Entries are keyed by a segment list (`["leads", "ranked"]`,
//! `["lead", "7"]`). Invalidating `["leads"]` drops every key that starts with
//! that segment, which is how mutations force the affected views to refetch.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::{ApiError, ErrorReport};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// What a view sees for one query.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    Loading,
    Ready {
        data: Arc<T>,
        fetched_at: DateTime<Utc>,
    },
    Failed(ErrorReport),
}

enum Entry {
    Loading,
    Ready {
        data: Arc<dyn Any + Send + Sync>,
        fetched_at: DateTime<Utc>,
        stored: Instant,
    },
    Failed(ErrorReport),
}

pub struct QueryCache {
    entries: DashMap<QueryKey, Entry>,
    stale_after: Duration,
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            stale_after,
        }
    }

    /// Current state for `key`, if the cache has ever seen it. A cached
    /// value of a different type reads as absent.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<QueryState<T>> {
        let entry = self.entries.get(key)?;
        match &*entry {
            Entry::Loading => Some(QueryState::Loading),
            Entry::Failed(report) => Some(QueryState::Failed(report.clone())),
            Entry::Ready {
                data, fetched_at, ..
            } => data
                .clone()
                .downcast::<T>()
                .ok()
                .map(|data| QueryState::Ready {
                    data,
                    fetched_at: *fetched_at,
                }),
        }
    }

    fn fresh<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let entry = self.entries.get(key)?;
        match &*entry {
            Entry::Ready { data, stored, .. } if stored.elapsed() < self.stale_after => {
                data.clone().downcast::<T>().ok()
            }
            _ => None,
        }
    }

    /// Serve a fresh cached value, or run `fetcher` and record its outcome.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Some(data) = self.fresh::<T>(&key) {
            log::debug!("Query {} served from cache", key);
            return Ok(data);
        }
        self.refetch(key, fetcher).await
    }

    /// Always run `fetcher`, replacing whatever is cached.
    pub async fn refetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.entries.insert(key.clone(), Entry::Loading);

        match fetcher().await {
            Ok(value) => {
                let data = Arc::new(value);
                self.entries.insert(
                    key,
                    Entry::Ready {
                        data: data.clone(),
                        fetched_at: Utc::now(),
                        stored: Instant::now(),
                    },
                );
                Ok(data)
            }
            Err(e) => {
                log::warn!("Query {} failed: {}", key, e);
                self.entries.insert(key, Entry::Failed(ErrorReport::from(&e)));
                Err(e)
            }
        }
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many
    /// entries were removed.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();
        if removed > 0 {
            log::debug!("Invalidated {} queries under {}", removed, prefix);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(parts: &[&str]) -> QueryKey {
        QueryKey::new(parts.iter().copied())
    }

    #[test]
    fn test_prefix_matching() {
        let k = key(&["lead", "7", "history"]);
        assert!(k.starts_with(&key(&["lead"])));
        assert!(k.starts_with(&key(&["lead", "7"])));
        assert!(!k.starts_with(&key(&["lead", "8"])));
        assert!(!key(&["lead"]).starts_with(&k));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_values_are_reused_until_stale() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ApiError>(vec![1, 2, 3])
        };

        cache.fetch(key(&["leads", "ranked"]), fetch).await.unwrap();
        cache.fetch(key(&["leads", "ranked"]), fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let data = cache.fetch(key(&["leads", "ranked"]), fetch).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(*data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_returned() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let err = cache
            .fetch::<Vec<i32>, _, _>(key(&["clients", "ranked"]), || async {
                Err(ApiError::Network("refused".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));

        match cache.peek::<Vec<i32>>(&key(&["clients", "ranked"])) {
            Some(QueryState::Failed(report)) => assert!(report.can_retry),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalidate_by_prefix() {
        let cache = QueryCache::new(Duration::from_secs(30));
        for parts in [&["leads", "ranked"][..], &["lead", "7"][..], &["clients", "ranked"][..]] {
            cache
                .fetch(key(parts), || async { Ok::<_, ApiError>(0_u8) })
                .await
                .unwrap();
        }

        assert_eq!(cache.invalidate(&key(&["leads"])), 1);
        assert!(cache.peek::<u8>(&key(&["leads", "ranked"])).is_none());
        assert!(cache.peek::<u8>(&key(&["lead", "7"])).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_type_mismatch_reads_as_absent() {
        let cache = QueryCache::new(Duration::from_secs(30));
        cache
            .fetch(key(&["funnel"]), || async { Ok::<_, ApiError>(5_i64) })
            .await
            .unwrap();
        assert!(cache.peek::<String>(&key(&["funnel"])).is_none());
    }
}
