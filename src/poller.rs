//! Live new-lead poller.
//!
//! A repeating timer fetches the ranked lead list. Each tick runs its fetch in
//! its own task, so a slow response never holds back the next poll; whatever
//! order fetches complete in, `LeadWatch` only moves forward because it tracks
//! the highest lead id seen so far.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::ApiError;
use crate::notification::{Notification, NotificationSink};
use crate::types::{Config, Lead};

/// Where the poller gets its lead list from.
#[async_trait::async_trait]
pub trait LeadSource: Send + Sync {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, ApiError>;
}

// ---------------------------------------------------------------------------
// Watch state
// ---------------------------------------------------------------------------

/// Tracks the highest lead id seen and the notification currently showing.
///
/// Ids are compared as a plain numeric maximum, so a backend that reuses or
/// reorders ids will not be detected.
#[derive(Debug)]
pub struct LeadWatch {
    last_seen_max: Option<i64>,
    current: Option<Showing>,
    display_for: Duration,
}

#[derive(Debug)]
struct Showing {
    notification: Notification,
    expires_at: Instant,
}

impl LeadWatch {
    pub fn new(display_for: Duration) -> Self {
        Self {
            last_seen_max: None,
            current: None,
            display_for,
        }
    }

    pub fn last_seen_max(&self) -> Option<i64> {
        self.last_seen_max
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref().map(|s| &s.notification)
    }

    /// When the showing notification is due to be cleared.
    pub fn expires_at(&self) -> Option<Instant> {
        self.current.as_ref().map(|s| s.expires_at)
    }

    /// Feed one fetch result. Returns the notification raised, if any.
    ///
    /// The first non-empty result only records the maximum. Empty results and
    /// results whose maximum is not above the recorded one change nothing.
    pub fn observe(&mut self, leads: &[Lead], now: DateTime<Utc>) -> Option<Notification> {
        let newest = leads.iter().max_by_key(|lead| lead.id)?;

        let Some(last) = self.last_seen_max else {
            self.last_seen_max = Some(newest.id);
            return None;
        };
        if newest.id <= last {
            return None;
        }

        self.last_seen_max = Some(newest.id);
        let notification = Notification::new(newest.clone(), now);
        self.current = Some(Showing {
            notification: notification.clone(),
            expires_at: Instant::now() + self.display_for,
        });
        Some(notification)
    }

    pub fn dismiss(&mut self) -> Option<Notification> {
        self.current.take().map(|s| s.notification)
    }

    /// Clear the showing notification once its display time has passed.
    pub fn expire(&mut self, now: Instant) -> Option<Notification> {
        if self.current.as_ref().is_some_and(|s| now >= s.expires_at) {
            self.dismiss()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Poller task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub display_for: Duration,
}

impl PollerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            display_for: Duration::from_secs(config.notification_display_secs),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct LeadPoller;

impl LeadPoller {
    pub fn spawn(
        source: Arc<dyn LeadSource>,
        sink: Arc<dyn NotificationSink>,
        config: PollerConfig,
    ) -> PollerHandle {
        let watch = Arc::new(Mutex::new(LeadWatch::new(config.display_for)));
        let signals = Arc::new(Signals::default());

        let task = tokio::spawn(run_poller(
            source,
            sink,
            Arc::clone(&watch),
            Arc::clone(&signals),
            config,
        ));

        PollerHandle {
            watch,
            signals,
            task,
        }
    }
}

#[derive(Default)]
struct Signals {
    dismiss: Notify,
    shutdown: Notify,
}

async fn run_poller(
    source: Arc<dyn LeadSource>,
    sink: Arc<dyn NotificationSink>,
    watch: Arc<Mutex<LeadWatch>>,
    signals: Arc<Signals>,
    config: PollerConfig,
) {
    log::info!(
        "Lead poller: polling every {}s",
        config.poll_interval.as_secs()
    );

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Dropping the set aborts whatever is still in flight.
    let mut in_flight: JoinSet<Option<Notification>> = JoinSet::new();

    loop {
        // Fetch tasks may finish out of order, so the deadline always comes
        // from whatever notification the watch holds now.
        let expires_at = watch.lock().expires_at();

        tokio::select! {
            _ = ticker.tick() => {
                in_flight.spawn(poll_once(Arc::clone(&source), Arc::clone(&watch)));
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                let raised = match joined {
                    Ok(raised) => raised,
                    Err(e) => {
                        log::warn!("Lead poller: fetch task ended abnormally: {}", e);
                        None
                    }
                };
                if let Some(notification) = raised {
                    log::info!(
                        "Lead poller: new lead {} ({})",
                        notification.lead.id,
                        notification.lead.company
                    );
                    if let Err(e) = sink.notify(&notification).await {
                        log::warn!("Lead poller: notification delivery failed: {}", e);
                    }
                }
            }
            _ = sleep_until_opt(expires_at), if expires_at.is_some() => {
                let expired = watch.lock().expire(Instant::now());
                if let Some(notification) = expired {
                    clear(sink.as_ref(), &notification).await;
                }
            }
            _ = signals.dismiss.notified() => {
                let dismissed = watch.lock().dismiss();
                if let Some(notification) = dismissed {
                    log::debug!("Lead poller: dismissed lead {}", notification.lead.id);
                    clear(sink.as_ref(), &notification).await;
                }
            }
            _ = signals.shutdown.notified() => {
                log::info!("Lead poller: stopping");
                in_flight.abort_all();
                break;
            }
        }
    }
}

async fn clear(sink: &dyn NotificationSink, notification: &Notification) {
    if let Err(e) = sink.clear(notification).await {
        log::warn!("Lead poller: failed to clear notification: {}", e);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn poll_once(
    source: Arc<dyn LeadSource>,
    watch: Arc<Mutex<LeadWatch>>,
) -> Option<Notification> {
    match source.fetch_leads().await {
        Ok(leads) => watch.lock().observe(&leads, Utc::now()),
        Err(e) => {
            log::warn!("Lead poller: fetch failed: {}", e);
            None
        }
    }
}

/// Owns the poller task. Stopping or dropping it cancels the timer and every
/// fetch still in flight.
pub struct PollerHandle {
    watch: Arc<Mutex<LeadWatch>>,
    signals: Arc<Signals>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn last_seen_max(&self) -> Option<i64> {
        self.watch.lock().last_seen_max()
    }

    pub fn current(&self) -> Option<Notification> {
        self.watch.lock().current().cloned()
    }

    /// Ask the loop to take down the showing notification. The sink's
    /// `clear` runs on the poller task.
    pub fn dismiss(&self) {
        self.signals.dismiss.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop and wait for it to wind down.
    pub async fn stop(mut self) {
        self.signals.shutdown.notify_one();
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                log::warn!("Lead poller: task failed on shutdown: {}", e);
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn leads(ids: &[i64]) -> Vec<Lead> {
        ids.iter()
            .map(|id| {
                serde_json::from_value(serde_json::json!({
                    "id": id,
                    "name": format!("Contact {id}"),
                    "company": format!("Company {id}"),
                    "sector": "services",
                    "lead_score": 60.0
                }))
                .unwrap()
            })
            .collect()
    }

    /// Serves scripted responses in order, repeating the last one.
    struct ScriptedSource {
        script: Vec<(Duration, Result<Vec<i64>, ApiError>)>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<Vec<i64>, ApiError>)>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl LeadSource for ScriptedSource {
        async fn fetch_leads(&self) -> Result<Vec<Lead>, ApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, result) = &self.script[call.min(self.script.len() - 1)];
            tokio::time::sleep(*delay).await;
            match result {
                Ok(ids) => Ok(leads(ids)),
                Err(_) => Err(ApiError::Network("connection refused".into())),
            }
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        raised: Mutex<Vec<Notification>>,
        cleared: Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl NotificationSink for CollectingSink {
        async fn notify(&self, notification: &Notification) -> Result<(), ApiError> {
            self.raised.lock().push(notification.clone());
            Ok(())
        }

        async fn clear(&self, notification: &Notification) -> Result<(), ApiError> {
            self.cleared.lock().push(notification.clone());
            Ok(())
        }
    }

    fn config() -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_secs(5),
            display_for: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_watch_detects_only_new_maximum() {
        let mut watch = LeadWatch::new(Duration::from_secs(5));
        let now = Utc::now();

        assert!(watch.observe(&leads(&[1, 2]), now).is_none());
        assert_eq!(watch.last_seen_max(), Some(2));

        let raised = watch.observe(&leads(&[1, 2, 3]), now).unwrap();
        assert_eq!(raised.lead.id, 3);
        assert_eq!(watch.current().map(|n| n.lead.id), Some(3));

        assert!(watch.observe(&leads(&[1, 2, 3]), now).is_none());
        assert_eq!(watch.last_seen_max(), Some(3));
    }

    #[test]
    fn test_watch_ignores_empty_and_stale_results() {
        let mut watch = LeadWatch::new(Duration::from_secs(5));
        let now = Utc::now();

        assert!(watch.observe(&[], now).is_none());
        assert_eq!(watch.last_seen_max(), None);

        // first non-empty result initializes, even after an empty one
        assert!(watch.observe(&leads(&[4, 9]), now).is_none());
        assert!(watch.observe(&leads(&[1, 2]), now).is_none());
        assert!(watch.observe(&[], now).is_none());
        assert_eq!(watch.last_seen_max(), Some(9));
    }

    #[test]
    fn test_newer_notification_replaces_current() {
        let mut watch = LeadWatch::new(Duration::from_secs(5));
        let now = Utc::now();
        watch.observe(&leads(&[1]), now);
        watch.observe(&leads(&[1, 2]), now);
        watch.observe(&leads(&[1, 2, 7]), now);
        assert_eq!(watch.current().map(|n| n.lead.id), Some(7));
    }

    #[test]
    fn test_dismiss_and_expire() {
        let mut watch = LeadWatch::new(Duration::from_secs(5));
        let now = Utc::now();
        watch.observe(&leads(&[1]), now);
        watch.observe(&leads(&[2]), now);
        let due = watch.expires_at().unwrap();

        assert!(watch.expire(due - Duration::from_secs(1)).is_none());
        assert!(watch.current().is_some());
        assert!(watch.expire(due).is_some());
        assert!(watch.current().is_none());
        assert!(watch.expires_at().is_none());

        watch.observe(&leads(&[3]), now);
        assert_eq!(watch.dismiss().map(|n| n.lead.id), Some(3));
        assert!(watch.dismiss().is_none());
    }

    #[test]
    fn test_deadline_follows_newest_notification() {
        let mut watch = LeadWatch::new(Duration::from_secs(5));
        let now = Utc::now();
        watch.observe(&leads(&[1]), now);
        watch.observe(&leads(&[2]), now);
        let first_due = watch.expires_at().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        watch.observe(&leads(&[3]), now);
        let due = watch.expires_at().unwrap();
        assert!(due > first_due);

        // the replaced notification's deadline no longer clears anything
        assert!(watch.expire(first_due).is_none());
        assert_eq!(watch.expire(due).map(|n| n.lead.id), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_raises_once_for_new_lead() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![1, 2])),
            (Duration::ZERO, Ok(vec![1, 2, 3])),
            (Duration::ZERO, Ok(vec![1, 2, 3])),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink.clone(), config());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.last_seen_max(), Some(2));
        assert!(sink.raised.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.last_seen_max(), Some(3));
        assert_eq!(sink.raised.lock().len(), 1);
        assert_eq!(handle.current().map(|n| n.lead.id), Some(3));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.raised.lock().len(), 1);
        // display time has run out
        assert!(handle.current().is_none());
        assert_eq!(sink.cleared.lock().len(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_clears_through_sink() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![1])),
            (Duration::ZERO, Ok(vec![1, 2])),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink.clone(), config());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handle.current().map(|n| n.lead.id), Some(2));

        handle.dismiss();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.current().is_none());
        let cleared: Vec<i64> = sink.cleared.lock().iter().map(|n| n.lead.id).collect();
        assert_eq!(cleared, vec![2]);

        // the expiry deadline went with the dismissed notification
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(sink.cleared.lock().len(), 1);
        assert_eq!(sink.raised.lock().len(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_landing_together_expire_newest() {
        // the 5s fetch is slow and lands at 10s alongside the 10s fetch
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(vec![1])),
            (Duration::from_secs(5), Ok(vec![1, 2])),
            (Duration::ZERO, Ok(vec![1, 2, 3])),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink.clone(), config());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(handle.last_seen_max(), Some(3));
        assert_eq!(handle.current().map(|n| n.lead.id), Some(3));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(handle.current().is_none());
        let last_cleared = sink.cleared.lock().last().map(|n| n.lead.id);
        assert_eq!(last_cleared, Some(3));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_does_not_delay_next_poll() {
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(12), Ok(vec![1, 2, 5])),
            (Duration::ZERO, Ok(vec![1, 2, 3])),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink.clone(), config());

        // ticks at 0s (slow) and 5s, 10s (fast)
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.last_seen_max(), Some(3));
        assert!(sink.raised.lock().is_empty());

        // the slow fetch lands at 12s with a higher id
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.last_seen_max(), Some(5));
        let raised = sink.raised.lock().clone();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].lead.id, 5);

        // later fast results are stale and change nothing
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.last_seen_max(), Some(5));
        assert_eq!(sink.raised.lock().len(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_errors_are_ignored() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Err(ApiError::Network("down".into()))),
            (Duration::ZERO, Ok(vec![4])),
            (Duration::ZERO, Ok(vec![4, 6])),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink.clone(), config());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.last_seen_max(), None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.last_seen_max(), Some(6));
        assert_eq!(sink.raised.lock().len(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer_and_in_flight_fetches() {
        let source = ScriptedSource::new(vec![(Duration::from_secs(30), Ok(vec![1]))]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink.clone(), config());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(sink.raised.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_poller() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(vec![1]))]);
        let sink = Arc::new(CollectingSink::default());
        let handle = LeadPoller::spawn(source.clone(), sink, config());

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);
        let calls = source.calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }
}
