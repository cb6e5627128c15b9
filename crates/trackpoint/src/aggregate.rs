//! Read-only aggregate queries over the event store.
//!
//! Every query runs on the blocking pool under a deadline. When the deadline
//! passes the caller gets [`Error::Timeout`], never a partial group list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::AggregationConfig;
use crate::error::{Error, Result};
use crate::event::{TimeRange, Timestamp};
use crate::storage::EventStore;

/// Totals for one event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventStat {
    /// The grouped event name.
    pub event_name: String,
    /// Number of envelopes.
    pub count: i64,
    /// Distinct `client_id` values.
    pub unique_users: i64,
    /// Distinct `session_id` values.
    pub unique_sessions: i64,
}

/// Views for one page path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageStat {
    /// The grouped page path.
    pub page_path: String,
    /// Number of envelopes carrying this path.
    pub page_views: i64,
    /// Distinct `client_id` values.
    pub unique_users: i64,
}

/// Count for one `(device_type, os, browser)` combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStat {
    /// Device class.
    pub device_type: String,
    /// Operating system family, if reported.
    pub os: Option<String>,
    /// Browser family, if reported.
    pub browser: Option<String>,
    /// Number of envelopes.
    pub count: i64,
}

/// The three grouped views answered by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    /// Per-event-name groups.
    pub events: Vec<EventStat>,
    /// Per-page groups.
    pub pages: Vec<PageStat>,
    /// Per-device groups.
    pub devices: Vec<DeviceStat>,
}

/// Activity within the trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RealtimeSnapshot {
    /// Distinct sessions seen in the window.
    pub active_sessions: i64,
    /// Distinct visitors seen in the window.
    pub active_users: i64,
    /// When the window ends.
    pub timestamp: Timestamp,
}

/// Answers grouped and realtime queries.
#[derive(Debug, Clone)]
pub struct AggregationService {
    store: Arc<EventStore>,
    realtime_window: Duration,
    query_timeout: Duration,
}

impl AggregationService {
    /// Create a service using the configured window and timeout.
    #[must_use]
    pub fn new(store: Arc<EventStore>, config: &AggregationConfig) -> Self {
        Self {
            store,
            realtime_window: Duration::from_secs(config.realtime_window_secs),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
        }
    }

    /// Replace the per-query deadline.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// The trailing window used by [`Self::realtime`].
    #[must_use]
    pub fn realtime_window(&self) -> Duration {
        self.realtime_window
    }

    /// The deadline a query started now would get.
    #[must_use]
    pub fn default_deadline(&self) -> Instant {
        Instant::now() + self.query_timeout
    }

    /// Group envelopes by event name, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or times out.
    pub async fn event_stats(&self, range: TimeRange) -> Result<Vec<EventStat>> {
        self.event_stats_with_deadline(range, self.default_deadline())
            .await
    }

    /// [`Self::event_stats`] bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or `deadline` passes.
    pub async fn event_stats_with_deadline(
        &self,
        range: TimeRange,
        deadline: Instant,
    ) -> Result<Vec<EventStat>> {
        self.run_until("event stats", deadline, move |store, deadline| {
            store.event_stats(&range, Some(deadline))
        })
        .await
    }

    /// Group envelopes with a page path, most viewed first.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or times out.
    pub async fn page_stats(&self, range: TimeRange) -> Result<Vec<PageStat>> {
        self.page_stats_with_deadline(range, self.default_deadline())
            .await
    }

    /// [`Self::page_stats`] bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or `deadline` passes.
    pub async fn page_stats_with_deadline(
        &self,
        range: TimeRange,
        deadline: Instant,
    ) -> Result<Vec<PageStat>> {
        self.run_until("page stats", deadline, move |store, deadline| {
            store.page_stats(&range, Some(deadline))
        })
        .await
    }

    /// Group envelopes with a device type by `(device_type, os, browser)`.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or times out.
    pub async fn device_stats(&self, range: TimeRange) -> Result<Vec<DeviceStat>> {
        self.device_stats_with_deadline(range, self.default_deadline())
            .await
    }

    /// [`Self::device_stats`] bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or `deadline` passes.
    pub async fn device_stats_with_deadline(
        &self,
        range: TimeRange,
        deadline: Instant,
    ) -> Result<Vec<DeviceStat>> {
        self.run_until("device stats", deadline, move |store, deadline| {
            store.device_stats(&range, Some(deadline))
        })
        .await
    }

    /// All three grouped views under a single deadline.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any query fails or the deadline passes.
    pub async fn stats(&self, range: TimeRange) -> Result<StatsReport> {
        self.stats_with_deadline(range, self.default_deadline()).await
    }

    /// [`Self::stats`] bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any query fails or `deadline` passes.
    pub async fn stats_with_deadline(&self, range: TimeRange, deadline: Instant) -> Result<StatsReport> {
        self.run_until("stats", deadline, move |store, deadline| {
            Ok(StatsReport {
                events: store.event_stats(&range, Some(deadline))?,
                pages: store.page_stats(&range, Some(deadline))?,
                devices: store.device_stats(&range, Some(deadline))?,
            })
        })
        .await
    }

    /// Activity in the trailing window ending now.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or times out.
    pub async fn realtime(&self) -> Result<RealtimeSnapshot> {
        self.realtime_at(Utc::now()).await
    }

    /// Activity in the trailing window ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or times out.
    pub async fn realtime_at(&self, now: DateTime<Utc>) -> Result<RealtimeSnapshot> {
        self.realtime_at_with_deadline(now, self.default_deadline())
            .await
    }

    /// [`Self::realtime_at`] bounded by a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the query fails or `deadline` passes.
    pub async fn realtime_at_with_deadline(
        &self,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<RealtimeSnapshot> {
        let window = TimeDelta::from_std(self.realtime_window)
            .map_err(|e| Error::internal(format!("realtime window out of range: {e}")))?;
        let range = TimeRange::between(now - window, now);

        let (active_sessions, active_users) = self
            .run_until("realtime snapshot", deadline, move |store, deadline| {
                store.active_counts(&range, Some(deadline))
            })
            .await?;

        Ok(RealtimeSnapshot {
            active_sessions,
            active_users,
            timestamp: Timestamp(now),
        })
    }

    async fn run_until<T, F>(&self, operation: &'static str, deadline: Instant, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&EventStore, Instant) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        debug!(
            operation,
            remaining = ?deadline.saturating_duration_since(Instant::now()),
            "Running aggregate query"
        );

        let task = tokio::task::spawn_blocking(move || f(&store, deadline));
        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::internal(format!("{operation} task failed: {join_err}"))),
            Err(_) => Err(Error::timeout(operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventEnvelope;

    fn create_service() -> (Arc<EventStore>, AggregationService) {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let service = AggregationService::new(Arc::clone(&store), &AggregationConfig::default());
        (store, service)
    }

    fn insert(store: &EventStore, name: &str, client: &str, session: &str, at: DateTime<Utc>) {
        let mut event = EventEnvelope::new(name, Timestamp(at), client);
        event.session_id = Some(session.to_string());
        store.insert(&event).unwrap();
    }

    #[tokio::test]
    async fn test_event_stats_counts_occurrences_and_users() {
        let (store, service) = create_service();
        let now = Utc::now();
        insert(&store, "A", "c1", "s1", now);
        insert(&store, "A", "c1", "s1", now);
        insert(&store, "A", "c2", "s2", now);
        insert(&store, "B", "c3", "s3", now);

        let stats = service.event_stats(TimeRange::unbounded()).await.unwrap();
        let a = stats.iter().find(|s| s.event_name == "A").unwrap();
        assert_eq!(a.count, 3);
        assert_eq!(a.unique_users, 2);
        assert_eq!(a.unique_sessions, 2);
        assert_eq!(stats[0].event_name, "A");
    }

    #[tokio::test]
    async fn test_stats_respects_range() {
        let (store, service) = create_service();
        let now = Utc::now();
        insert(&store, "old", "c1", "s1", now - TimeDelta::days(10));
        insert(&store, "new", "c1", "s1", now);

        let report = service
            .stats(TimeRange::since(now - TimeDelta::days(1)))
            .await
            .unwrap();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_name, "new");
        assert!(report.pages.is_empty());
        assert!(report.devices.is_empty());
    }

    #[tokio::test]
    async fn test_realtime_counts_only_window() {
        let (store, service) = create_service();
        let now = Utc::now();

        // in window
        insert(&store, "x", "c1", "s1", now - TimeDelta::seconds(30));
        insert(&store, "x", "c1", "s2", now - TimeDelta::seconds(60));
        insert(&store, "x", "c2", "s3", now - TimeDelta::seconds(299));
        // outside window
        insert(&store, "x", "c3", "s4", now - TimeDelta::minutes(6));
        insert(&store, "x", "c4", "s5", now - TimeDelta::hours(2));
        insert(&store, "x", "c5", "s6", now + TimeDelta::minutes(1));

        let snapshot = service.realtime_at(now).await.unwrap();
        assert_eq!(snapshot.active_sessions, 3);
        assert_eq!(snapshot.active_users, 2);
        assert_eq!(snapshot.timestamp, Timestamp(now));
    }

    #[tokio::test]
    async fn test_realtime_empty_store() {
        let (_store, service) = create_service();
        let snapshot = service.realtime().await.unwrap();
        assert_eq!(snapshot.active_sessions, 0);
        assert_eq!(snapshot.active_users, 0);
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_storage_class_timeout() {
        let (store, service) = create_service();
        insert(&store, "x", "c1", "s1", Utc::now());

        let err = service
            .with_query_timeout(Duration::ZERO)
            .event_stats(TimeRange::unbounded())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_caller_deadline_overrides_configured_timeout() {
        let (store, service) = create_service();
        insert(&store, "x", "c1", "s1", Utc::now());

        let expired = Instant::now();
        let err = service
            .stats_with_deadline(TimeRange::unbounded(), expired)
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let err = service
            .realtime_at_with_deadline(Utc::now(), expired)
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let generous = Instant::now() + Duration::from_secs(30);
        let pages = service
            .page_stats_with_deadline(TimeRange::unbounded(), generous)
            .await
            .unwrap();
        assert!(pages.is_empty());
        let events = service
            .event_stats_with_deadline(TimeRange::unbounded(), generous)
            .await
            .unwrap();
        assert_eq!(events[0].count, 1);
    }

    #[test]
    fn test_realtime_window_from_config() {
        let (_store, service) = create_service();
        assert_eq!(service.realtime_window(), Duration::from_secs(300));
    }

    #[test]
    fn test_snapshot_serializes_timestamp_as_millis() {
        let snapshot = RealtimeSnapshot {
            active_sessions: 1,
            active_users: 1,
            timestamp: Timestamp::from_millis(1_000).unwrap(),
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["timestamp"], 1_000);
    }
}
