//! Sliding-window rate limiter.

use std::sync::Arc;

use edue_core::{RateLimitConfig, UserId};

use crate::clock::Clock;
use crate::decision::{Decision, LimitKind, Rejection, UserStats};
use crate::error::RateLimitError;
use crate::registry::LockRegistry;
use crate::store::{RequestRecord, RequestStore};
use crate::window::{HOUR_WINDOW_SECS, MINUTE_WINDOW_SECS, UserWindows};

/// Per-user rate limiter with a durable request log.
///
/// Every operation holds the user's lock for its whole duration, including
/// any storage I/O, so operations for one user are fully serialized while
/// different users proceed independently.
pub struct RateLimiter {
    limits: RateLimitConfig,
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    registry: LockRegistry,
}

impl RateLimiter {
    /// Create a limiter, preparing the store's schema first.
    ///
    /// # Errors
    ///
    /// Returns error if either threshold is zero or the store cannot be prepared.
    pub async fn new(
        limits: RateLimitConfig,
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        if limits.per_minute == 0 || limits.per_hour == 0 {
            return Err(RateLimitError::InvalidLimits(format!(
                "{}/min, {}/hour",
                limits.per_minute, limits.per_hour
            )));
        }

        if limits.is_inverted() {
            tracing::warn!(
                per_minute = limits.per_minute,
                per_hour = limits.per_hour,
                "Per-minute limit exceeds per-hour limit; the hour limit will dominate"
            );
        }

        store.ensure_schema().await?;

        tracing::info!(
            per_minute = limits.per_minute,
            per_hour = limits.per_hour,
            "Rate limiter initialized"
        );

        Ok(Self {
            limits,
            store,
            clock,
            registry: LockRegistry::new(),
        })
    }

    /// Configured thresholds.
    #[must_use]
    pub const fn limits(&self) -> RateLimitConfig {
        self.limits
    }

    /// Number of users with an entry in the lock table.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.registry.len()
    }

    /// Decide whether `user` may make another request.
    ///
    /// Does not count the request; call [`Self::record_request`] once the
    /// work is actually performed.
    ///
    /// # Errors
    ///
    /// Returns error if the user's history cannot be loaded.
    pub async fn check_rate_limit(&self, user: &UserId) -> Result<Decision, RateLimitError> {
        let slot = self.registry.get_or_create(user);
        let mut cache = slot.lock().await;
        let now = self.clock.now();

        let decision = match self.refresh(user, &mut cache, now).await? {
            Some(windows) => self.decide(windows, now),
            None => Decision::Admitted,
        };
        log_decision(user, &decision);
        Ok(decision)
    }

    /// Count a request that is being performed.
    ///
    /// A failed durable write is logged and otherwise ignored, so the request
    /// is only lost across a restart. If the user's history cannot be loaded
    /// first, the record is still written but the windows stay unloaded until
    /// the next read.
    pub async fn record_request(&self, user: &UserId) {
        let slot = self.registry.get_or_create(user);
        let mut cache = slot.lock().await;
        let now = self.clock.now();

        if cache.is_none() {
            match self.load_history(user, now).await {
                Ok(windows) => *cache = Some(windows),
                Err(e) => {
                    // Stay unloaded so the next read rebuilds from the store,
                    // this record included, or fails closed.
                    tracing::warn!(user = %user, error = %e, "Could not load history before recording");
                    self.persist(user, now).await;
                    return;
                }
            }
        }
        let windows = cache.get_or_insert_with(UserWindows::default);
        self.append(user, windows, now).await;
    }

    /// Check and, if admitted, record in one step under the user's lock.
    ///
    /// Unlike calling [`Self::check_rate_limit`] and [`Self::record_request`]
    /// separately, concurrent callers can never jointly exceed a threshold.
    ///
    /// # Errors
    ///
    /// Returns error if the user's history cannot be loaded.
    pub async fn check_and_record(&self, user: &UserId) -> Result<Decision, RateLimitError> {
        let slot = self.registry.get_or_create(user);
        let mut cache = slot.lock().await;
        let now = self.clock.now();

        let decision = match self.refresh(user, &mut cache, now).await? {
            Some(windows) => self.decide(windows, now),
            None => Decision::Admitted,
        };
        log_decision(user, &decision);

        if decision.is_admitted() {
            let windows = cache.get_or_insert_with(UserWindows::default);
            self.append(user, windows, now).await;
        }
        Ok(decision)
    }

    /// Current usage for `user`, without deciding anything.
    ///
    /// # Errors
    ///
    /// Returns error if the user's history cannot be loaded.
    pub async fn get_user_stats(&self, user: &UserId) -> Result<UserStats, RateLimitError> {
        let slot = self.registry.get_or_create(user);
        let mut cache = slot.lock().await;
        let now = self.clock.now();

        let (minute, hour) = self
            .refresh(user, &mut cache, now)
            .await?
            .map_or((0, 0), |w| (w.minute_len(), w.hour_len()));

        Ok(UserStats {
            minute_count: saturating_u32(minute),
            minute_limit: self.limits.per_minute,
            hour_count: saturating_u32(hour),
            hour_limit: self.limits.per_hour,
        })
    }

    /// Forget everything about `user`, in memory and on disk.
    ///
    /// # Errors
    ///
    /// Returns error if the durable records cannot be deleted; the cache is
    /// left untouched in that case.
    pub async fn reset_user(&self, user: &UserId) -> Result<(), RateLimitError> {
        let slot = self.registry.get_or_create(user);
        let mut cache = slot.lock().await;

        let removed = self.store.delete_user(user).await?;
        *cache = Some(UserWindows::default());

        tracing::info!(user = %user, removed, "Rate limits reset");
        Ok(())
    }

    /// Load the cache if needed and evict expired entries.
    ///
    /// Returns `None` when eviction just emptied the hour window: the expired
    /// durable records are purged and the cache dropped, to be reloaded on
    /// the next access.
    async fn refresh<'c>(
        &self,
        user: &UserId,
        cache: &'c mut Option<UserWindows>,
        now: f64,
    ) -> Result<Option<&'c mut UserWindows>, RateLimitError> {
        if cache.is_none() {
            *cache = Some(self.load_history(user, now).await?);
        }

        let drained = {
            let windows = cache.get_or_insert_with(UserWindows::default);
            let evicted = windows.evict(now);
            evicted > 0 && windows.is_idle()
        };

        if drained {
            self.purge_expired(user, now).await;
            *cache = None;
            return Ok(None);
        }
        Ok(cache.as_mut())
    }

    async fn load_history(&self, user: &UserId, now: f64) -> Result<UserWindows, RateLimitError> {
        let history = self.store.load_since(user, now - HOUR_WINDOW_SECS).await?;
        tracing::debug!(user = %user, records = history.len(), "Loaded request history");
        Ok(UserWindows::from_history(&history, now))
    }

    async fn purge_expired(&self, user: &UserId, now: f64) {
        match self.store.delete_through(user, now - HOUR_WINDOW_SECS).await {
            Ok(removed) => {
                tracing::debug!(user = %user, removed, "Purged expired request records");
            }
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "Failed to purge expired request records");
            }
        }
    }

    async fn append(&self, user: &UserId, windows: &mut UserWindows, now: f64) {
        windows.push(now);
        self.persist(user, now).await;
    }

    async fn persist(&self, user: &UserId, now: f64) {
        let record = RequestRecord::new(user.clone(), now);
        if let Err(e) = self.store.insert(&record).await {
            tracing::error!(user = %user, error = %e, "Failed to record request in database");
        }
    }

    fn decide(&self, windows: &UserWindows, now: f64) -> Decision {
        if windows.minute_len() >= self.limits.per_minute as usize {
            let retry_after_secs = windows
                .oldest_minute()
                .map_or(MINUTE_WINDOW_SECS, |oldest| MINUTE_WINDOW_SECS - (now - oldest));
            return Decision::Rejected(Rejection {
                retry_after_secs,
                limit: LimitKind::PerMinute,
            });
        }

        if windows.hour_len() >= self.limits.per_hour as usize {
            let retry_after_secs = windows
                .oldest_hour()
                .map_or(HOUR_WINDOW_SECS, |oldest| HOUR_WINDOW_SECS - (now - oldest));
            return Decision::Rejected(Rejection {
                retry_after_secs,
                limit: LimitKind::PerHour,
            });
        }

        Decision::Admitted
    }
}

fn log_decision(user: &UserId, decision: &Decision) {
    match decision {
        Decision::Admitted => tracing::debug!(user = %user, "Request admitted"),
        Decision::Rejected(r) => tracing::info!(
            user = %user,
            limit = %r.limit,
            retry_after = r.retry_after_secs,
            "Request rejected"
        ),
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const START: f64 = 1_700_000_000.0;

    async fn limiter(
        per_minute: u32,
        per_hour: u32,
    ) -> (RateLimiter, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(START);
        let limiter = RateLimiter::new(
            RateLimitConfig {
                per_minute,
                per_hour,
            },
            store.clone(),
            Arc::new(clock.clone()),
        )
        .await
        .unwrap();
        (limiter, store, clock)
    }

    async fn admit(limiter: &RateLimiter, user: &UserId) {
        assert_eq!(limiter.check_rate_limit(user).await.unwrap(), Decision::Admitted);
        limiter.record_request(user).await;
    }

    #[tokio::test]
    async fn test_zero_limits_rejected() {
        let result = RateLimiter::new(
            RateLimitConfig {
                per_minute: 0,
                per_hour: 30,
            },
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(START)),
        )
        .await;
        assert!(matches!(result, Err(RateLimitError::InvalidLimits(_))));
    }

    #[tokio::test]
    async fn test_minute_limit_and_retry_after() {
        let (limiter, _store, clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        for _ in 0..5 {
            admit(&limiter, &user).await;
            clock.advance_secs(0.1);
        }

        let decision = limiter.check_rate_limit(&user).await.unwrap();
        let rejection = decision.rejection().copied().unwrap();
        assert_eq!(rejection.limit, LimitKind::PerMinute);
        // Oldest request was 0.5s ago.
        assert!((rejection.retry_after_secs - 59.5).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_minute_window_clears() {
        let (limiter, _store, clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        for _ in 0..5 {
            admit(&limiter, &user).await;
            clock.advance_secs(0.1);
        }
        assert!(!limiter.check_rate_limit(&user).await.unwrap().is_admitted());

        clock.advance_secs(61.0);
        assert!(limiter.check_rate_limit(&user).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_hour_limit() {
        let (limiter, _store, clock) = limiter(5, 7).await;
        let user = UserId::new("u");

        for _ in 0..7 {
            admit(&limiter, &user).await;
            clock.advance_secs(30.0);
        }

        let rejection = limiter
            .check_rate_limit(&user)
            .await
            .unwrap()
            .rejection()
            .copied()
            .unwrap();
        assert_eq!(rejection.limit, LimitKind::PerHour);
        // Oldest request was 210s ago.
        assert!((rejection.retry_after_secs - 3_390.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_minute_checked_before_hour() {
        let (limiter, _store, clock) = limiter(2, 2).await;
        let user = UserId::new("u");

        admit(&limiter, &user).await;
        clock.advance_secs(1.0);
        admit(&limiter, &user).await;

        let rejection = limiter.check_rate_limit(&user).await.unwrap();
        assert_eq!(rejection.rejection().unwrap().limit, LimitKind::PerMinute);
    }

    #[tokio::test]
    async fn test_check_does_not_count() {
        let (limiter, _store, _clock) = limiter(1, 30).await;
        let user = UserId::new("u");

        for _ in 0..10 {
            assert!(limiter.check_rate_limit(&user).await.unwrap().is_admitted());
        }
    }

    #[tokio::test]
    async fn test_stats_are_read_only() {
        let (limiter, _store, clock) = limiter(3, 30).await;
        let user = UserId::new("u");

        admit(&limiter, &user).await;
        clock.advance_secs(1.0);
        admit(&limiter, &user).await;

        for _ in 0..5 {
            let stats = limiter.get_user_stats(&user).await.unwrap();
            assert_eq!(
                stats,
                UserStats {
                    minute_count: 2,
                    minute_limit: 3,
                    hour_count: 2,
                    hour_limit: 30,
                }
            );
        }
        assert!(limiter.check_rate_limit(&user).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_reset_user() {
        let (limiter, store, clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        for _ in 0..3 {
            admit(&limiter, &user).await;
            clock.advance_secs(1.0);
        }
        assert_eq!(store.count(&user).await, 3);

        limiter.reset_user(&user).await.unwrap();

        let stats = limiter.get_user_stats(&user).await.unwrap();
        assert_eq!((stats.minute_count, stats.hour_count), (0, 0));
        assert_eq!(store.count(&user).await, 0);
    }

    #[tokio::test]
    async fn test_reset_failure_keeps_cache() {
        let (limiter, store, _clock) = limiter(5, 30).await;
        let user = UserId::new("u");
        admit(&limiter, &user).await;

        store.set_fail_writes(true);
        assert!(limiter.reset_user(&user).await.is_err());

        let stats = limiter.get_user_stats(&user).await.unwrap();
        assert_eq!(stats.minute_count, 1);
    }

    #[tokio::test]
    async fn test_read_failure_fails_closed() {
        let (limiter, store, _clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        store.set_fail_reads(true);
        assert!(matches!(
            limiter.check_rate_limit(&user).await,
            Err(RateLimitError::Store(_))
        ));
        assert!(limiter.get_user_stats(&user).await.is_err());
    }

    #[tokio::test]
    async fn test_write_failure_fails_open() {
        let (limiter, store, clock) = limiter(2, 30).await;
        let user = UserId::new("u");

        store.set_fail_writes(true);
        admit(&limiter, &user).await;
        clock.advance_secs(1.0);
        admit(&limiter, &user).await;

        // Counted in memory even though nothing reached the store.
        assert_eq!(store.count(&user).await, 0);
        assert!(!limiter.check_rate_limit(&user).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_record_during_read_outage_keeps_history() {
        let (limiter, store, clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        for i in 0..5 {
            let at = clock.now() - 10.0 + f64::from(i);
            store.insert(&RequestRecord::new(user.clone(), at)).await.unwrap();
        }

        store.set_fail_reads(true);
        limiter.record_request(&user).await;
        assert_eq!(store.count(&user).await, 6);
        assert!(limiter.check_rate_limit(&user).await.is_err());

        store.set_fail_reads(false);
        clock.advance_secs(1.0);

        let stats = limiter.get_user_stats(&user).await.unwrap();
        assert_eq!((stats.minute_count, stats.hour_count), (6, 6));
        assert!(!limiter.check_rate_limit(&user).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn test_inverted_limits_accepted() {
        let (limiter, _store, clock) = limiter(10, 5).await;
        let user = UserId::new("u");

        for _ in 0..5 {
            assert!(limiter.check_and_record(&user).await.unwrap().is_admitted());
            clock.advance_secs(1.0);
        }
        let decision = limiter.check_rate_limit(&user).await.unwrap();
        assert_eq!(decision.rejection().unwrap().limit, LimitKind::PerHour);
    }

    #[tokio::test]
    async fn test_expired_records_purged_when_idle() {
        let (limiter, store, clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        admit(&limiter, &user).await;
        clock.advance_secs(10.0);
        admit(&limiter, &user).await;
        assert_eq!(store.count(&user).await, 2);

        // Only the first has expired: nothing is purged yet.
        clock.advance_secs(3_595.0);
        assert_eq!(limiter.get_user_stats(&user).await.unwrap().hour_count, 1);
        assert_eq!(store.count(&user).await, 2);

        clock.advance_secs(10.0);
        assert_eq!(limiter.get_user_stats(&user).await.unwrap().hour_count, 0);
        assert_eq!(store.count(&user).await, 0);
    }

    #[tokio::test]
    async fn test_dropped_cache_is_reloaded() {
        let (limiter, store, clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        admit(&limiter, &user).await;
        clock.advance_secs(3_600.0);
        assert!(limiter.check_rate_limit(&user).await.unwrap().is_admitted());

        // Another process records on the same store while the cache is dropped.
        store
            .insert(&RequestRecord::new(user.clone(), clock.now() - 1.0))
            .await
            .unwrap();
        assert_eq!(limiter.get_user_stats(&user).await.unwrap().minute_count, 1);
    }

    #[tokio::test]
    async fn test_record_without_check() {
        let (limiter, _store, _clock) = limiter(5, 30).await;
        let user = UserId::new("u");

        limiter.record_request(&user).await;
        assert_eq!(limiter.get_user_stats(&user).await.unwrap().minute_count, 1);
    }

    #[tokio::test]
    async fn test_check_and_record() {
        let (limiter, store, clock) = limiter(2, 30).await;
        let user = UserId::new("u");

        assert!(limiter.check_and_record(&user).await.unwrap().is_admitted());
        clock.advance_secs(0.5);
        assert!(limiter.check_and_record(&user).await.unwrap().is_admitted());
        clock.advance_secs(0.5);
        assert!(!limiter.check_and_record(&user).await.unwrap().is_admitted());

        // Rejections are not recorded.
        assert_eq!(store.count(&user).await, 2);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (limiter, _store, _clock) = limiter(1, 30).await;
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        assert!(limiter.check_and_record(&alice).await.unwrap().is_admitted());
        assert!(limiter.check_and_record(&bob).await.unwrap().is_admitted());
        assert!(!limiter.check_and_record(&alice).await.unwrap().is_admitted());
        assert_eq!(limiter.tracked_users(), 2);
    }
}
