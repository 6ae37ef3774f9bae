//! Each user has two ascending timestamp queues. The minute queue is always a
//! suffix of the hour queue, so eviction is a prefix trim on both.

use std::collections::VecDeque;

/// Length of the short window in seconds.
pub const MINUTE_WINDOW_SECS: f64 = 60.0;

/// Length of the long window in seconds.
pub const HOUR_WINDOW_SECS: f64 = 3600.0;

/// Cached request timestamps for one user.
///
/// A timestamp `t` counts toward a window of length `w` at time `now` iff
/// `now - w < t`, i.e. the window is the half-open interval `(now - w, now]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserWindows {
    minute: VecDeque<f64>,
    hour: VecDeque<f64>,
}

impl UserWindows {
    /// Build windows from persisted history.
    ///
    /// `history` must be ascending; entries outside the hour window are skipped.
    #[must_use]
    pub fn from_history(history: &[f64], now: f64) -> Self {
        let hour_cutoff = now - HOUR_WINDOW_SECS;
        let minute_cutoff = now - MINUTE_WINDOW_SECS;

        let hour: VecDeque<f64> = history.iter().copied().filter(|t| *t > hour_cutoff).collect();
        let minute = hour.iter().copied().filter(|t| *t > minute_cutoff).collect();

        Self { minute, hour }
    }

    /// Drop entries that have aged out of their windows.
    ///
    /// Returns how many entries left the hour window.
    pub fn evict(&mut self, now: f64) -> usize {
        let minute_cutoff = now - MINUTE_WINDOW_SECS;
        while self.minute.front().is_some_and(|t| *t <= minute_cutoff) {
            self.minute.pop_front();
        }

        let hour_cutoff = now - HOUR_WINDOW_SECS;
        let mut evicted = 0;
        while self.hour.front().is_some_and(|t| *t <= hour_cutoff) {
            self.hour.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Append a new request time.
    pub fn push(&mut self, time: f64) {
        self.minute.push_back(time);
        self.hour.push_back(time);
    }

    /// Requests in the trailing minute.
    #[must_use]
    pub fn minute_len(&self) -> usize {
        self.minute.len()
    }

    /// Requests in the trailing hour.
    #[must_use]
    pub fn hour_len(&self) -> usize {
        self.hour.len()
    }

    /// Oldest request still in the minute window.
    #[must_use]
    pub fn oldest_minute(&self) -> Option<f64> {
        self.minute.front().copied()
    }

    /// Oldest request still in the hour window.
    #[must_use]
    pub fn oldest_hour(&self) -> Option<f64> {
        self.hour.front().copied()
    }

    /// No requests in the last hour.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.hour.is_empty()
    }
}
