//! Retry and abandonment policies for failed queue items.
//!
//! The coordinator consults a [`RetryPolicy`] for each item before applying
//! it. The queue tracks `retry_count`, `last_error` and `last_attempt_at`
//! faithfully; the policy decides what those numbers mean.

use chrono::{DateTime, Duration, Utc};

use super::item::SyncQueueItem;

/// What to do with an item on this drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send it now.
    Attempt,
    /// Leave it queued; it becomes eligible again at the given time.
    Wait(DateTime<Utc>),
    /// Give up and move it to the dead-letter view.
    Abandon,
}

/// Strategy deciding whether a queued item is attempted.
pub trait RetryPolicy: Send + Sync {
    /// Decide for `item` at time `now`.
    fn decide(&self, item: &SyncQueueItem, now: DateTime<Utc>) -> RetryDecision;
}

/// Attempt every open item on every drain, never abandon.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn decide(&self, _item: &SyncQueueItem, _now: DateTime<Utc>) -> RetryDecision {
        RetryDecision::Attempt
    }
}

/// Exponential backoff measured from the last failed attempt.
///
/// After the `n`-th failure an item waits `base * 2^(n-1)`, capped at
/// `max_delay`. With `max_attempts` set, an item that has failed that many
/// times is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::seconds(5),
            max_delay: Duration::minutes(5),
            max_attempts: None,
        }
    }
}

impl ExponentialBackoff {
    /// Delay for backoff step `step`, counting from zero.
    #[must_use]
    pub fn delay(&self, step: u32) -> Duration {
        // 2^31 seconds already exceeds any sane cap
        let factor = 1_i32.checked_shl(step.min(30)).unwrap_or(i32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn decide(&self, item: &SyncQueueItem, now: DateTime<Utc>) -> RetryDecision {
        if item.retry_count == 0 {
            return RetryDecision::Attempt;
        }
        if self.max_attempts.is_some_and(|max| item.retry_count >= max) {
            return RetryDecision::Abandon;
        }

        let Some(last_attempt) = item.last_attempt_at else {
            return RetryDecision::Attempt;
        };
        let delay = self.delay(item.retry_count.saturating_sub(1));
        // Past the end of representable time: never ready
        let Some(ready_at) = last_attempt.checked_add_signed(delay) else {
            return RetryDecision::Wait(DateTime::<Utc>::MAX_UTC);
        };
        if now >= ready_at {
            RetryDecision::Attempt
        } else {
            RetryDecision::Wait(ready_at)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::EntityKind;
    use crate::sync::SyncAction;

    fn failed_item(retry_count: u32, last_attempt_at: DateTime<Utc>) -> SyncQueueItem {
        SyncQueueItem {
            retry_count,
            last_attempt_at: Some(last_attempt_at),
            last_error: Some("503".to_string()),
            ..SyncQueueItem::new("q1", EntityKind::Fuel, "f1", SyncAction::Create, b"{}".to_vec())
        }
    }

    #[test]
    fn test_retry_delay() {
        let policy = ExponentialBackoff::default();

        assert_eq!(policy.delay(0), Duration::seconds(5));
        assert_eq!(policy.delay(1), Duration::seconds(10));
        assert_eq!(policy.delay(2), Duration::seconds(20));
        // Capped at five minutes
        assert_eq!(policy.delay(10), Duration::seconds(300));
        assert_eq!(policy.delay(u32::MAX), Duration::seconds(300));
    }

    #[test]
    fn test_always_retry() {
        let item = failed_item(50, Utc::now());
        assert_eq!(AlwaysRetry.decide(&item, Utc::now()), RetryDecision::Attempt);
    }

    #[test]
    fn test_fresh_item_attempted() {
        let item = SyncQueueItem::new("q1", EntityKind::Trip, "t1", SyncAction::Create, Vec::new());
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.decide(&item, Utc::now()), RetryDecision::Attempt);
    }

    #[test]
    fn test_backoff_waits_then_attempts() {
        let policy = ExponentialBackoff::default();
        let failed_at = Utc::now();
        let item = failed_item(2, failed_at);

        // Second failure: wait base * 2
        let ready = failed_at + Duration::seconds(10);
        assert_eq!(
            policy.decide(&item, failed_at + Duration::seconds(3)),
            RetryDecision::Wait(ready)
        );
        assert_eq!(policy.decide(&item, ready), RetryDecision::Attempt);
    }

    #[test]
    fn test_huge_delay_waits_without_overflow() {
        let policy = ExponentialBackoff {
            base: Duration::seconds(i64::MAX / 1000),
            max_delay: Duration::seconds(i64::MAX / 1000),
            max_attempts: None,
        };
        let failed_at = Utc::now();

        assert_eq!(
            policy.decide(&failed_item(1, failed_at), failed_at),
            RetryDecision::Wait(DateTime::<Utc>::MAX_UTC)
        );
    }

    #[test]
    fn test_abandon_after_max_attempts() {
        let policy = ExponentialBackoff {
            max_attempts: Some(3),
            ..ExponentialBackoff::default()
        };
        let long_ago = Utc::now() - Duration::hours(1);

        assert_eq!(policy.decide(&failed_item(2, long_ago), Utc::now()), RetryDecision::Attempt);
        assert_eq!(policy.decide(&failed_item(3, long_ago), Utc::now()), RetryDecision::Abandon);
    }
}
