//! Relative expiry phrases and live countdowns.
//!
//! [`relative_phrase`] turns a Unix-seconds timestamp into "in 5 minutes" or
//! "5 minutes ago" relative to a given instant. Granularity coarsens at fixed
//! breakpoints:
//!
//! | distance       | unit    |
//! |----------------|---------|
//! | < 60 seconds   | seconds |
//! | < 60 minutes   | minutes |
//! | < 24 hours     | hours   |
//! | otherwise      | days    |
//!
//! [`Countdown`] republishes the phrase on a fixed tick. Each instance owns
//! at most one pending timer task; starting again cancels the previous one,
//! and stopping or dropping the instance cancels it for good.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default re-render interval.
pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

const MINUTE: u128 = 60;
const HOUR: u128 = 60 * MINUTE;
const DAY: u128 = 24 * HOUR;

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync + 'static {
    fn now_unix(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

/// Describes `exp` relative to `now`.
///
/// # Examples
///
/// ```
/// use smart_inspector::countdown::relative_phrase;
///
/// assert_eq!(relative_phrase(1_045, 1_000), "in 45 seconds");
/// assert_eq!(relative_phrase(1_000, 1_300), "5 minutes ago");
/// assert_eq!(relative_phrase(1_000 + 5 * 3600, 1_000), "in 5 hours");
/// ```
#[must_use]
pub fn relative_phrase(exp: i64, now: i64) -> String {
    // Widened so extreme timestamps cannot overflow.
    let delta = i128::from(exp) - i128::from(now);
    if delta == 0 {
        return "now".to_string();
    }

    let distance = delta.unsigned_abs();
    let (count, unit) = if distance < MINUTE {
        (distance, "second")
    } else if distance < HOUR {
        (distance / MINUTE, "minute")
    } else if distance < DAY {
        (distance / HOUR, "hour")
    } else {
        (distance / DAY, "day")
    };
    let plural = if count == 1 { "" } else { "s" };

    if delta > 0 {
        format!("in {count} {unit}{plural}")
    } else {
        format!("{count} {unit}{plural} ago")
    }
}

/// Live "expires in / ago" phrase for one timestamp.
pub struct Countdown {
    exp: i64,
    tick: Duration,
    clock: Arc<dyn Clock>,
    tx: Arc<watch::Sender<String>>,
    epoch: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    /// Creates a countdown to `exp` using the wall clock and [`DEFAULT_TICK`].
    #[must_use]
    pub fn new(exp: i64) -> Self {
        Self::with_clock(exp, DEFAULT_TICK, Arc::new(SystemClock))
    }

    /// Creates a countdown with an explicit tick and clock.
    #[must_use]
    pub fn with_clock(exp: i64, tick: Duration, clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = watch::channel(relative_phrase(exp, clock.now_unix()));
        Self {
            exp,
            tick,
            clock,
            tx: Arc::new(tx),
            epoch: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Target timestamp in Unix seconds.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.exp
    }

    /// Phrase computed against the clock right now.
    #[must_use]
    pub fn phrase(&self) -> String {
        relative_phrase(self.exp, self.clock.now_unix())
    }

    /// Receiver for the published phrases.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }

    /// Returns true while a timer task is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Starts ticking, replacing any timer this instance already had.
    ///
    /// Publishes immediately, then once per tick. Must be called from within
    /// a tokio runtime.
    pub fn start(&mut self) {
        self.stop();

        let epoch = self.epoch.load(Ordering::SeqCst);
        let exp = self.exp;
        let tick = self.tick;
        let clock = Arc::clone(&self.clock);
        let tx = Arc::clone(&self.tx);
        let current = Arc::clone(&self.epoch);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let phrase = relative_phrase(exp, clock.now_unix());
                // Checked under the channel lock so nothing lands after stop().
                tx.send_if_modified(|value| {
                    if current.load(Ordering::SeqCst) != epoch {
                        return false;
                    }
                    *value = phrase;
                    true
                });
            }
        }));
    }

    /// Cancels the pending timer, if any. No update is published afterwards.
    pub fn stop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // Wait out an in-flight publish from the old task.
        self.tx.send_if_modified(|_| false);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Countdown")
            .field("exp", &self.exp)
            .field("tick", &self.tick)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[derive(Debug, Default)]
    struct TestClock {
        now: AtomicI64,
        reads: AtomicU64,
    }

    impl TestClock {
        fn at(now: i64) -> Arc<Self> {
            Arc::new(Self {
                now: AtomicI64::new(now),
                reads: AtomicU64::new(0),
            })
        }

        fn advance(&self, secs: i64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }

        fn reads(&self) -> u64 {
            self.reads.load(Ordering::SeqCst)
        }

        fn reset_reads(&self) {
            self.reads.store(0, Ordering::SeqCst);
        }
    }

    impl Clock for TestClock {
        fn now_unix(&self) -> i64 {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.now.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_seconds_granularity() {
        assert_eq!(relative_phrase(1_045, 1_000), "in 45 seconds");
        assert_eq!(relative_phrase(1_001, 1_000), "in 1 second");
        assert_eq!(relative_phrase(1_000, 1_059), "59 seconds ago");
        assert_eq!(relative_phrase(1_000, 1_000), "now");
    }

    #[test]
    fn test_breakpoints() {
        assert_eq!(relative_phrase(60, 0), "in 1 minute");
        assert_eq!(relative_phrase(3_599, 0), "in 59 minutes");
        assert_eq!(relative_phrase(3_600, 0), "in 1 hour");
        assert_eq!(relative_phrase(0, 3_600 * 5), "5 hours ago");
        assert_eq!(relative_phrase(86_400 * 3, 0), "in 3 days");
        assert_eq!(relative_phrase(0, 86_400), "1 day ago");
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        assert_eq!(
            relative_phrase(i64::MAX / 2, 0),
            format!("in {} days", (i64::MAX / 2) as u128 / DAY)
        );
    }

    #[test]
    fn test_extreme_timestamps() {
        assert_eq!(
            relative_phrase(i64::MIN, 1_700_000_000),
            format!("{} days ago", (1_700_000_000_i128 - i64::MIN as i128) as u128 / DAY)
        );
        assert_eq!(
            relative_phrase(i64::MAX, i64::MIN),
            format!("in {} days", (i64::MAX as i128 - i64::MIN as i128) as u128 / DAY)
        );
        assert_eq!(relative_phrase(i64::MIN, i64::MIN), "now");
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks() {
        let clock = TestClock::at(1_000);
        let mut countdown =
            Countdown::with_clock(1_045, Duration::from_secs(10), clock.clone());
        let mut rx = countdown.subscribe();
        assert_eq!(rx.borrow().as_str(), "in 45 seconds");

        countdown.start();
        assert!(countdown.is_running());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_str(), "in 45 seconds");

        clock.advance(30);
        tokio::time::advance(Duration::from_secs(10)).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_str(), "in 15 seconds");

        clock.advance(30);
        tokio::time::advance(Duration::from_secs(10)).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_str(), "15 seconds ago");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_a_single_timer() {
        let clock = TestClock::at(0);
        let mut countdown = Countdown::with_clock(7_200, Duration::from_secs(10), clock.clone());
        let mut rx = countdown.subscribe();

        countdown.start();
        countdown.start();
        rx.changed().await.unwrap();
        rx.borrow_and_update();

        clock.reset_reads();
        tokio::time::advance(Duration::from_secs(10)).await;
        rx.changed().await.unwrap();

        // Only one task read the clock for this tick.
        assert_eq!(clock.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_updates() {
        let clock = TestClock::at(0);
        let mut countdown = Countdown::with_clock(600, Duration::from_secs(10), clock.clone());
        let mut rx = countdown.subscribe();

        countdown.start();
        rx.changed().await.unwrap();
        rx.borrow_and_update();

        countdown.stop();
        assert!(!countdown.is_running());

        clock.advance(300);
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(10)).await;
            tokio::task::yield_now().await;
        }
        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow().as_str(), "in 10 minutes");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_updates() {
        let clock = TestClock::at(0);
        let mut countdown = Countdown::with_clock(600, Duration::from_secs(10), clock.clone());
        let mut rx = countdown.subscribe();

        countdown.start();
        rx.changed().await.unwrap();
        rx.borrow_and_update();
        drop(countdown);

        clock.reset_reads();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(10)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(clock.reads(), 0);
        assert!(!rx.has_changed().unwrap_or(false));
    }
}
