//! Repeating auto-sync timer.
//!
//! A [`Scheduler`] owns at most one timer task. [`Scheduler::start`] replaces
//! any running timer, [`Scheduler::stop`] cancels it, and dropping the
//! scheduler stops it too. Must be used inside a tokio runtime.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Default)]
pub struct Scheduler {
    timer: Option<JoinHandle<()>>,
    period: Option<Duration>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` every `period`, first after one full period.
    pub fn start<F>(&mut self, period: Duration, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        self.stop();
        let timer = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            // A machine waking from sleep fires once, not once per missed tick.
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                callback();
            }
        });
        self.timer = Some(timer);
        self.period = Some(period);
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.period = None;
    }

    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    /// Period of the live timer, if any.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = count.clone();
        (count, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn idle_until_started() {
        tokio_test::block_on(async {
            let mut scheduler = Scheduler::new();
            assert!(!scheduler.is_running());
            scheduler.start(Duration::from_secs(3600), || {});
            assert!(scheduler.is_running());
            scheduler.stop();
            assert!(!scheduler.is_running());
        });
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn fires_once_per_period_after_first_period() {
        let (count, callback) = counter();
        let mut scheduler = Scheduler::new();
        scheduler.start(Duration::from_secs(60), callback);

        sleep(Duration::from_secs(59)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn start_replaces_previous_timer() {
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        let mut scheduler = Scheduler::new();

        scheduler.start(Duration::from_secs(60), first_cb);
        scheduler.start(Duration::from_secs(300), second_cb);
        assert_eq!(scheduler.period(), Some(Duration::from_secs(300)));

        sleep(Duration::from_secs(301)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn stop_cancels_timer() {
        let (count, callback) = counter();
        let mut scheduler = Scheduler::new();
        scheduler.start(Duration::from_secs(60), callback);
        scheduler.stop();

        sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.period(), None);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn drop_cancels_timer() {
        let (count, callback) = counter();
        {
            let mut scheduler = Scheduler::new();
            scheduler.start(Duration::from_secs(60), callback);
        }
        sleep(Duration::from_secs(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
