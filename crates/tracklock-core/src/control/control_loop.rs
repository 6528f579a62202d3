//! Fixed-rate tick runner
//!
//! Drives a [`Scheduler`] at a fixed rate on the current thread, with timing
//! statistics. Runs until the scheduler has nothing left, the caller's
//! predicate says stop, or a deadline passes.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::scheduler::Scheduler;
use crate::{Error, Result};

/// Configuration for a tick loop
#[derive(Debug, Clone)]
pub struct TickLoopConfig {
    /// Tick rate in Hz
    pub rate_hz: f64,
    /// Name for logging
    pub name: Arc<str>,
    /// Whether to warn on timing overruns
    pub warn_on_overrun: bool,
}

impl Default for TickLoopConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            name: "tick_loop".into(),
            warn_on_overrun: true,
        }
    }
}

impl TickLoopConfig {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Nominal tick period
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }

    fn validate(&self) -> Result<()> {
        if self.rate_hz.is_finite() && self.rate_hz > 0.0 {
            Ok(())
        } else {
            Err(Error::Config(format!("tick rate {} must be positive", self.rate_hz)))
        }
    }
}

/// Timing statistics for a tick loop
///
/// Jitter is tracked with Welford's online variance.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickStats {
    pub ticks: u64,
    /// Ticks that took longer than the period
    pub overruns: u64,
    /// Ticks in which an engagement failed
    pub failed_ticks: u64,
    pub total_tick_time: Duration,
    pub max_tick_time: Duration,
    pub min_tick_time: Duration,
    pub last_tick_time: Duration,
    mean_secs: f64,
    m2: f64,
}

impl TickStats {
    pub fn record(&mut self, tick_time: Duration, period: Duration) {
        self.ticks += 1;
        self.total_tick_time += tick_time;
        self.last_tick_time = tick_time;

        if self.ticks == 1 {
            self.min_tick_time = tick_time;
            self.max_tick_time = tick_time;
        } else {
            self.min_tick_time = self.min_tick_time.min(tick_time);
            self.max_tick_time = self.max_tick_time.max(tick_time);
        }

        let secs = tick_time.as_secs_f64();
        let delta = secs - self.mean_secs;
        self.mean_secs += delta / self.ticks as f64;
        self.m2 += delta * (secs - self.mean_secs);

        if tick_time > period {
            self.overruns += 1;
        }
    }

    pub fn avg_tick_time(&self) -> Duration {
        Duration::from_secs_f64(self.mean_secs)
    }

    /// Fraction of ticks that overran
    pub fn overrun_ratio(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.overruns as f64 / self.ticks as f64
        }
    }

    /// Standard deviation of tick time in seconds, 0 with fewer than 2 ticks
    pub fn jitter_std_dev(&self) -> f64 {
        if self.ticks < 2 {
            0.0
        } else {
            (self.m2 / (self.ticks - 1) as f64).sqrt()
        }
    }
}

/// Runs a scheduler at a fixed rate
///
/// # Example
/// ```ignore
/// use tracklock_core::control::{Scheduler, TickLoop, TickLoopConfig};
///
/// let mut scheduler = Scheduler::new();
/// scheduler.schedule(shooter);
/// let stats = TickLoop::run(TickLoopConfig::default(), &mut scheduler, |tick, _| tick < 500)?;
/// ```
pub struct TickLoop;

impl TickLoop {
    /// Run on the current thread until the scheduler empties or
    /// `keep_going(tick, scheduler)` returns false
    ///
    /// Engagement failures are logged and counted; the scheduler has already
    /// ended the failing engagement, so the loop carries on with the rest.
    pub fn run<F>(config: TickLoopConfig, scheduler: &mut Scheduler, mut keep_going: F) -> Result<TickStats>
    where
        F: FnMut(u64, &Scheduler) -> bool,
    {
        config.validate()?;
        let period = config.period();
        let mut stats = TickStats::default();
        let mut tick = 0u64;
        let mut last_time: Option<Instant> = None;

        while !scheduler.is_empty() && keep_going(tick, scheduler) {
            let tick_start = Instant::now();
            let dt = match last_time {
                Some(last) => tick_start.duration_since(last).as_secs_f64(),
                None => period.as_secs_f64(),
            };
            let dt = if dt > 0.0 { dt } else { period.as_secs_f64() };
            last_time = Some(tick_start);

            if let Err(e) = scheduler.run_tick(dt) {
                tracing::warn!("{}: tick {} failed: {}", config.name, tick, e);
                stats.failed_ticks += 1;
            }

            let tick_time = tick_start.elapsed();
            stats.record(tick_time, period);

            if let Some(sleep_time) = period.checked_sub(tick_time) {
                thread::sleep(sleep_time);
            } else if config.warn_on_overrun {
                tracing::warn!("{}: tick overrun by {:?}", config.name, tick_time - period);
            }

            tick += 1;
        }

        tracing::debug!(
            "{}: stopped after {} ticks ({} overruns)",
            config.name,
            stats.ticks,
            stats.overruns
        );
        Ok(stats)
    }

    /// Run for at most `duration`
    pub fn run_for(config: TickLoopConfig, scheduler: &mut Scheduler, duration: Duration) -> Result<TickStats> {
        let start = Instant::now();
        Self::run(config, scheduler, |_, _| start.elapsed() < duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ActuatorSet;
    use crate::sim::ScriptedEngagement;
    use approx::assert_relative_eq;

    fn fast() -> TickLoopConfig {
        TickLoopConfig::new(1000.0).with_name("test")
    }

    #[test]
    fn test_runs_until_scheduler_empty() {
        let mut scheduler = Scheduler::new();
        let engagement = ScriptedEngagement::new("a", &[ActuatorSet::Drivetrain]).finish_after(5);
        let log = engagement.log();
        scheduler.schedule(engagement);

        let stats = TickLoop::run(fast(), &mut scheduler, |_, _| true).unwrap();
        assert_eq!(stats.ticks, 5);
        assert_eq!(log.ticks(), 5);
        assert_eq!(log.ends(), vec![false]);
    }

    #[test]
    fn test_empty_scheduler_returns_immediately() {
        let mut scheduler = Scheduler::new();
        let stats = TickLoop::run(fast(), &mut scheduler, |_, _| true).unwrap();
        assert_eq!(stats.ticks, 0);
    }

    #[test]
    fn test_predicate_stops_loop() {
        let mut scheduler = Scheduler::new();
        let engagement = ScriptedEngagement::new("a", &[ActuatorSet::Drivetrain]);
        let log = engagement.log();
        scheduler.schedule(engagement);

        let stats = TickLoop::run(fast(), &mut scheduler, |tick, _| tick < 3).unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(log.ticks(), 3);
        // Still scheduled; the caller decides what to do with it
        assert!(!scheduler.is_empty());
    }

    #[test]
    fn test_first_tick_uses_nominal_period() {
        let mut scheduler = Scheduler::new();
        let engagement = ScriptedEngagement::new("a", &[ActuatorSet::Drivetrain]).finish_after(1);
        let log = engagement.log();
        scheduler.schedule(engagement);

        TickLoop::run(TickLoopConfig::default(), &mut scheduler, |_, _| true).unwrap();
        assert_relative_eq!(log.dts()[0], 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_failure_counted_and_loop_continues() {
        let mut scheduler = Scheduler::new();
        let bad = ScriptedEngagement::new("bad", &[ActuatorSet::Shooter]).fail_on(2);
        let good = ScriptedEngagement::new("good", &[ActuatorSet::Intake]).finish_after(4);
        let good_log = good.log();
        scheduler.schedule(bad);
        scheduler.schedule(good);

        let stats = TickLoop::run(fast(), &mut scheduler, |_, _| true).unwrap();
        assert_eq!(stats.failed_ticks, 1);
        assert_eq!(stats.ticks, 4);
        assert_eq!(good_log.ends(), vec![false]);
    }

    #[test]
    fn test_run_for_deadline() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(ScriptedEngagement::new("a", &[ActuatorSet::Drivetrain]));

        let config = TickLoopConfig::new(100.0);
        let stats = TickLoop::run_for(config, &mut scheduler, Duration::from_millis(100)).unwrap();
        assert!(
            stats.ticks >= 5 && stats.ticks <= 20,
            "Expected ~10 ticks, got {}",
            stats.ticks
        );
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let mut scheduler = Scheduler::new();
        let result = TickLoop::run(TickLoopConfig::new(0.0), &mut scheduler, |_, _| true);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_stats() {
        let mut stats = TickStats::default();
        let period = Duration::from_millis(20);
        stats.record(Duration::from_millis(10), period);
        stats.record(Duration::from_millis(30), period);

        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.overruns, 1);
        assert_relative_eq!(stats.overrun_ratio(), 0.5);
        assert_eq!(stats.max_tick_time, Duration::from_millis(30));
        assert_eq!(stats.min_tick_time, Duration::from_millis(10));
        assert_relative_eq!(stats.avg_tick_time().as_secs_f64(), 0.02, epsilon = 1e-9);
        // std dev of {0.01, 0.03}
        assert_relative_eq!(stats.jitter_std_dev(), 0.0141421356, epsilon = 1e-8);
    }
}
