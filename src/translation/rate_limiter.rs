/*!
 * Adaptive worker-count controller for one file's translation traffic.
 *
 * The controller follows an AIMD loop: an explicit overload signal from the endpoint
 * cuts the pool multiplicatively, and the pool only grows again after a full window
 * of healthy traffic. Every mutation happens behind one lock so concurrent outcome
 * reports are applied one after another, and every resize decision is computed by a
 * pure function of a [`PoolSnapshot`].
 *
 * A limiter is built fresh for each file and never shared across files.
 */

use crate::app_config::ConcurrencyConfig;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Tuning knobs of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterSettings {
    pub initial_workers: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub backoff_factor: f64,
    pub growth_factor: f64,
    pub success_threshold: f64,
    pub increase_interval: Duration,
    pub min_samples: u64,
}

impl From<&ConcurrencyConfig> for RateLimiterSettings {
    fn from(config: &ConcurrencyConfig) -> Self {
        Self {
            initial_workers: config.initial_workers,
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            backoff_factor: config.rate_limit_backoff_factor,
            growth_factor: config.rate_limit_growth_factor,
            success_threshold: config.success_threshold,
            increase_interval: Duration::from_secs(config.increase_interval_secs),
            min_samples: config.min_samples,
        }
    }
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self::from(&ConcurrencyConfig::default())
    }
}

/// Mutable state of the pool
#[derive(Debug, Clone)]
pub struct WorkerPoolState {
    pub current: usize,
    pub min: usize,
    pub max: usize,
    pub successes: u64,
    pub failures: u64,
    pub window_start: Instant,
}

impl WorkerPoolState {
    fn reset_window(&mut self, now: Instant) {
        self.successes = 0;
        self.failures = 0;
        self.window_start = now;
    }

    fn snapshot(&self, now: Instant) -> PoolSnapshot {
        PoolSnapshot {
            current: self.current,
            min: self.min,
            max: self.max,
            successes: self.successes,
            failures: self.failures,
            elapsed: now.saturating_duration_since(self.window_start),
        }
    }
}

/// Point-in-time copy of the pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub current: usize,
    pub min: usize,
    pub max: usize,
    pub successes: u64,
    pub failures: u64,
    pub elapsed: Duration,
}

impl PoolSnapshot {
    /// Outcomes observed in the current window
    pub fn samples(&self) -> u64 {
        self.successes + self.failures
    }

    /// Success ratio of the current window, if anything was observed
    pub fn success_rate(&self) -> Option<f64> {
        let samples = self.samples();
        (samples > 0).then(|| self.successes as f64 / samples as f64)
    }

    /// Pool size after an overload signal: floor(current × factor), never below min
    pub fn shrunk(&self, backoff_factor: f64) -> usize {
        let target = (self.current as f64 * backoff_factor).floor() as usize;
        target.clamp(self.min, self.max)
    }

    /// Pool size after a healthy window; grows by at least one, never above max
    pub fn grown(&self, growth_factor: f64) -> usize {
        let scaled = (self.current as f64 * growth_factor).floor() as usize;
        scaled.max(self.current + 1).clamp(self.min, self.max)
    }

    /// Whether this window qualifies for growth
    pub fn should_grow(&self, settings: &RateLimiterSettings) -> bool {
        self.elapsed >= settings.increase_interval
            && self.samples() >= settings.min_samples
            && self.success_rate().is_some_and(|rate| rate > settings.success_threshold)
    }
}

/// Lifetime counters, reported per file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RateLimiterStats {
    pub current_workers: usize,
    pub peak_workers: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rate_limit_events: u64,
    pub grow_events: u64,
}

/// AIMD controller owning one file's [`WorkerPoolState`]
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimiterSettings,
    label: String,
    state: Mutex<WorkerPoolState>,
    stats: Mutex<RateLimiterStats>,
}

impl RateLimiter {
    /// Create a limiter; the initial size is clamped into [min, max]
    pub fn new(settings: RateLimiterSettings) -> Self {
        Self::new_at(settings, Instant::now())
    }

    /// Create a limiter whose first window starts at `now`
    pub fn new_at(settings: RateLimiterSettings, now: Instant) -> Self {
        let min = settings.min_workers.max(1);
        let max = settings.max_workers.max(min);
        let current = settings.initial_workers.clamp(min, max);

        Self {
            label: String::new(),
            state: Mutex::new(WorkerPoolState {
                current,
                min,
                max,
                successes: 0,
                failures: 0,
                window_start: now,
            }),
            stats: Mutex::new(RateLimiterStats {
                current_workers: current,
                peak_workers: current,
                ..RateLimiterStats::default()
            }),
            settings,
        }
    }

    /// Name used in log lines, usually the file being translated
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Live worker count
    pub fn current_workers(&self) -> usize {
        self.state.lock().current
    }

    /// Copy of the state as of now
    pub fn snapshot(&self) -> PoolSnapshot {
        self.state.lock().snapshot(Instant::now())
    }

    /// Lifetime counters
    pub fn stats(&self) -> RateLimiterStats {
        *self.stats.lock()
    }

    /// Overload signal: cut the pool and start a fresh window
    pub fn on_rate_limit_error(&self) -> usize {
        self.on_rate_limit_error_at(Instant::now())
    }

    pub fn on_rate_limit_error_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.current;
        state.current = state.snapshot(now).shrunk(self.settings.backoff_factor);
        state.reset_window(now);
        let after = state.current;
        drop(state);

        let mut stats = self.stats.lock();
        stats.rate_limit_events += 1;
        stats.current_workers = after;
        drop(stats);

        if after < before {
            warn!("{}Rate limited, workers {} -> {}", self.prefix(), before, after);
        } else {
            debug!("{}Rate limited at minimum of {} workers", self.prefix(), after);
        }
        after
    }

    /// Successful call; grows the pool when the window qualifies
    pub fn on_success(&self) -> Option<usize> {
        self.on_success_at(Instant::now())
    }

    /// Returns the new size when this call triggered growth
    pub fn on_success_at(&self, now: Instant) -> Option<usize> {
        let mut state = self.state.lock();
        state.successes += 1;

        let snapshot = state.snapshot(now);
        let grown = if snapshot.should_grow(&self.settings) {
            state.current = snapshot.grown(self.settings.growth_factor);
            state.reset_window(now);
            Some(state.current)
        } else {
            None
        };
        let current = state.current;
        drop(state);

        let mut stats = self.stats.lock();
        stats.total_successes += 1;
        stats.current_workers = current;
        stats.peak_workers = stats.peak_workers.max(current);
        if grown.is_some_and(|size| size > snapshot.current) {
            stats.grow_events += 1;
        }
        drop(stats);

        match grown {
            Some(size) if size > snapshot.current => {
                info!(
                    "{}Success rate {:.1}% over {:?}, workers {} -> {}",
                    self.prefix(),
                    snapshot.success_rate().unwrap_or(1.0) * 100.0,
                    snapshot.elapsed,
                    snapshot.current,
                    size
                );
                Some(size)
            }
            _ => None,
        }
    }

    /// Non-overload failure; counted against the window, never resizes
    pub fn on_failure(&self) {
        self.state.lock().failures += 1;
        self.stats.lock().total_failures += 1;
    }

    fn prefix(&self) -> String {
        if self.label.is_empty() {
            String::new()
        } else {
            format!("[{}] ", self.label)
        }
    }
}
