//! Live speed, accuracy and progress over every visited unit.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::compare::Status;

/// Status totals over one or more status streams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Every non-pending position, `current` included.
    pub typed: usize,
    pub correct: usize,
    pub incorrect: usize,
}

impl StatusCounts {
    pub fn tally<'a, I>(streams: I) -> Self
    where
        I: IntoIterator<Item = &'a [Status]>,
    {
        streams
            .into_iter()
            .flatten()
            .fold(Self::default(), |mut counts, status| {
                match status {
                    Status::Pending => return counts,
                    Status::Correct => counts.correct += 1,
                    Status::Incorrect => counts.incorrect += 1,
                    Status::Current => {}
                }
                counts.typed += 1;
                counts
            })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_typed: usize,
    pub correct: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
    pub target_total: usize,
    /// Units per minute since the timer started, net of the retry baseline.
    pub speed: f64,
}

impl StatsSnapshot {
    /// Percent, one decimal. 100 before anything is typed.
    pub fn accuracy(&self) -> f64 {
        if self.total_typed == 0 {
            return 100.0;
        }
        round1(self.correct as f64 * 100.0 / self.total_typed as f64)
    }

    pub fn progress(&self) -> f64 {
        if self.target_total == 0 {
            return 0.0;
        }
        (self.total_typed as f64 * 100.0 / self.target_total as f64).min(100.0)
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default)]
pub struct StatsEngine {
    counts: StatusCounts,
    target_total: usize,
    baseline: usize,
    running_since: Option<Instant>,
    banked: Duration,
    frozen: bool,
    elapsed: Duration,
    speed: f64,
}

impl StatsEngine {
    pub fn new(target_total: usize) -> Self {
        Self {
            target_total,
            ..Self::default()
        }
    }

    pub fn set_target_total(&mut self, target_total: usize) {
        self.target_total = target_total;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Fold in fresh counts after an input change.
    pub fn observe(&mut self, counts: StatusCounts, now: Instant) -> StatsSnapshot {
        if counts.typed == 0 {
            if self.counts.typed > 0 || self.elapsed > Duration::ZERO {
                debug!("input cleared, resetting stats");
            }
            self.reset();
            return self.snapshot();
        }

        self.counts = counts;
        if self.running_since.is_none() && !self.frozen && counts.typed > self.baseline {
            self.running_since = Some(now);
        }
        self.recompute(now);

        if self.snapshot().progress() >= 100.0 && !self.frozen {
            self.freeze(now);
        }
        self.snapshot()
    }

    /// Periodic recomputation of elapsed time and speed.
    pub fn tick(&mut self, now: Instant) -> StatsSnapshot {
        if self.running_since.is_some() {
            self.recompute(now);
        }
        self.snapshot()
    }

    pub fn freeze(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.banked += now.saturating_duration_since(since);
        }
        self.frozen = true;
        self.recompute(now);
    }

    pub fn thaw(&mut self, now: Instant) {
        self.frozen = false;
        if self.counts.typed > self.baseline && self.snapshot().progress() < 100.0 {
            self.running_since = Some(now);
        }
    }

    /// Back to zero, e.g. for a freshly selected collection.
    pub fn reset(&mut self) {
        *self = Self::new(self.target_total);
    }

    /// Start timing again from the current counts without losing them.
    pub fn restart(&mut self) {
        self.baseline = self.counts.typed;
        self.running_since = None;
        self.banked = Duration::ZERO;
        self.frozen = false;
        self.elapsed = Duration::ZERO;
        self.speed = 0.0;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.banked
            + self
                .running_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_typed: self.counts.typed,
            correct: self.counts.correct,
            errors: self.counts.incorrect,
            elapsed_ms: self.elapsed.as_millis() as u64,
            target_total: self.target_total,
            speed: self.speed,
        }
    }

    fn recompute(&mut self, now: Instant) {
        self.elapsed = self.elapsed(now);
        let secs = self.elapsed.as_secs_f64();
        let net = self.counts.typed.saturating_sub(self.baseline);
        self.speed = if secs > 0.0 {
            net as f64 * 60.0 / secs
        } else {
            0.0
        };
    }
}
