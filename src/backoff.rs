//! Backoff strategies for spacing out delivery retries.
//!
//! The retry controller uses [`BackoffStrategy::doubling`] with a base of one
//! minute: a job that has failed `attempt` times waits `2^attempt * 60`
//! seconds before its next attempt. Strategies can optionally be clamped and
//! jittered; the default delivery path applies neither so that retry timing
//! stays exactly predictable.
//!
//! # Example
//!
//! ```
//! # use encore_notify::backoff::{BackoffStrategy, Strategy};
//! # use chrono::TimeDelta;
//! let strategy = BackoffStrategy::doubling(TimeDelta::seconds(60));
//!
//! assert_eq!(strategy.backoff(0), TimeDelta::seconds(60));
//! assert_eq!(strategy.backoff(1), TimeDelta::seconds(120));
//! assert_eq!(strategy.backoff(2), TimeDelta::seconds(240));
//! ```

use chrono::TimeDelta;
use rand::Rng;

/// Type that can be used to implement a backoff strategy.
pub trait Strategy {
    /// Given the number of failed attempts so far, returns the [`TimeDelta`]
    /// to wait before the next attempt.
    fn backoff(&self, attempt: u16) -> TimeDelta;
}

/// Constant backoff: the same delay no matter the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant {
    delay: TimeDelta,
}

impl Strategy for Constant {
    fn backoff(&self, _attempt: u16) -> TimeDelta {
        self.delay
    }
}

/// Doubling backoff: `base * 2^attempt`, optionally clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Doubling {
    base: TimeDelta,
    max: Option<TimeDelta>,
}

impl Strategy for Doubling {
    fn backoff(&self, attempt: u16) -> TimeDelta {
        let multiplier = 2i64.checked_pow(attempt.into()).unwrap_or(i64::MAX);
        let mut seconds = self
            .base
            .num_seconds()
            .checked_mul(multiplier)
            .unwrap_or(i64::MAX);
        if let Some(max) = self.max {
            seconds = seconds.min(max.num_seconds());
        }
        TimeDelta::try_seconds(seconds).unwrap_or(TimeDelta::MAX)
    }
}

/// A random jitter to be applied to a given backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// A random jitter added to the backoff in the range `-delta <= jitter <= delta`.
    Absolute(TimeDelta),
    /// A random jitter added as a proportion of the current backoff.
    Relative(f64),
}

impl Jitter {
    fn apply_jitter(&self, value: TimeDelta) -> TimeDelta {
        let milliseconds = match self {
            Self::Absolute(delta) => delta.num_milliseconds(),
            Self::Relative(ratio) => (value.num_milliseconds() as f64 * ratio).round() as i64,
        };
        let rand_jitter = rand::thread_rng().gen_range(-milliseconds..=milliseconds);
        value + TimeDelta::milliseconds(rand_jitter)
    }
}

/// A backoff strategy together with optional jitter, minimum, and maximum.
///
/// All of the constructors and configuration functions are `const`.
pub struct BackoffStrategy<T: Strategy> {
    strategy: T,
    jitter: Option<Jitter>,
    min: TimeDelta,
}

impl BackoffStrategy<Constant> {
    /// Creates a [`BackoffStrategy`] that always waits `delay`.
    pub const fn constant(delay: TimeDelta) -> Self {
        Self::new(Constant { delay })
    }
}

impl BackoffStrategy<Doubling> {
    /// Creates a [`BackoffStrategy`] that doubles `base` with every failed
    /// attempt.
    pub const fn doubling(base: TimeDelta) -> Self {
        Self::new(Doubling { base, max: None })
    }

    /// Clamps the maximum value returned by [`Strategy::backoff`] to `max_delay`.
    pub const fn with_max(mut self, max_delay: TimeDelta) -> Self {
        self.strategy.max = Some(max_delay);
        self
    }
}

impl<T> BackoffStrategy<T>
where
    T: Strategy,
{
    /// Creates a [`BackoffStrategy`] from a custom [`Strategy`].
    pub const fn new(strategy: T) -> Self {
        Self {
            strategy,
            jitter: None,
            min: TimeDelta::zero(),
        }
    }

    /// Adds a jitter. See [`Jitter`] for how this affects the delays.
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Adds a minimum value. Useful with a large jitter to avoid delays close
    /// to zero.
    pub const fn with_min(mut self, min: TimeDelta) -> Self {
        self.min = min;
        self
    }
}

impl<T> Strategy for BackoffStrategy<T>
where
    T: Strategy,
{
    fn backoff(&self, attempt: u16) -> TimeDelta {
        let mut backoff = self.strategy.backoff(attempt);

        if let Some(jitter) = self.jitter {
            backoff = jitter.apply_jitter(backoff);
        }

        backoff.max(self.min)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_backoff() {
        let delay = TimeDelta::minutes(1);
        let strategy = BackoffStrategy::constant(delay);

        for i in 0..100 {
            assert_eq!(strategy.backoff(i), delay);
        }
    }

    #[test]
    fn doubling_backoff() {
        let strategy = BackoffStrategy::doubling(TimeDelta::seconds(60));

        for i in 0..10 {
            assert_eq!(
                strategy.backoff(i),
                TimeDelta::seconds(60 * 2i64.pow(i as u32))
            );
        }
    }

    #[test]
    fn doubling_backoff_is_strictly_increasing() {
        let strategy = BackoffStrategy::doubling(TimeDelta::seconds(60));

        for i in 0..10 {
            assert!(strategy.backoff(i + 1) > strategy.backoff(i));
        }
    }

    #[test]
    fn doubling_backoff_with_max() {
        let max = TimeDelta::hours(4);
        let strategy = BackoffStrategy::doubling(TimeDelta::seconds(60)).with_max(max);

        for i in 0..100 {
            assert!(strategy.backoff(i) <= max);
        }
    }

    #[test]
    fn doubling_backoff_does_not_overflow_on_large_attempts() {
        let strategy = BackoffStrategy::doubling(TimeDelta::seconds(60));
        assert!(strategy.backoff(u16::MAX) > TimeDelta::zero());
    }

    #[test]
    fn constant_backoff_with_absolute_jitter() {
        let delay = TimeDelta::minutes(1);
        let jitter = TimeDelta::seconds(10);
        let strategy = BackoffStrategy::constant(delay).with_jitter(Jitter::Absolute(jitter));

        for i in 0..100 {
            let backoff = strategy.backoff(i);
            assert!(backoff >= delay - jitter);
            assert!(backoff <= delay + jitter);
        }
    }

    #[test]
    fn doubling_backoff_with_relative_jitter() {
        let strategy =
            BackoffStrategy::doubling(TimeDelta::seconds(60)).with_jitter(Jitter::Relative(0.1));

        for i in 0..5 {
            let expected = 60_f64 * 2f64.powi(i as i32);
            let backoff = strategy.backoff(i).num_seconds() as f64;
            assert!(backoff >= expected * 0.9);
            assert!(backoff <= expected * 1.1);
        }
    }

    #[test]
    fn jitter_respects_min() {
        let delay = TimeDelta::seconds(20);
        let jitter = TimeDelta::seconds(20);
        let min = TimeDelta::seconds(5);
        let strategy = BackoffStrategy::constant(delay)
            .with_jitter(Jitter::Absolute(jitter))
            .with_min(min);

        for i in 0..100 {
            let backoff = strategy.backoff(i);
            assert!(backoff >= min);
            assert!(backoff <= delay + jitter);
        }
    }
}
