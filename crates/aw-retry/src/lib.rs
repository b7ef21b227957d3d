//! Retry/backoff policy shared by safe-output handlers (one retry on a
//! transient GitHub API failure, per §4.E) and remote source fetches
//! (§4.A import resolution, §Component H update-merge network calls).
//!
//! A deliberately small surface compared to a general-purpose retry crate:
//! this compiler only ever needs "try once, maybe try again after a
//! delay," never unbounded retry loops.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    Immediate,
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// A fully-specified retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    pub strategy: RetryStrategyType,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde_duration")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde_duration")]
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryPolicy::Default.to_config()
    }
}

impl RetryStrategyConfig {
    /// The delay before attempt number `attempt` (1-indexed: attempt 1 is
    /// the first retry, not the initial try).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = match self.strategy {
            RetryStrategyType::Immediate => Duration::ZERO,
            RetryStrategyType::Constant => self.base_delay,
            RetryStrategyType::Linear => self.base_delay * attempt.max(1),
            RetryStrategyType::Exponential => {
                let exp = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        };
        raw.min(self.max_delay)
    }

    /// Same as [`Self::delay_for_attempt`] but with up to 20% jitter added
    /// when `self.jitter` is set, using `seed` as a deterministic source
    /// of randomness (callers pass something like an attempt counter or
    /// hash so tests stay reproducible — this crate never calls into
    /// any RNG or the system clock itself).
    pub fn delay_for_attempt_with_jitter(&self, attempt: u32, seed: u64) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let fraction = (seed % 100) as f64 / 100.0 * 0.2;
        base + Duration::from_secs_f64(base.as_secs_f64() * fraction)
    }
}

/// The one-retry policy safe-output handlers use by default (§4.E): a
/// single retry after a short fixed delay, no exponential ramp since the
/// handler only gets one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    #[default]
    Default,
    Aggressive,
    Conservative,
}

impl RetryPolicy {
    pub fn to_config(self) -> RetryStrategyConfig {
        match self {
            RetryPolicy::Default => RetryStrategyConfig {
                strategy: RetryStrategyType::Constant,
                max_attempts: 2,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(2),
                jitter: false,
            },
            RetryPolicy::Aggressive => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 5,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                jitter: true,
            },
            RetryPolicy::Conservative => RetryStrategyConfig {
                strategy: RetryStrategyType::Linear,
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(20),
                jitter: false,
            },
        }
    }
}

mod humantime_serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_and_caps() {
        let cfg = RetryStrategyConfig {
            strategy: RetryStrategyType::Exponential,
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(cfg.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn constant_never_changes() {
        let cfg = RetryPolicy::Default.to_config();
        assert_eq!(cfg.delay_for_attempt(1), cfg.delay_for_attempt(2));
    }

    #[test]
    fn immediate_has_zero_delay() {
        let cfg = RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        assert_eq!(cfg.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn jitter_never_decreases_delay() {
        let cfg = RetryStrategyConfig {
            strategy: RetryStrategyType::Constant,
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            jitter: true,
        };
        let base = cfg.delay_for_attempt(1);
        let jittered = cfg.delay_for_attempt_with_jitter(1, 42);
        assert!(jittered >= base);
    }
}
