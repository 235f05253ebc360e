//! Retry backoff.
//!
//! The wait before attempt `r` is `base * 2^r`, moved by up to ±20%.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

/// Fraction of the nominal delay used as jitter bound.
pub const JITTER_FRACTION: f64 = 0.2;

/// How the backoff is spread around its nominal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    /// Uniformly random within the bound
    #[default]
    Random,
    /// `(r * 137) mod 2j - j`, reproducible across runs
    Deterministic,
}

impl FromStr for JitterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(JitterMode::Random),
            "deterministic" => Ok(JitterMode::Deterministic),
            other => Err(format!("unknown jitter mode: {other}")),
        }
    }
}

/// Exponential backoff with bounded jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    jitter: JitterMode,
}

impl Backoff {
    pub fn new(base: Duration, jitter: JitterMode) -> Self {
        Self { base, jitter }
    }

    /// `base * 2^retry_count`, saturating.
    pub fn nominal(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Delay to wait before running attempt `retry_count`.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let nominal = self.nominal(retry_count);
        let nominal_ms = nominal.as_millis().min(i64::MAX as u128) as i64;
        let bound = (nominal_ms as f64 * JITTER_FRACTION) as i64;
        if bound == 0 {
            return nominal;
        }

        let offset = match self.jitter {
            JitterMode::Random => rand::rng().random_range(-bound..=bound),
            JitterMode::Deterministic => (retry_count as i64 * 137) % (2 * bound) - bound,
        };

        Duration::from_millis(nominal_ms.saturating_add(offset).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_bounds(backoff: &Backoff, r: u32) {
        let nominal = backoff.nominal(r).as_millis() as f64;
        let delay = backoff.delay(r).as_millis() as f64;
        assert!(
            delay >= nominal * 0.8 - 1.0 && delay <= nominal * 1.2 + 1.0,
            "retry {r}: {delay}ms outside ±20% of {nominal}ms"
        );
    }

    #[test]
    fn test_nominal_doubles() {
        let backoff = Backoff::new(Duration::from_secs(1), JitterMode::Random);
        assert_eq!(backoff.nominal(0), Duration::from_secs(1));
        assert_eq!(backoff.nominal(1), Duration::from_secs(2));
        assert_eq!(backoff.nominal(3), Duration::from_secs(8));
    }

    #[test]
    fn test_random_jitter_bounds() {
        let backoff = Backoff::new(Duration::from_secs(1), JitterMode::Random);
        for r in 0..=6 {
            for _ in 0..200 {
                within_bounds(&backoff, r);
            }
        }
    }

    #[test]
    fn test_deterministic_jitter() {
        let backoff = Backoff::new(Duration::from_secs(1), JitterMode::Deterministic);
        // r=1: nominal 2000, j=400, (137 % 800) - 400 = -263
        assert_eq!(backoff.delay(1), Duration::from_millis(1737));
        // r=3: nominal 8000, j=1600, (411 % 3200) - 1600 = -1189
        assert_eq!(backoff.delay(3), Duration::from_millis(6811));
        assert_eq!(backoff.delay(2), backoff.delay(2));
        for r in 0..=6 {
            within_bounds(&backoff, r);
        }
    }

    #[test]
    fn test_tiny_base_has_no_jitter() {
        let backoff = Backoff::new(Duration::from_millis(1), JitterMode::Random);
        assert_eq!(backoff.delay(0), Duration::from_millis(1));
        assert_eq!(backoff.delay(1), Duration::from_millis(2));
    }

    #[test]
    fn test_huge_retry_count_saturates() {
        let backoff = Backoff::new(Duration::from_secs(1), JitterMode::Deterministic);
        assert!(backoff.delay(64) > Duration::from_secs(1));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("Deterministic".parse::<JitterMode>().unwrap(), JitterMode::Deterministic);
        assert!("gaussian".parse::<JitterMode>().is_err());
    }
}
