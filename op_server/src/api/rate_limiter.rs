//! Per-socket command rate limiting.
//!
//! Token-bucket budget applied by the session router before any command is
//! dispatched. A socket may burst up to one second's allowance at once and
//! is then held to the steady per-second rate as tokens trickle back.

use std::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    /// Burst ceiling, in whole commands.
    capacity: u32,
    /// Tokens earned back per second.
    refill_rate: f64,
    /// Spendable tokens, fractional between refills.
    available: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Budget of `commands_per_second`, with an equal burst allowance.
    #[must_use]
    pub fn per_second(commands_per_second: usize) -> Self {
        let capacity = commands_per_second.max(1) as u32;
        Self {
            capacity,
            refill_rate: f64::from(capacity),
            available: f64::from(capacity),
            last_refill: Instant::now(),
        }
    }

    /// Spend one command from the budget. Returns `false` once the socket
    /// has outrun its allowance.
    pub fn check(&mut self) -> bool {
        self.refill();
        if self.available < 1.0 {
            return false;
        }
        self.available -= 1.0;
        true
    }

    /// Commands spendable right now.
    #[must_use]
    pub fn remaining(&mut self) -> usize {
        self.refill();
        self.available as usize
    }

    fn refill(&mut self) {
        let earned = self.last_refill.elapsed().as_secs_f64() * self.refill_rate;
        self.last_refill = Instant::now();
        self.available = (self.available + earned).min(f64::from(self.capacity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_spends_down_to_zero() {
        let mut limiter = RateLimiter::per_second(5);
        for _ in 0..5 {
            assert!(limiter.check());
        }
        assert!(!limiter.check());
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn tokens_trickle_back_at_the_steady_rate() {
        let mut limiter = RateLimiter::per_second(50);
        while limiter.check() {}
        std::thread::sleep(Duration::from_millis(60));
        // A short wait earns a few tokens back, nowhere near the full
        // burst allowance.
        assert!(limiter.check());
        assert!(limiter.remaining() < 25);
    }

    #[test]
    fn bucket_never_exceeds_capacity() {
        let mut limiter = RateLimiter::per_second(2);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.remaining(), 2);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }

    #[test]
    fn zero_budget_is_clamped_to_one() {
        let mut limiter = RateLimiter::per_second(0);
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
