//! Rate-limit token bucket (§4.4, §5). Process-global per source account,
//! refilling on a continuous wall-clock schedule independent of work
//! arrival, per SPEC_FULL.md §11.
//!
//! Shaped after the teacher's `notify::antiflutter::AntiFlutter` cooldown
//! gate (a single `Mutex`-guarded timestamp check), generalized from a
//! binary cooldown to a fractional-token accumulator.

use std::sync::Mutex;
use tokio::time::{Duration, Instant};

struct State {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<State>,
}

impl TokenBucket {
    /// `capacity` tokens total, refilling continuously at `per_minute` tokens/min.
    pub fn new(capacity: u32, per_minute: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: per_minute as f64 / 60.0,
            state: Mutex::new(State {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Block cooperatively until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refill_locked(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d.max(Duration::from_millis(1))).await,
            }
        }
    }

    /// Non-blocking check, for tests and metrics.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.refill_locked(&mut state);
        state.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumes_a_token_per_acquire() {
        let bucket = TokenBucket::new(5, 300);
        let before = bucket.available();
        bucket.acquire().await;
        let after = bucket.available();
        assert!(after <= before - 1.0 + 0.01);
    }

    #[tokio::test]
    async fn blocks_when_empty_then_refills() {
        let bucket = TokenBucket::new(1, 6000); // 100 tokens/sec refill for a fast test
        bucket.acquire().await;
        assert!(bucket.available() < 1.0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bucket.available() >= 1.0);
    }
}
