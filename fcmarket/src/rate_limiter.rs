use ringbuffer::{AllocRingBuffer, RingBuffer};
use std::time::{Duration, Instant};

pub const HOUR: Duration = Duration::from_secs(3_600);

/// Rolling-window budget: at most `limit` events per `window`.
pub struct RateLimiter {
    times: AllocRingBuffer<Instant>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            times: AllocRingBuffer::new(limit.max(1)),
            limit,
            window,
        }
    }

    pub fn per_hour(limit: usize) -> Self {
        Self::new(limit, HOUR)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Records an event at `now` if the budget allows it, otherwise returns
    /// how long until the next slot frees up.
    pub fn check_and_update(&mut self, now: Instant) -> Option<Duration> {
        if let Some(wait) = self.peek(now) {
            return Some(wait);
        }
        if self.times.len() == self.limit {
            self.times.dequeue();
        }
        self.times.push(now);
        None
    }

    /// Like [`check_and_update`](Self::check_and_update) without recording.
    pub fn peek(&self, now: Instant) -> Option<Duration> {
        if self.limit == 0 {
            return Some(self.window);
        }
        if self.times.len() < self.limit {
            return None;
        }

        let oldest = *self.times.get(0)?;
        let next_slot = oldest + self.window;

        if now >= next_slot {
            None
        } else {
            Some(next_slot - now)
        }
    }

    pub fn used(&self, now: Instant) -> usize {
        self.times
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }
}
