use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Trade ids seen recently, forgotten after `ttl`.
pub struct TradeCache {
    ttl: Duration,
    seen: HashMap<u64, Instant>,
}

impl TradeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    pub fn seen(&mut self, trade_id: u64, now: Instant) -> bool {
        let ttl = self.ttl;
        self.seen
            .retain(|_, &mut at| now.saturating_duration_since(at) < ttl);
        self.seen.contains_key(&trade_id)
    }

    pub fn insert(&mut self, trade_id: u64, now: Instant) {
        self.seen.insert(trade_id, now);
    }

    /// Records `trade_id` and reports whether it is new.
    pub fn check_and_insert(&mut self, trade_id: u64, now: Instant) -> bool {
        if self.seen(trade_id, now) {
            return false;
        }
        self.insert(trade_id, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_until_ttl() {
        let start = Instant::now();
        let mut cache = TradeCache::new(Duration::from_secs(300));

        assert!(cache.check_and_insert(1, start));
        assert!(!cache.check_and_insert(1, start + Duration::from_secs(299)));
        assert!(cache.seen(1, start + Duration::from_secs(299)));
        assert!(!cache.seen(1, start + Duration::from_secs(300)));
        assert!(cache.is_empty());
    }

    #[test]
    fn ids_are_independent() {
        let now = Instant::now();
        let mut cache = TradeCache::new(Duration::from_secs(60));
        cache.insert(1, now);
        assert!(!cache.seen(2, now));
        assert_eq!(cache.len(), 1);
    }
}
