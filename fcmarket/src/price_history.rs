//! Bounded recent-price history per card version.
//!
//! Prices are keyed by definition id *and* rareflag so that special
//! versions of a card never pollute the average of its base version.
use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

const MAX_ENTRIES: usize = 50;
const AVERAGE_WINDOW: usize = 20;
const MIN_WEIGHT: f64 = 0.1;
const LOWEST_SEEN_SECS: f64 = 6.0 * 3_600.0;
const RETENTION_SECS: f64 = 24.0 * 3_600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub asset_id: u64,
    pub rareflag: i32,
}

impl PriceKey {
    pub fn new(asset_id: u64, rareflag: i32) -> Self {
        Self { asset_id, rareflag }
    }

    fn to_cache_key(self) -> String {
        format!("{}_{}", self.asset_id, self.rareflag)
    }

    fn from_cache_key(key: &str) -> Option<Self> {
        match key.split_once('_') {
            Some((asset, flag)) => Some(Self::new(asset.parse().ok()?, flag.parse().ok()?)),
            None => Some(Self::new(key.parse().ok()?, crate::schema::GOLD_RARE)),
        }
    }
}

/// `(price, unix seconds)`
pub type PricePoint = (u32, f64);

#[derive(Debug, Default)]
pub struct PriceHistory {
    prices: HashMap<PriceKey, VecDeque<PricePoint>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache file; a missing or unreadable file gives an empty history.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw: HashMap<String, Vec<PricePoint>> = match fs::read_to_string(path)
            .ok()
            .map(|text| serde_json::from_str(&text))
        {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                log::warn!("Ignoring corrupt price cache {}: {e}", path.display());
                return Self::default();
            }
            None => return Self::default(),
        };

        let prices = raw
            .into_iter()
            .filter_map(|(key, entries)| {
                let key = PriceKey::from_cache_key(&key)?;
                let skip = entries.len().saturating_sub(MAX_ENTRIES);
                Some((key, entries.into_iter().skip(skip).collect()))
            })
            .collect();

        Self { prices }
    }

    /// Prunes entries older than a day, then writes the cache file.
    pub fn save(&mut self, path: impl AsRef<Path>, now: f64) -> Result<()> {
        self.prune(now);
        let raw: HashMap<String, Vec<PricePoint>> = self
            .prices
            .iter()
            .map(|(key, entries)| (key.to_cache_key(), entries.iter().copied().collect()))
            .collect();
        fs::write(path, serde_json::to_string(&raw)?)?;
        Ok(())
    }

    pub fn record(&mut self, key: PriceKey, price: u32, now: f64) {
        let entries = self.prices.entry(key).or_default();
        if entries.len() == MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back((price, now));
    }

    /// Recency-weighted average of the last entries; weights fall linearly
    /// over a day down to a floor.
    pub fn weighted_average(&self, key: PriceKey, now: f64) -> Option<u32> {
        let entries = self.prices.get(&key)?;
        let skip = entries.len().saturating_sub(AVERAGE_WINDOW);

        let (sum, total) = entries
            .iter()
            .skip(skip)
            .fold((0.0, 0.0), |(sum, total), &(price, at)| {
                let age_hours = (now - at) / 3_600.0;
                let weight = (1.0 - age_hours / 24.0).max(MIN_WEIGHT);
                (sum + price as f64 * weight, total + weight)
            });

        (total > 0.0).then(|| (sum / total) as u32)
    }

    pub fn lowest_seen(&self, key: PriceKey, now: f64) -> Option<u32> {
        self.prices
            .get(&key)?
            .iter()
            .filter(|&&(_, at)| now - at < LOWEST_SEEN_SECS)
            .map(|&(price, _)| price)
            .min()
    }

    pub fn sample_count(&self, key: PriceKey) -> usize {
        self.prices.get(&key).map_or(0, VecDeque::len)
    }

    pub fn prune(&mut self, now: f64) {
        for entries in self.prices.values_mut() {
            entries.retain(|&(_, at)| now - at < RETENTION_SECS);
        }
        self.prices.retain(|_, entries| !entries.is_empty());
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: f64 = 1_760_000_000.0;
    const HOUR: f64 = 3_600.0;

    fn key() -> PriceKey {
        PriceKey::new(231747, 1)
    }

    #[test]
    fn versions_are_kept_apart() {
        let mut history = PriceHistory::new();
        history.record(PriceKey::new(1, 1), 1_000, NOW);
        history.record(PriceKey::new(1, 3), 50_000, NOW);

        assert_eq!(history.weighted_average(PriceKey::new(1, 1), NOW), Some(1_000));
        assert_eq!(history.weighted_average(PriceKey::new(1, 3), NOW), Some(50_000));
        assert_eq!(history.weighted_average(PriceKey::new(2, 1), NOW), None);
    }

    #[test]
    fn recent_prices_weigh_more() {
        let mut history = PriceHistory::new();
        history.record(key(), 1_000, NOW - 23.0 * HOUR);
        history.record(key(), 2_000, NOW);

        // weights 0.1 (floor) and 1.0
        let avg = history.weighted_average(key(), NOW).unwrap();
        assert_eq!(avg, ((1_000.0 * 0.1 + 2_000.0) / 1.1) as u32);
    }

    #[test]
    fn average_uses_only_the_last_twenty() {
        let mut history = PriceHistory::new();
        for _ in 0..10 {
            history.record(key(), 10_000, NOW);
        }
        for _ in 0..20 {
            history.record(key(), 1_000, NOW);
        }
        assert_eq!(history.weighted_average(key(), NOW), Some(1_000));
        assert_eq!(history.sample_count(key()), 30);
    }

    #[test]
    fn history_is_bounded() {
        let mut history = PriceHistory::new();
        for price in 0..60 {
            history.record(key(), price, NOW);
        }
        assert_eq!(history.sample_count(key()), MAX_ENTRIES);
        assert_eq!(history.lowest_seen(key(), NOW), Some(10));
    }

    #[test]
    fn lowest_seen_ignores_old_entries() {
        let mut history = PriceHistory::new();
        history.record(key(), 500, NOW - 7.0 * HOUR);
        history.record(key(), 900, NOW - HOUR);
        history.record(key(), 800, NOW);
        assert_eq!(history.lowest_seen(key(), NOW), Some(800));
    }

    #[test]
    fn prune_drops_stale_keys() {
        let mut history = PriceHistory::new();
        history.record(PriceKey::new(1, 1), 500, NOW - 25.0 * HOUR);
        history.record(PriceKey::new(2, 1), 500, NOW - 25.0 * HOUR);
        history.record(PriceKey::new(2, 1), 600, NOW);

        history.prune(NOW);
        assert_eq!(history.len(), 1);
        assert_eq!(history.sample_count(PriceKey::new(2, 1)), 1);
    }

    #[test]
    fn cache_file_survives_save_and_load() {
        let path = std::env::temp_dir().join(format!("fcmarket-prices-{}.json", std::process::id()));
        let mut history = PriceHistory::new();
        history.record(key(), 2_800, NOW - HOUR);
        history.record(key(), 2_900, NOW);
        history.record(PriceKey::new(7, 3), 40_000, NOW - 30.0 * HOUR);
        history.save(&path, NOW).unwrap();

        let loaded = PriceHistory::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.sample_count(key()), 2);
        assert_eq!(loaded.lowest_seen(key(), NOW), Some(2_800));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn corrupt_or_missing_cache_is_empty() {
        let path = std::env::temp_dir().join(format!("fcmarket-corrupt-{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();
        assert!(PriceHistory::load(&path).is_empty());
        std::fs::remove_file(&path).ok();
        assert!(PriceHistory::load(&path).is_empty());
    }

    #[test]
    fn legacy_keys_without_rareflag_are_gold_rare() {
        assert_eq!(PriceKey::from_cache_key("42"), Some(PriceKey::new(42, 1)));
        assert_eq!(PriceKey::from_cache_key("42_3"), Some(PriceKey::new(42, 3)));
        assert_eq!(PriceKey::from_cache_key("x_3"), None);
    }
}
