//! Files the run modes share: the trade journal and the scanner's target list.
use anyhow::Result;
use fcmarket::Confidence;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

const JOURNAL_LEN: usize = 100;
pub const TARGET_TTL_SECS: f64 = 300.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TradeEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub mode: String,
    pub name: String,
    pub rating: i32,
    pub price: u32,
    pub expected_sell: u32,
    pub expected_profit: i64,
    pub success: bool,
    pub message: String,
}

impl TradeEntry {
    pub fn new(mode: &str, name: &str, rating: i32, price: u32) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            mode: mode.to_string(),
            name: name.to_string(),
            rating,
            price,
            expected_sell: 0,
            expected_profit: 0,
            success: false,
            message: String::new(),
        }
    }

    pub fn expecting(mut self, sell: u32, profit: i64) -> Self {
        self.expected_sell = sell;
        self.expected_profit = profit;
        self
    }

    pub fn outcome(mut self, success: bool, message: impl Into<String>) -> Self {
        self.success = success;
        self.message = message.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn entries(&self) -> Vec<TradeEntry> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// Appends `entry`, keeping only the most recent entries.
    pub fn append(&self, entry: TradeEntry) -> Result<()> {
        let mut entries = self.entries();
        entries.push(entry);
        let skip = entries.len().saturating_sub(JOURNAL_LEN);
        let entries: Vec<_> = entries.into_iter().skip(skip).collect();

        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    /// Like [`append`](Self::append) but only logs a failure.
    pub fn record(&self, entry: TradeEntry) {
        if let Err(e) = self.append(entry) {
            log::error!("Failed to write trade journal {}: {e}", self.path.display());
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Target {
    pub player_id: u64,
    pub player_name: String,
    pub max_buy_price: u32,
    pub target_sell_price: u32,
    pub expected_profit: i64,
    pub confidence: Confidence,
    pub expires_at: f64,
    #[serde(default)]
    pub source: String,
}

impl Target {
    pub fn is_valid(&self, now: f64) -> bool {
        self.expires_at > now && self.max_buy_price > 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TargetsFile {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub generated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub scan_count: u64,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl TargetsFile {
    pub fn new(scan_count: u64, targets: Vec<Target>) -> Self {
        Self {
            generated_at: Some(OffsetDateTime::now_utc()),
            scan_count,
            targets,
        }
    }

    /// Reads the file; an absent or half-written file reads as empty.
    pub fn load(path: impl AsRef<Path>) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn valid_targets(self, now: f64) -> Vec<Target> {
        self.targets
            .into_iter()
            .filter(|t| t.is_valid(now))
            .collect()
    }
}

pub fn unix_now() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bot-journal-{}-{name}", std::process::id()))
    }

    fn target(id: u64, expires_at: f64) -> Target {
        Target {
            player_id: id,
            player_name: format!("Player {id}"),
            max_buy_price: 2_000,
            target_sell_price: 2_600,
            expected_profit: 470,
            confidence: Confidence::Medium,
            expires_at,
            source: "global_scan".into(),
        }
    }

    #[test]
    fn journal_keeps_last_hundred() {
        let path = temp_file("trades.json");
        fs::remove_file(&path).ok();
        let journal = Journal::new(&path);

        for price in 0..105 {
            journal
                .append(TradeEntry::new("snipe", "Test", 84, price).outcome(true, "bought"))
                .unwrap();
        }

        let entries = journal.entries();
        assert_eq!(entries.len(), JOURNAL_LEN);
        assert_eq!(entries[0].price, 5);
        assert_eq!(entries[99].price, 104);
        assert!(entries[99].success);

        fs::remove_file(path).ok();
    }

    #[test]
    fn only_unexpired_targets_are_valid() {
        let path = temp_file("targets.json");
        TargetsFile::new(12, vec![target(1, 1_000.0), target(2, 2_000.0)])
            .save(&path)
            .unwrap();

        let file = TargetsFile::load(&path);
        assert_eq!(file.scan_count, 12);
        assert!(file.generated_at.is_some());

        let valid = file.valid_targets(1_500.0);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].player_id, 2);

        fs::remove_file(path).ok();
    }

    #[test]
    fn confidence_is_written_uppercase() {
        let value = serde_json::to_value(target(1, 0.0)).unwrap();
        assert_eq!(value["confidence"], "MEDIUM");
    }

    #[test]
    fn unreadable_targets_file_is_empty() {
        let path = temp_file("partial.json");
        fs::write(&path, "{\"targets\": [").unwrap();
        assert!(TargetsFile::load(&path).targets.is_empty());
        fs::remove_file(path).ok();
    }
}
