//! Reference prices per rating, used as the "fair value" a listing is
//! compared against.
use crate::pricing::{floor50, net_profit};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

pub const DEFAULT_MARKET_FLOOR: u32 = 700;
const MIN_USABLE_MAX_BUY: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferencePrice {
    pub max_buy: u32,
    pub sell_price: u32,
    pub min_profit: u32,
}

impl ReferencePrice {
    pub const fn new(max_buy: u32, sell_price: u32, min_profit: u32) -> Self {
        Self {
            max_buy,
            sell_price,
            min_profit,
        }
    }

    /// Derives buy/sell prices from an observed market price, keeping a
    /// safety `margin` below break-even. `None` when the result isn't worth
    /// trading.
    pub fn from_market(market_price: u32, margin: u32, tax: f64) -> Option<Self> {
        let break_even = market_price as f64 * (1.0 - tax);
        let max_buy = floor50(break_even - margin as f64);
        let sell_price = floor50(market_price as f64);
        let profit = net_profit(max_buy, sell_price, tax);

        (max_buy > MIN_USABLE_MAX_BUY && profit > 0)
            .then(|| Self::new(max_buy, sell_price, profit as u32))
    }
}

/// Lowest listing price the market accepts for a rating.
pub fn market_floor(rating: i32) -> u32 {
    match rating {
        83..=85 => 700,
        86 => 750,
        87 => 800,
        88 => 850,
        89 => 900,
        90 => 950,
        91 => 1_000,
        92 => 1_100,
        _ => DEFAULT_MARKET_FLOOR,
    }
}

/// Fallback prices for when no reference file has been generated yet.
pub fn fallback(rating: i32) -> Option<ReferencePrice> {
    let price = match rating {
        83 => ReferencePrice::new(1_100, 1_500, 200),
        84 => ReferencePrice::new(1_900, 2_500, 300),
        85 => ReferencePrice::new(3_400, 4_200, 400),
        86 => ReferencePrice::new(7_800, 9_000, 600),
        87 => ReferencePrice::new(11_500, 13_500, 1_000),
        88 => ReferencePrice::new(16_500, 19_000, 1_200),
        89 => ReferencePrice::new(22_000, 26_000, 2_000),
        90 => ReferencePrice::new(29_000, 34_000, 2_500),
        _ => return None,
    };
    Some(price)
}

/// Parses prices as shown by price sites: `850`, `1,250`, `2.5K`, `1,2M`.
/// Returns 0 for anything unparsable.
pub fn parse_price(text: &str) -> u32 {
    let text = text.trim().to_uppercase();
    if text.is_empty() {
        return 0;
    }

    let (number, multiplier) = if let Some(n) = text.strip_suffix('M') {
        (n.replace(',', "."), 1_000_000.0)
    } else if let Some(n) = text.strip_suffix('K') {
        (n.replace(',', "."), 1_000.0)
    } else {
        (text.replace(',', ""), 1.0)
    };

    number
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map_or(0, |n| (n * multiplier) as u32)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub rating: i32,
    pub max_buy: u32,
    #[serde(default, alias = "market_price")]
    pub sell_price: u32,
    #[serde(default)]
    pub estimated_profit: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ReferenceFile {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub generated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub targets: Vec<ReferenceEntry>,
}

const DEFAULT_MIN_PROFIT: u32 = 200;
const DEFAULT_PLATFORM: &str = "PC";

/// Reference prices by rating.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBook {
    prices: BTreeMap<i32, ReferencePrice>,
    pub platform: Option<String>,
    pub source: Option<String>,
}

impl ReferenceBook {
    /// Reads the reference file. `Ok(None)` when it doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let file: ReferenceFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        let prices: BTreeMap<_, _> = file
            .targets
            .into_iter()
            .filter(|t| t.max_buy > 0 && t.sell_price > 0)
            .map(|t| {
                let min_profit = t.estimated_profit.unwrap_or(DEFAULT_MIN_PROFIT);
                (t.rating, ReferencePrice::new(t.max_buy, t.sell_price, min_profit))
            })
            .collect();

        if prices.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            prices,
            platform: file.platform,
            source: file.source,
        }))
    }

    pub fn from_market_prices(
        market_prices: impl IntoIterator<Item = (i32, u32)>,
        margin: u32,
        tax: f64,
    ) -> Self {
        let mut prices = BTreeMap::new();
        for (rating, market) in market_prices {
            match ReferencePrice::from_market(market, margin, tax) {
                // keep the cheapest market price seen per rating
                Some(price) => match prices.get(&rating) {
                    Some(existing) if existing_is_cheaper(existing, &price) => {}
                    _ => {
                        prices.insert(rating, price);
                    }
                },
                None => log::warn!("Skipping rating {rating}: {market} leaves no profit"),
            }
        }

        Self {
            prices,
            platform: Some(DEFAULT_PLATFORM.into()),
            source: Some("manual".into()),
        }
    }

    pub fn get(&self, rating: i32) -> Option<ReferencePrice> {
        self.prices.get(&rating).copied()
    }

    /// Reference for `rating`, or the built-in fallback.
    pub fn get_or_fallback(&self, rating: i32) -> Option<ReferencePrice> {
        self.get(rating).or_else(|| fallback(rating))
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, ReferencePrice)> + '_ {
        self.prices.iter().map(|(&r, &p)| (r, p))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = ReferenceFile {
            platform: self.platform.clone(),
            source: self.source.clone(),
            generated_at: Some(OffsetDateTime::now_utc()),
            targets: self
                .iter()
                .map(|(rating, p)| ReferenceEntry {
                    rating,
                    max_buy: p.max_buy,
                    sell_price: p.sell_price,
                    estimated_profit: Some(p.min_profit),
                })
                .collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

fn existing_is_cheaper(existing: &ReferencePrice, new: &ReferencePrice) -> bool {
    existing.sell_price <= new.sell_price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_price_strings() {
        assert_eq!(parse_price("850"), 850);
        assert_eq!(parse_price("1,250"), 1_250);
        assert_eq!(parse_price("2.5K"), 2_500);
        assert_eq!(parse_price("2,5k"), 2_500);
        assert_eq!(parse_price(" 1.2M "), 1_200_000);
        assert_eq!(parse_price(""), 0);
        assert_eq!(parse_price("n/a"), 0);
    }

    #[test]
    fn derives_reference_from_market_price() {
        // 4_000 * 0.95 = 3_800, minus 200 margin -> 3_600
        let price = ReferencePrice::from_market(4_000, 200, 0.05).unwrap();
        assert_eq!(price.max_buy, 3_600);
        assert_eq!(price.sell_price, 4_000);
        assert_eq!(price.min_profit, 200);

        let rounded = ReferencePrice::from_market(2_980, 200, 0.05).unwrap();
        assert_eq!(rounded.max_buy, 2_600);
        assert_eq!(rounded.sell_price, 2_950);
    }

    #[test]
    fn cheap_markets_are_not_tradeable() {
        assert_eq!(ReferencePrice::from_market(700, 200, 0.05), None);
    }

    #[test]
    fn market_floor_defaults() {
        assert_eq!(market_floor(84), 700);
        assert_eq!(market_floor(88), 850);
        assert_eq!(market_floor(92), 1_100);
        assert_eq!(market_floor(75), DEFAULT_MARKET_FLOOR);
    }

    #[test]
    fn loads_reference_file_formats() {
        let path = std::env::temp_dir().join(format!("fcmarket-ref-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "platform": "PC",
                "targets": [
                    {"rating": 84, "max_buy": 1900, "sell_price": 2500, "estimated_profit": 475},
                    {"rating": 85, "max_buy": 3400, "market_price": 4200},
                    {"rating": 86, "max_buy": 0, "sell_price": 9000}
                ]
            }"#,
        )
        .unwrap();

        let book = ReferenceBook::load(&path).unwrap().unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(84), Some(ReferencePrice::new(1_900, 2_500, 475)));
        assert_eq!(book.get(85), Some(ReferencePrice::new(3_400, 4_200, 200)));
        assert_eq!(book.get(86), None);
        assert_eq!(book.get_or_fallback(86), fallback(86));
        assert_eq!(book.platform.as_deref(), Some("PC"));
        assert_eq!(book.source, None);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_none() {
        let path = std::env::temp_dir().join("fcmarket-ref-does-not-exist.json");
        assert!(ReferenceBook::load(path).unwrap().is_none());
    }

    #[test]
    fn saved_book_loads_back() {
        let path = std::env::temp_dir().join(format!("fcmarket-ref-save-{}.json", std::process::id()));
        let book = ReferenceBook::from_market_prices([(84, 2_500), (85, 4_200), (84, 2_400)], 200, 0.05);
        assert_eq!(book.get(84).unwrap().sell_price, 2_400);
        book.save(&path).unwrap();

        let loaded = ReferenceBook::load(&path).unwrap().unwrap();
        assert_eq!(loaded.get(84), book.get(84));
        assert_eq!(loaded.get(85), book.get(85));
        assert_eq!(loaded.platform.as_deref(), Some("PC"));
        assert_eq!(loaded.source.as_deref(), Some("manual"));

        std::fs::remove_file(path).ok();
    }
}
