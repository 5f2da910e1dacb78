use crate::reference::market_floor;
use derive_more::Display;

pub const DEFAULT_TAX_RATE: f64 = 0.05;
const LISTING_START_FRACTION: f64 = 0.9;

/// Rounds down to the 50-credit price grid.
pub fn floor50(price: f64) -> u32 {
    if price <= 0.0 {
        return 0;
    }
    ((price + 1e-9) / 50.0).floor() as u32 * 50
}

/// Net credits after selling at `sell` (minus the market tax) and buying at `buy`.
pub fn net_profit(buy: u32, sell: u32, tax: f64) -> i64 {
    (sell as f64 * (1.0 - tax) + 1e-9).floor() as i64 - buy as i64
}

/// `(starting_bid, buy_now_price)` for relisting at `sell`.
pub fn listing_prices(sell: u32) -> (u32, u32) {
    (
        floor50(sell as f64 * LISTING_START_FRACTION),
        floor50(sell as f64),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DealRules {
    pub tax: f64,
    pub max_buy_price: u32,
    pub min_profit: i64,
    pub min_margin: f64,
}

impl Default for DealRules {
    fn default() -> Self {
        Self {
            tax: DEFAULT_TAX_RATE,
            max_buy_price: 15_000,
            min_profit: 200,
            min_margin: 0.05,
        }
    }
}

impl DealRules {
    /// Expected profit when buying at `buy` and reselling at `sell` clears
    /// both the absolute and the relative bar.
    pub fn evaluate(&self, buy: u32, sell: u32) -> Option<i64> {
        if buy == 0 || buy > self.max_buy_price {
            return None;
        }
        let profit = net_profit(buy, sell, self.tax);
        let margin = (sell as f64 * (1.0 - self.tax) - buy as f64) / buy as f64;

        (profit >= self.min_profit && margin >= self.min_margin).then_some(profit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    #[display("HIGH")]
    High,
    #[display("MEDIUM")]
    Medium,
}

impl Confidence {
    pub fn of(profit: i64, samples: usize) -> Self {
        if profit > 500 && samples >= 10 {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }
}

/// Price below which a listing counts as an anomaly against `reference`.
/// `None` when that threshold doesn't clear the market floor for `rating`.
pub fn anomaly_threshold(reference: u32, rating: i32, fraction: f64) -> Option<u32> {
    let threshold = (reference as f64 * fraction + 1e-9).floor() as u32;
    (threshold > market_floor(rating)).then_some(threshold)
}

/// Percentage below the reference, one decimal.
pub fn discount_pct(price: u32, reference: u32) -> f64 {
    if reference == 0 {
        return 0.0;
    }
    ((1.0 - price as f64 / reference as f64) * 1_000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor50_rounds_down_to_grid() {
        assert_eq!(floor50(3_049.0), 3_000);
        assert_eq!(floor50(3_050.0), 3_050);
        assert_eq!(floor50(-10.0), 0);
    }

    #[test]
    fn profit_includes_tax() {
        assert_eq!(net_profit(2_500, 3_000, 0.05), 350);
        assert_eq!(net_profit(3_000, 3_000, 0.05), -150);
    }

    #[test]
    fn listing_prices_start_at_ninety_percent() {
        assert_eq!(listing_prices(4_200), (3_750, 4_200));
        assert_eq!(listing_prices(1_525), (1_350, 1_500));
    }

    #[test]
    fn deal_needs_absolute_and_relative_profit() {
        let rules = DealRules::default();

        // 4000 * 0.95 - 3000 = 800, 26%
        assert_eq!(rules.evaluate(3_000, 4_000), Some(800));
        // profit 150 < 200
        assert_eq!(rules.evaluate(1_000, 1_211), None);
        // profit 250 but margin 2.5%
        assert_eq!(rules.evaluate(10_000, 10_790), None);
        // above the max buy price
        assert_eq!(rules.evaluate(16_000, 30_000), None);
        assert_eq!(rules.evaluate(0, 1_000), None);
    }

    #[test]
    fn margin_uses_unrounded_proceeds() {
        // 4425 * 0.95 - 4003 = 200.75, a 5.015% margin; the floored 200 is 4.996%
        assert_eq!(DealRules::default().evaluate(4_003, 4_425), Some(200));
    }

    #[test]
    fn confidence_levels() {
        assert_eq!(Confidence::of(600, 10), Confidence::High);
        assert_eq!(Confidence::of(600, 9), Confidence::Medium);
        assert_eq!(Confidence::of(500, 20), Confidence::Medium);
        assert_eq!(Confidence::High.to_string(), "HIGH");
    }

    #[test]
    fn anomaly_threshold_respects_market_floor() {
        assert_eq!(anomaly_threshold(2_500, 84, 0.85), Some(2_125));
        // 800 * 0.85 = 680 <= 700
        assert_eq!(anomaly_threshold(800, 83, 0.85), None);
    }

    #[test]
    fn discount_is_rounded() {
        assert_eq!(discount_pct(2_000, 2_500), 20.0);
        assert_eq!(discount_pct(1_000, 3_000), 66.7);
        assert_eq!(discount_pct(1, 0), 0.0);
    }
}
