//! Day/night volume trading: buy fodder while the market is quiet, sell it
//! in the evening peak, and keep relisting in between.
use crate::journal::TradeEntry;
use crate::trader::{BuyOutcome, Trader};
use anyhow::Result;
use fcmarket::pricing::net_profit;
use fcmarket::{Pacing, ReferenceBook, ReferencePrice, SearchQuery, TradePileSummary};
use log::{info, warn};
use std::ops::Range;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::sleep;

pub const BUYS_PER_HOUR: usize = 30;
pub const DEFAULT_RATINGS: [i32; 2] = [83, 84];
const BUY_HOURS: Range<u8> = 0..12;
const SELL_HOURS: Range<u8> = 17..24;
const BETWEEN_BUYS: Duration = Duration::from_secs(3);
const BETWEEN_RATINGS: Duration = Duration::from_secs(2);
const SETTLE: Duration = Duration::from_secs(1);
const CYCLE: Pacing = Pacing::uniform(45.0, 90.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Buy,
    Sell,
    Relist,
}

impl Phase {
    pub fn at(hour: u8) -> Self {
        if BUY_HOURS.contains(&hour) {
            Phase::Buy
        } else if SELL_HOURS.contains(&hour) {
            Phase::Sell
        } else {
            Phase::Relist
        }
    }
}

/// Hour of day at `utc_offset` hours from UTC.
pub fn local_hour(now: OffsetDateTime, utc_offset: i8) -> u8 {
    (now.hour() as i32 + utc_offset as i32).rem_euclid(24) as u8
}

pub struct VolumeTrader {
    trader: Trader,
    targets: Vec<(i32, ReferencePrice)>,
    max_cards: usize,
    utc_offset: i8,
    tax: f64,
    bought: usize,
}

impl VolumeTrader {
    pub fn new(
        trader: Trader,
        book: &ReferenceBook,
        ratings: &[i32],
        max_cards: usize,
        utc_offset: i8,
        tax: f64,
    ) -> Self {
        let targets = ratings
            .iter()
            .filter_map(|&rating| match book.get_or_fallback(rating) {
                Some(price) => Some((rating, price)),
                None => {
                    warn!("No reference price for rating {rating}, skipping it");
                    None
                }
            })
            .collect();

        Self {
            trader,
            targets,
            max_cards,
            utc_offset,
            tax,
            bought: 0,
        }
    }

    async fn buy_phase(&mut self) -> fcmarket::Result<()> {
        for &(rating, reference) in &self.targets {
            info!("Searching {rating} at or below {}", reference.max_buy);
            let query = SearchQuery::gold_rare(rating).max_buy(reference.max_buy);
            let auctions = self.trader.http.search(&query).await?;

            for auction in auctions.iter().filter(|a| {
                a.item_data.rating == rating
                    && a.buy_now_price > 0
                    && a.buy_now_price <= reference.max_buy
            }) {
                if self.bought >= self.max_cards {
                    info!("Bought {} cards, session limit reached", self.bought);
                    return Ok(());
                }

                let outcome = self.trader.buy(auction).await?;
                let profit = net_profit(auction.buy_now_price, reference.sell_price, self.tax);
                let entry = TradeEntry::new(
                    "volume",
                    &auction.item_data.display_name(),
                    rating,
                    auction.buy_now_price,
                )
                .expecting(reference.sell_price, profit)
                .outcome(outcome.is_success(), outcome.label());
                self.trader.journal.record(entry);

                match outcome {
                    BuyOutcome::Bought { .. } | BuyOutcome::DryRun => {
                        self.bought += 1;
                        info!("{rating} at {} (profit +{profit})", auction.buy_now_price);
                        sleep(BETWEEN_BUYS).await;
                    }
                    BuyOutcome::NoBudget(_) | BuyOutcome::NoCredits { .. } => {
                        warn!("Stopping buys: {}", outcome.label());
                        return Ok(());
                    }
                    _ => {}
                }
            }

            sleep(BETWEEN_RATINGS).await;
        }
        Ok(())
    }

    async fn sell_phase(&self) -> fcmarket::Result<()> {
        self.trader.relist_expired().await?;
        sleep(SETTLE).await;

        for &(rating, reference) in &self.targets {
            let listed = self
                .trader
                .relist_purchased(reference.sell_price, Some(rating))
                .await?;
            if listed > 0 {
                info!("{listed} cards of {rating} listed at {}", reference.sell_price);
            }
        }

        let pile = self.trader.http.trade_pile().await?;
        let summary = TradePileSummary::of(&pile, self.tax);
        info!(
            "Trade pile: {} on sale, {} sold ({} after tax), {} expired",
            summary.active, summary.sold, summary.sold_value, summary.expired
        );
        Ok(())
    }

    pub async fn run(&mut self) -> Result<()> {
        for (rating, reference) in &self.targets {
            info!(
                "{rating}: buy <= {}, sell at {}",
                reference.max_buy, reference.sell_price
            );
        }

        let mut cycle = 0u64;
        loop {
            cycle += 1;
            let phase = Phase::at(local_hour(OffsetDateTime::now_utc(), self.utc_offset));
            info!("Cycle {cycle}: {phase:?} phase");

            let result = match phase {
                Phase::Buy => self.buy_phase().await,
                Phase::Sell => self.sell_phase().await,
                Phase::Relist => self.trader.relist_expired().await,
            };
            if let Err(e) = result {
                if !self.trader.recover(e).await {
                    break;
                }
            }

            sleep(CYCLE.next()).await;
        }

        info!("Volume trader stopped after buying {} cards", self.bought);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn phases_follow_the_clock() {
        assert_eq!(Phase::at(0), Phase::Buy);
        assert_eq!(Phase::at(11), Phase::Buy);
        assert_eq!(Phase::at(12), Phase::Relist);
        assert_eq!(Phase::at(16), Phase::Relist);
        assert_eq!(Phase::at(17), Phase::Sell);
        assert_eq!(Phase::at(23), Phase::Sell);
    }

    #[test]
    fn local_hour_wraps() {
        let now = datetime!(2025-12-03 22:30 UTC);
        assert_eq!(local_hour(now, 0), 22);
        assert_eq!(local_hour(now, 3), 1);
        assert_eq!(local_hour(datetime!(2025-12-03 01:00 UTC), -5), 20);
    }
}
