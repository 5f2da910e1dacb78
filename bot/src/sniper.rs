//! Rating-based sniping against reference prices.
//!
//! `snipe` works one rating with the reference buy/sell prices and relists
//! whatever it bought in bulk. `anomaly` sweeps a range of ratings looking
//! for listings far below the reference price and relists each buy at once.
use crate::journal::TradeEntry;
use crate::trader::{BuyOutcome, Trader};
use anyhow::Result;
use fcmarket::notify::SnipeAlert;
use fcmarket::pacing::gaussian;
use fcmarket::pricing::{anomaly_threshold, discount_pct, net_profit};
use fcmarket::schema::GOLD_RARE;
use fcmarket::{AuctionInfo, Pacing, ReferenceBook, ReferencePrice, SearchQuery};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::sleep;

pub const SNIPE_SCANS_PER_HOUR: usize = 300;
pub const SNIPE_BUYS_PER_HOUR: usize = 30;
const SNIPE_ATTEMPTS: usize = 3;
const SNIPE_PACING: Pacing = Pacing::uniform(8.0, 18.0).with_pause(0.2, 5.0, 20.0);
const SNIPE_POST_BUY: Pacing = Pacing::uniform(15.0, 40.0);

pub const ANOMALY_RATINGS: std::ops::RangeInclusive<i32> = 83..=90;
const ANOMALY_FRACTION: f64 = 0.85;
const MAX_PRICE_PER_CARD: u32 = 30_000;
const MAX_PURCHASES_PER_CYCLE: usize = 3;
const CYCLE_PAUSE_SECS: f64 = 8.0;
const SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Snipe {
    pub auction: AuctionInfo,
    pub profit: i64,
}

/// Gold rare listings of exactly `rating` that resell at a profit.
/// The market doesn't always honour the search filters, so they are
/// checked again here.
pub fn find_snipes(
    auctions: Vec<AuctionInfo>,
    rating: i32,
    reference: &ReferencePrice,
    tax: f64,
) -> Vec<Snipe> {
    let mut snipes: Vec<Snipe> = auctions
        .into_iter()
        .filter(|a| a.item_data.rareflag == GOLD_RARE && a.item_data.rating == rating)
        .filter(|a| a.buy_now_price > 0 && a.buy_now_price <= reference.max_buy)
        .filter_map(|auction| {
            let profit = net_profit(auction.buy_now_price, reference.sell_price, tax);
            (profit >= reference.min_profit as i64).then_some(Snipe { auction, profit })
        })
        .collect();

    snipes.sort_by(|a, b| b.profit.cmp(&a.profit));
    snipes
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub auction: AuctionInfo,
    pub reference: u32,
    pub discount: f64,
}

pub fn find_anomalies(
    auctions: Vec<AuctionInfo>,
    rating: i32,
    reference: u32,
    threshold: u32,
) -> Vec<Anomaly> {
    auctions
        .into_iter()
        .filter(|a| a.item_data.rating == rating)
        .filter(|a| a.buy_now_price > 0 && a.buy_now_price <= threshold)
        .map(|auction| Anomaly {
            discount: discount_pct(auction.buy_now_price, reference),
            auction,
            reference,
        })
        .collect()
}

fn by_discount(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| b.discount.total_cmp(&a.discount));
}

pub struct Sniper {
    trader: Trader,
    tax: f64,
    bought: usize,
    listed: usize,
}

impl Sniper {
    pub fn new(trader: Trader, tax: f64) -> Self {
        Self {
            trader,
            tax,
            bought: 0,
            listed: 0,
        }
    }

    async fn snipe_cycle(&mut self, rating: i32, reference: &ReferencePrice) -> fcmarket::Result<()> {
        if let Some(wait) = self.trader.buy_wait().await {
            info!("Hourly buy limit reached, next slot in {}s", wait.as_secs());
            return Ok(());
        }

        let query = SearchQuery::gold_rare(rating).max_buy(reference.max_buy);
        let auctions = self.trader.http.search(&query).await?;
        let snipes = find_snipes(auctions, rating, reference, self.tax);
        if snipes.is_empty() {
            return Ok(());
        }
        info!("{} snipes found", snipes.len());

        for snipe in snipes.iter().take(SNIPE_ATTEMPTS) {
            let auction = &snipe.auction;
            let name = auction.item_data.display_name();
            info!(
                "Trying {name} ({rating}) at {} (profit +{})",
                auction.buy_now_price, snipe.profit
            );

            let outcome = self.trader.buy(auction).await?;
            let entry = TradeEntry::new("snipe", &name, rating, auction.buy_now_price)
                .expecting(reference.sell_price, snipe.profit);
            self.trader
                .journal
                .record(entry.outcome(outcome.is_success(), outcome.label()));

            if outcome.is_success() {
                self.bought += 1;
                let pause = SNIPE_POST_BUY.next();
                info!("Pausing {:.0}s before relisting", pause.as_secs_f64());
                sleep(pause).await;

                let listed = self
                    .trader
                    .relist_purchased(reference.sell_price, Some(rating))
                    .await?;
                self.listed += listed;
                if listed > 0 {
                    info!("{listed} cards listed for {}", reference.sell_price);
                }
                return Ok(());
            }
            warn!("{name}: {}", outcome.label());
        }

        Ok(())
    }

    /// Snipes one rating for `cycles` cycles or until the session expires.
    pub async fn run_snipe(&mut self, rating: i32, reference: ReferencePrice, cycles: u32) -> Result<()> {
        info!(
            "Sniping {rating}: buy <= {}, sell at {}, min profit {}",
            reference.max_buy, reference.sell_price, reference.min_profit
        );

        for cycle in 1..=cycles {
            debug!("Cycle {cycle}/{cycles}");
            if let Err(e) = self.snipe_cycle(rating, &reference).await {
                if !self.trader.recover(e).await {
                    break;
                }
            }
            sleep(SNIPE_PACING.next()).await;
        }

        info!("Sniper done: {} bought, {} listed", self.bought, self.listed);
        Ok(())
    }

    async fn scan_anomalies(&mut self, book: &ReferenceBook) -> fcmarket::Result<Vec<Anomaly>> {
        let mut anomalies = Vec::new();

        for rating in ANOMALY_RATINGS {
            let Some(reference) = book.get_or_fallback(rating).map(|p| p.sell_price) else {
                continue;
            };
            let Some(threshold) = anomaly_threshold(reference, rating, ANOMALY_FRACTION) else {
                debug!("Skipping {rating}: threshold at or below the market floor");
                continue;
            };

            let max_price = threshold.min(MAX_PRICE_PER_CARD);
            let query = SearchQuery::gold_rare(rating).max_buy(max_price);
            let auctions = self.trader.http.search(&query).await?;
            anomalies.extend(find_anomalies(auctions, rating, reference, max_price));

            let delay = gaussian(&mut rand::thread_rng(), 2.0, 4.0);
            sleep(delay).await;
        }

        by_discount(&mut anomalies);
        Ok(anomalies)
    }

    async fn process_anomaly(&mut self, anomaly: &Anomaly) -> fcmarket::Result<bool> {
        let auction = &anomaly.auction;
        let name = auction.item_data.display_name();
        let rating = auction.item_data.rating;
        let profit = net_profit(auction.buy_now_price, anomaly.reference, self.tax);
        info!(
            "Anomaly: {name} ({rating}) at {} vs {} (-{}%)",
            auction.buy_now_price, anomaly.reference, anomaly.discount
        );

        let outcome = self.trader.buy(auction).await?;
        let entry = TradeEntry::new("anomaly", &name, rating, auction.buy_now_price)
            .expecting(anomaly.reference, profit)
            .outcome(outcome.is_success(), outcome.label());
        self.trader.journal.record(entry);

        let item_id = match outcome {
            BuyOutcome::Bought { item_id } => item_id,
            BuyOutcome::DryRun => Some(auction.item_data.id),
            other => {
                warn!("{name}: {}", other.label());
                return Ok(false);
            }
        };
        self.bought += 1;

        self.trader
            .alerts
            .snipe(&SnipeAlert {
                name: name.clone(),
                rating,
                buy_price: auction.buy_now_price,
                reference_price: anomaly.reference,
                estimated_profit: profit,
            })
            .await;

        sleep(SETTLE).await;
        match item_id {
            Some(item_id) => {
                self.trader.relist_item(item_id, anomaly.reference).await?;
                self.listed += 1;
            }
            None => warn!("No item id for {name}, relist it manually"),
        }
        Ok(true)
    }

    /// Sweeps the anomaly ratings until the session expires.
    pub async fn run_anomaly(&mut self, book: ReferenceBook) -> Result<()> {
        for rating in ANOMALY_RATINGS {
            if let Some(threshold) = book
                .get_or_fallback(rating)
                .and_then(|p| anomaly_threshold(p.sell_price, rating, ANOMALY_FRACTION))
            {
                info!("Rating {rating}: buying at or below {threshold}");
            }
        }

        loop {
            match self.scan_anomalies(&book).await {
                Ok(anomalies) => {
                    if !anomalies.is_empty() {
                        info!("{} anomalies found", anomalies.len());
                    }

                    let mut purchases = 0;
                    for anomaly in &anomalies {
                        if purchases >= MAX_PURCHASES_PER_CYCLE {
                            info!("Max {MAX_PURCHASES_PER_CYCLE} purchases this cycle");
                            break;
                        }
                        match self.process_anomaly(anomaly).await {
                            Ok(true) => purchases += 1,
                            Ok(false) => {}
                            Err(e) => {
                                if !self.trader.recover(e).await {
                                    return self.finish();
                                }
                            }
                        }
                        let delay = gaussian(&mut rand::thread_rng(), 1.0, 2.0);
                        sleep(delay).await;
                    }
                }
                Err(e) => {
                    if !self.trader.recover(e).await {
                        return self.finish();
                    }
                }
            }

            let pause = gaussian(
                &mut rand::thread_rng(),
                CYCLE_PAUSE_SECS * 0.8,
                CYCLE_PAUSE_SECS * 1.2,
            );
            sleep(pause).await;
        }
    }

    fn finish(&self) -> Result<()> {
        info!("Sniper stopped: {} bought, {} listed", self.bought, self.listed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcmarket::ItemData;

    fn listing(trade_id: u64, price: u32, rating: i32, rareflag: i32) -> AuctionInfo {
        AuctionInfo {
            trade_id,
            buy_now_price: price,
            item_data: ItemData {
                id: trade_id * 10,
                rating,
                rareflag,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn snipes_are_filtered_and_ranked() {
        let reference = ReferencePrice::new(1_900, 2_500, 300);
        let auctions = vec![
            listing(1, 1_800, 84, 1),
            listing(2, 1_500, 84, 1),
            listing(3, 1_000, 84, 3),  // special version
            listing(4, 1_000, 85, 1),  // wrong rating
            listing(5, 2_000, 84, 1),  // above max buy
            listing(6, 0, 84, 1),      // no buy now
            listing(7, 1_900, 84, 1),  // 2375 - 1900 = 475
        ];

        let snipes = find_snipes(auctions, 84, &reference, 0.05);
        let ids: Vec<u64> = snipes.iter().map(|s| s.auction.trade_id).collect();
        assert_eq!(ids, vec![2, 1, 7]);
        assert_eq!(snipes[0].profit, 875);
    }

    #[test]
    fn snipes_need_min_profit() {
        let reference = ReferencePrice::new(1_900, 2_500, 500);
        let snipes = find_snipes(vec![listing(1, 1_900, 84, 1)], 84, &reference, 0.05);
        assert!(snipes.is_empty());
    }

    #[test]
    fn anomalies_sorted_by_discount() {
        let auctions = vec![
            listing(1, 2_100, 84, 1),
            listing(2, 1_500, 84, 1),
            listing(3, 2_200, 84, 1), // above threshold
            listing(4, 1_000, 83, 1), // wrong rating
        ];

        let mut anomalies = find_anomalies(auctions, 84, 2_500, 2_125);
        by_discount(&mut anomalies);

        let ids: Vec<u64> = anomalies.iter().map(|a| a.auction.trade_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(anomalies[0].discount, 40.0);
        assert_eq!(anomalies[1].discount, 16.0);
    }
}
