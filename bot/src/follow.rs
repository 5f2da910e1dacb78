use crate::journal::{unix_now, Target, TargetsFile, TradeEntry};
use crate::trader::{BuyOutcome, Trader};
use anyhow::Result;
use fcmarket::pacing::around;
use fcmarket::{AuctionInfo, Pacing, SearchQuery};
use log::{info, warn};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

pub const BUYS_PER_HOUR: usize = 8;
const POST_BUY_PAUSE: Pacing = Pacing::uniform(20.0, 45.0);
const IDLE_WAIT: Duration = Duration::from_secs(5);
const MAX_BUDGET_WAIT: Duration = Duration::from_secs(300);

fn cycle_delay() -> Duration {
    around(&mut rand::thread_rng(), 15.0, 3.0, 5.0)
}

/// Cheapest buy-now listing at or below the target's price.
pub fn cheapest_within(auctions: &[AuctionInfo], max_buy: u32) -> Option<&AuctionInfo> {
    auctions
        .iter()
        .filter(|a| a.buy_now_price > 0 && a.buy_now_price <= max_buy)
        .min_by_key(|a| a.buy_now_price)
}

pub struct Follower {
    trader: Trader,
    targets_file: PathBuf,
    bought: usize,
    spent: u64,
}

impl Follower {
    pub fn new(trader: Trader, targets_file: PathBuf) -> Self {
        Self {
            trader,
            targets_file,
            bought: 0,
            spent: 0,
        }
    }

    async fn snipe_target(&mut self, target: &Target) -> fcmarket::Result<bool> {
        let query = SearchQuery::players()
            .definition(target.player_id)
            .max_buy(target.max_buy_price);
        let auctions = self.trader.http.search(&query).await?;

        let Some(best) = cheapest_within(&auctions, target.max_buy_price) else {
            info!(
                "{} under {}: nothing found",
                target.player_name, target.max_buy_price
            );
            return Ok(false);
        };

        info!(
            "Found {} at {} (max {})",
            target.player_name, best.buy_now_price, target.max_buy_price
        );
        let outcome = self.trader.buy(best).await?;
        let entry = TradeEntry::new("follow", &target.player_name, best.item_data.rating, best.buy_now_price)
            .expecting(target.target_sell_price, target.expected_profit);

        match outcome {
            BuyOutcome::Bought { .. } | BuyOutcome::DryRun => {
                self.bought += 1;
                self.spent += best.buy_now_price as u64;
                self.trader.journal.record(entry.outcome(true, outcome.label()));
                Ok(true)
            }
            BuyOutcome::NoBudget(_) | BuyOutcome::NoCredits { .. } => {
                warn!("Skipping buy: {}", outcome.label());
                Ok(false)
            }
            _ => {
                self.trader.journal.record(entry.outcome(false, outcome.label()));
                Ok(false)
            }
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Following targets from {}", self.targets_file.display());

        loop {
            let targets = TargetsFile::load(&self.targets_file).valid_targets(unix_now());
            if targets.is_empty() {
                info!("No valid targets, waiting for the scanner");
                sleep(IDLE_WAIT).await;
                continue;
            }

            if let Some(wait) = self.trader.buy_wait().await {
                let wait = wait.min(MAX_BUDGET_WAIT);
                info!("Hourly buy limit reached, pausing {}s", wait.as_secs());
                sleep(wait).await;
                continue;
            }

            let target = targets.choose(&mut rand::thread_rng()).cloned();
            if let Some(target) = target {
                match self.snipe_target(&target).await {
                    Ok(true) => {
                        let (used, limit) = self.trader.buys_this_hour().await;
                        let pause = POST_BUY_PAUSE.next();
                        info!(
                            "Pausing {:.0}s after buy ({used}/{limit} this hour, {} total for {} credits)",
                            pause.as_secs_f64(),
                            self.bought,
                            self.spent
                        );
                        sleep(pause).await;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        if !self.trader.recover(e).await {
                            break;
                        }
                    }
                }
            }

            sleep(cycle_delay()).await;
        }

        info!("Follower stopped after {} buys", self.bought);
        Ok(())
    }
}
