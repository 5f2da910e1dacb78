use crate::journal::TradeEntry;
use crate::trader::{BuyOutcome, Trader};
use anyhow::{bail, Result};
use fcmarket::notify::{ScanReport, TradeReport};
use fcmarket::{AuctionInfo, Error, GatewayReporter, Pacing, SearchQuery, TradeCache};
use log::{info, warn};
use std::time::{Duration, Instant};
use tokio::time::sleep;

pub const BUYS_PER_HOUR: usize = 20;
const TRADE_TTL: Duration = Duration::from_secs(300);
const MIN_EXPIRES: i64 = 2;
const BREAK_EVERY: u64 = 30;
const BREAK: Pacing = Pacing::uniform(15.0, 45.0);
const POST_BUY: Pacing = Pacing::uniform(5.0, 15.0);
const CYCLE: Pacing = Pacing::uniform(3.0, 7.0);
const MIN_BUDGET_WAIT: Duration = Duration::from_secs(60);

/// Listings worth bidding on: unseen, not about to expire and within budget.
/// Every listing is marked as seen.
pub fn fresh_listings<'a>(
    auctions: &'a [AuctionInfo],
    seen: &mut TradeCache,
    max_buy: u32,
    now: Instant,
) -> Vec<&'a AuctionInfo> {
    auctions
        .iter()
        .filter(|a| seen.check_and_insert(a.trade_id, now))
        .filter(|a| {
            if a.expires < MIN_EXPIRES {
                info!("Trade {} expires too soon ({}s)", a.trade_id, a.expires);
                return false;
            }
            a.buy_now_price > 0 && a.buy_now_price <= max_buy
        })
        .collect()
}

fn result_label(result: &std::result::Result<BuyOutcome, Error>) -> String {
    match result {
        Ok(BuyOutcome::Bought { .. }) => "SUCCESS".into(),
        Ok(BuyOutcome::DryRun) => "DRY_RUN".into(),
        Ok(BuyOutcome::Unavailable) => "OUTBID".into(),
        Ok(BuyOutcome::Invalid) => "INVALID".into(),
        Ok(other) => other.label().to_uppercase(),
        Err(Error::Status(status, _)) => format!("HTTP_{}", status.as_u16()),
        Err(_) => "ERROR".into(),
    }
}

pub struct Worker {
    trader: Trader,
    gateway: GatewayReporter,
    worker_id: String,
    player_id: u64,
    max_buy: u32,
    seen: TradeCache,
    searches: u64,
}

impl Worker {
    pub fn new(
        trader: Trader,
        gateway: GatewayReporter,
        worker_id: String,
        player_id: u64,
        max_buy: u32,
    ) -> Self {
        Self {
            trader,
            gateway,
            worker_id,
            player_id,
            max_buy,
            seen: TradeCache::new(TRADE_TTL),
            searches: 0,
        }
    }

    async fn bid(&self, auction: &AuctionInfo) -> fcmarket::Result<bool> {
        let started = Instant::now();
        let result = self.trader.buy(auction).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        self.gateway.trade(&TradeReport {
            worker_id: self.worker_id.clone(),
            trade_id: auction.trade_id,
            action: "BID".into(),
            price: auction.buy_now_price,
            result: result_label(&result),
            latency_ms,
        });

        let outcome = result?;
        let entry = TradeEntry::new(
            "worker",
            &auction.item_data.display_name(),
            auction.item_data.rating,
            auction.buy_now_price,
        )
        .outcome(outcome.is_success(), outcome.label());
        self.trader.journal.record(entry);

        if outcome.is_success() {
            info!("Bid {} on {} ({latency_ms}ms)", auction.buy_now_price, auction.trade_id);
        } else {
            warn!("Bid on {} failed: {}", auction.trade_id, outcome.label());
        }
        Ok(outcome.is_success())
    }

    async fn routine(&mut self) -> fcmarket::Result<()> {
        if let Some(wait) = self.trader.buy_wait().await {
            let wait = wait.max(MIN_BUDGET_WAIT);
            info!("Hourly buy limit reached, pausing {}s", wait.as_secs());
            sleep(wait).await;
            return Ok(());
        }

        self.searches += 1;
        if self.searches % BREAK_EVERY == 0 {
            let pause = BREAK.next();
            info!("Taking a {:.0}s break after {} searches", pause.as_secs_f64(), self.searches);
            sleep(pause).await;
        }

        let query = SearchQuery::players()
            .definition(self.player_id)
            .max_buy(self.max_buy);
        let auctions = self.trader.http.search(&query).await?;

        for auction in &auctions {
            self.gateway.scan(&ScanReport {
                worker_id: self.worker_id.clone(),
                player_id: self.player_id,
                price: auction.buy_now_price,
                trade_id: auction.trade_id,
                expires: auction.expires,
            });
        }

        let candidates = fresh_listings(&auctions, &mut self.seen, self.max_buy, Instant::now());
        for auction in candidates {
            info!(
                "Opportunity: trade {} at {} ({}s left)",
                auction.trade_id, auction.buy_now_price, auction.expires
            );
            if self.bid(auction).await? {
                let (used, limit) = self.trader.buys_this_hour().await;
                let pause = POST_BUY.next();
                info!("Pausing {:.0}s after buy ({used}/{limit} this hour)", pause.as_secs_f64());
                sleep(pause).await;
            }
        }

        Ok(())
    }

    pub async fn run(&mut self, skip_validation: bool) -> Result<()> {
        if skip_validation {
            warn!("Skipping token validation");
        } else if let Err(e) = self.trader.http.validate().await {
            bail!("Token validation failed, run `bot token` first: {e}");
        }

        if !self.gateway.is_enabled() {
            info!("GATEWAY_URL not set, metrics are not reported");
        }
        info!(
            "Worker {} targeting {} at or below {} (dry run: {})",
            self.worker_id,
            self.player_id,
            self.max_buy,
            self.trader.is_dry_run()
        );

        loop {
            if let Err(e) = self.routine().await {
                if !self.trader.recover(e).await {
                    break;
                }
            }
            sleep(CYCLE.next()).await;
        }

        Ok(())
    }
}
