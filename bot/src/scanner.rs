//! Global market scanner: samples a rotating set of searches, learns prices
//! from what it sees and publishes the best deals for the follower.
use crate::config::Config;
use crate::journal::{unix_now, Target, TargetsFile, TARGET_TTL_SECS};
use anyhow::Result;
use fcmarket::schema::{SearchQuery, GOLD_RARE};
use fcmarket::{AuctionInfo, Confidence, DealRules, Error, HttpClient, Pacing, PriceHistory, PriceKey};
use futures::{pin_mut, StreamExt};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use tokio::time::sleep;

pub const SCANS_PER_HOUR: usize = 40;
const STRATEGIES_PER_RUN: usize = 5;
const PAGES_PER_STRATEGY: u32 = 3;
const TOP_TARGETS: usize = 10;
const MIN_SAMPLES: usize = 5;
const SELL_FRACTION: f64 = 0.95;
const BETWEEN_STRATEGIES: f64 = 1.5;
const SCAN_PACING: Pacing = Pacing::uniform(3.0, 7.0).with_stretch(0.1, 1.5, 3.0);

#[derive(Debug, Clone)]
pub struct ScanStrategy {
    pub name: &'static str,
    pub query: SearchQuery,
}

fn gold_rare_band(name: &'static str, rating: i32, min: u32, max: u32) -> ScanStrategy {
    ScanStrategy {
        name,
        query: SearchQuery::gold_rare(rating).bid_range(Some(min), Some(max)),
    }
}

pub fn strategies() -> Vec<ScanStrategy> {
    vec![
        gold_rare_band("Fodder 82", 82, 700, 3_000),
        gold_rare_band("Fodder 83", 83, 1_500, 5_000),
        gold_rare_band("Fodder 84", 84, 3_000, 8_000),
        gold_rare_band("Meta 85", 85, 4_000, 12_000),
        gold_rare_band("Meta 86", 86, 8_000, 20_000),
        ScanStrategy {
            name: "Hunter",
            query: SearchQuery::training("playStyle").bid_range(Some(3_000), Some(8_000)),
        },
        ScanStrategy {
            name: "Shadow",
            query: SearchQuery::training("playStyle").bid_range(Some(3_000), Some(8_000)),
        },
        ScanStrategy {
            name: "Fresh Deals",
            query: SearchQuery::players()
                .gold()
                .rare()
                .bid_range(Some(600), Some(10_000)),
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub trade_id: u64,
    pub asset_id: u64,
    pub name: String,
    pub rating: i32,
    pub buy_now: u32,
    pub average: u32,
    pub lowest_seen: Option<u32>,
    pub estimated_sell: u32,
    pub profit: i64,
    pub samples: usize,
    pub confidence: Confidence,
}

impl Opportunity {
    pub fn margin_pct(&self) -> f64 {
        (self.profit as f64 / self.buy_now as f64 * 1_000.0).round() / 10.0
    }

    fn into_target(self, now: f64) -> Target {
        Target {
            player_id: self.asset_id,
            player_name: self.name,
            max_buy_price: self.buy_now,
            target_sell_price: self.estimated_sell,
            expected_profit: self.profit,
            confidence: self.confidence,
            expires_at: now + TARGET_TTL_SECS,
            source: "global_scan".into(),
        }
    }
}

/// Records the listing's price and returns it as an opportunity when the
/// gold rare version is trading clearly below its recent average.
pub fn analyze_listing(
    history: &mut PriceHistory,
    rules: &DealRules,
    auction: &AuctionInfo,
    now: f64,
) -> Option<Opportunity> {
    let item = &auction.item_data;
    let asset_id = item.definition_id()?;
    if auction.buy_now_price == 0 {
        return None;
    }

    let key = PriceKey::new(asset_id, item.rareflag);
    history.record(key, auction.buy_now_price, now);

    // special versions only feed the history
    if item.rareflag != GOLD_RARE {
        return None;
    }

    let samples = history.sample_count(key);
    if samples < MIN_SAMPLES {
        return None;
    }

    let average = history.weighted_average(key, now)?;
    let estimated_sell = (average as f64 * SELL_FRACTION) as u32;
    let profit = rules.evaluate(auction.buy_now_price, estimated_sell)?;

    let name = match item.display_name() {
        name if name == "Unknown" => format!("ID:{asset_id}"),
        name => name,
    };

    Some(Opportunity {
        trade_id: auction.trade_id,
        asset_id,
        name,
        rating: item.rating,
        buy_now: auction.buy_now_price,
        average,
        lowest_seen: history.lowest_seen(key, now),
        estimated_sell,
        profit,
        samples,
        confidence: Confidence::of(profit, samples),
    })
}

/// Best opportunities first, at most [`TOP_TARGETS`], as follower targets.
pub fn top_targets(mut opportunities: Vec<Opportunity>, now: f64) -> Vec<Target> {
    opportunities.sort_by(|a, b| b.profit.cmp(&a.profit));
    opportunities
        .into_iter()
        .take(TOP_TARGETS)
        .map(|o| o.into_target(now))
        .collect()
}

pub struct Scanner {
    http: HttpClient,
    history: PriceHistory,
    rules: DealRules,
    price_cache_file: PathBuf,
    targets_file: PathBuf,
    scan_count: u64,
}

impl Scanner {
    pub fn new(http: HttpClient, config: &Config) -> Self {
        let history = PriceHistory::load(&config.price_cache_file);
        info!("Loaded price history for {} card versions", history.len());

        Self {
            http,
            history,
            rules: config.deal_rules(),
            price_cache_file: config.price_cache_file.clone(),
            targets_file: config.targets_file.clone(),
            scan_count: 0,
        }
    }

    async fn scan_strategy(&mut self, strategy: &ScanStrategy) -> Result<Vec<Opportunity>, Error> {
        info!("Scanning {} ({})", strategy.name, strategy.query.kind);
        let mut found = Vec::new();

        let http = self.http.clone();
        let pages = http.search_pages(strategy.query.clone(), PAGES_PER_STRATEGY);
        pin_mut!(pages);

        let mut page = 0;
        while let Some(result) = pages.next().await {
            page += 1;
            self.scan_count += 1;

            let auctions = result?;
            debug!("{} page {page}: {} listings", strategy.name, auctions.len());

            let now = unix_now();
            for auction in &auctions {
                if let Some(opp) = analyze_listing(&mut self.history, &self.rules, auction, now) {
                    info!(
                        "Deal: {} ({}) at {} | avg {} low {} | profit +{} ({}%) [{}]",
                        opp.name,
                        opp.rating,
                        opp.buy_now,
                        opp.average,
                        opp.lowest_seen.unwrap_or(opp.buy_now),
                        opp.profit,
                        opp.margin_pct(),
                        opp.confidence
                    );
                    found.push(opp);
                }
            }

            if page < PAGES_PER_STRATEGY {
                sleep(SCAN_PACING.next()).await;
            }
        }

        Ok(found)
    }

    /// One full scan. Stops early when the hourly search budget runs out.
    pub async fn run_scan(&mut self) -> Result<usize> {
        let mut selected = strategies();
        selected.shuffle(&mut rand::thread_rng());
        selected.truncate(STRATEGIES_PER_RUN);

        let mut opportunities = Vec::new();
        for strategy in &selected {
            match self.scan_strategy(strategy).await {
                Ok(found) => opportunities.extend(found),
                Err(e) if e.is_fatal() => {
                    self.save_history();
                    return Err(e.into());
                }
                Err(e @ Error::BudgetExhausted(..)) => {
                    warn!("{e}");
                    break;
                }
                Err(e) => error!("Scan of {} failed: {e}", strategy.name),
            }

            sleep(SCAN_PACING.scaled(BETWEEN_STRATEGIES)).await;
        }

        let count = opportunities.len();
        let targets = top_targets(opportunities, unix_now());
        TargetsFile::new(self.scan_count, targets.clone()).save(&self.targets_file)?;
        info!(
            "Saved {} targets to {}",
            targets.len(),
            self.targets_file.display()
        );
        self.save_history();

        match self.http.search_budget() {
            Some((used, limit)) => info!(
                "{count} opportunities | {} requests this session | {used}/{limit} this hour",
                self.scan_count
            ),
            None => info!("{count} opportunities | {} requests this session", self.scan_count),
        }

        Ok(count)
    }

    pub fn save_history(&mut self) {
        if let Err(e) = self.history.save(&self.price_cache_file, unix_now()) {
            error!("Failed to save price cache: {e}");
        }
    }
}
