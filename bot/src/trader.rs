use crate::config::Config;
use crate::journal::Journal;
use fcmarket::pricing::listing_prices;
use fcmarket::schema::ItemData;
use fcmarket::{
    AlertClient, AuctionInfo, Error, HttpClient, Listing, Pacing, RateLimiter, Result, Session,
};
use log::{error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const RATE_LIMIT_COOL_DOWN: Pacing = Pacing::uniform(60.0, 120.0);
const MAX_BUDGET_WAIT: Duration = Duration::from_secs(300);
const BETWEEN_RELISTS: Pacing = Pacing::uniform(2.0, 5.0);
const PILE_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyOutcome {
    Bought { item_id: Option<u64> },
    DryRun,
    /// Sold, outbid or the pile is full.
    Unavailable,
    Invalid,
    NoBudget(Duration),
    NoCredits { balance: u64 },
}

impl BuyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuyOutcome::Bought { .. } | BuyOutcome::DryRun)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BuyOutcome::Bought { .. } => "bought",
            BuyOutcome::DryRun => "dry_run",
            BuyOutcome::Unavailable => "unavailable",
            BuyOutcome::Invalid => "invalid",
            BuyOutcome::NoBudget(_) => "no_budget",
            BuyOutcome::NoCredits { .. } => "no_credits",
        }
    }
}

/// What a loop should do after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    CoolDown(Duration),
    Stop,
}

pub fn triage(e: &Error, rng: &mut impl Rng) -> Flow {
    match e {
        e if e.is_fatal() => Flow::Stop,
        Error::RateLimited(_) => Flow::CoolDown(RATE_LIMIT_COOL_DOWN.sample(rng)),
        Error::BudgetExhausted(_, wait) => Flow::CoolDown((*wait).min(MAX_BUDGET_WAIT)),
        _ => Flow::Continue,
    }
}

/// Shared buy and relist execution for every run mode.
#[derive(Clone)]
pub struct Trader {
    pub http: HttpClient,
    pub alerts: AlertClient,
    pub journal: Journal,
    buys: Arc<Mutex<RateLimiter>>,
    credits: Arc<Mutex<Option<u64>>>,
    dry_run: bool,
}

impl Trader {
    pub fn new(
        config: &Config,
        session: &Session,
        scans_per_hour: Option<usize>,
        buys_per_hour: usize,
        dry_run: bool,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(session, config.client_options(scans_per_hour))?,
            alerts: AlertClient::new(config.discord_webhook.clone()),
            journal: Journal::new(&config.trade_log_file),
            buys: Arc::new(Mutex::new(RateLimiter::per_hour(
                config.buys_per_hour(buys_per_hour),
            ))),
            credits: Arc::new(Mutex::new(None)),
            dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn refresh_credits(&self) -> Result<u64> {
        let credits = self.http.credits().await?;
        *self.credits.lock().await = Some(credits);
        Ok(credits)
    }

    /// Time until the next buy is allowed, if the hourly budget is used up.
    pub async fn buy_wait(&self) -> Option<Duration> {
        self.buys.lock().await.peek(Instant::now())
    }

    pub async fn buys_this_hour(&self) -> (usize, usize) {
        let buys = self.buys.lock().await;
        (buys.used(Instant::now()), buys.limit())
    }

    pub async fn buy(&self, auction: &AuctionInfo) -> Result<BuyOutcome> {
        let price = auction.buy_now_price;

        if let Some(wait) = self.buy_wait().await {
            return Ok(BuyOutcome::NoBudget(wait));
        }
        if let Some(balance) = *self.credits.lock().await {
            if (price as u64) > balance {
                return Ok(BuyOutcome::NoCredits { balance });
            }
        }

        if self.dry_run {
            info!(
                "[dry run] Would bid {price} on {} (trade {})",
                auction.item_data.display_name(),
                auction.trade_id
            );
            self.buys.lock().await.check_and_update(Instant::now());
            return Ok(BuyOutcome::DryRun);
        }

        match self.http.bid(auction.trade_id, price).await {
            Ok(response) => {
                self.buys.lock().await.check_and_update(Instant::now());
                if let Some(credits) = response.credits {
                    *self.credits.lock().await = Some(credits);
                }
                info!(
                    "Bought {} for {price} (trade {})",
                    auction.item_data.display_name(),
                    auction.trade_id
                );
                Ok(BuyOutcome::Bought {
                    item_id: response.item_id().or(Some(auction.item_data.id).filter(|&id| id != 0)),
                })
            }
            Err(Error::ItemUnavailable(_)) => Ok(BuyOutcome::Unavailable),
            Err(Error::InvalidTrade) => Ok(BuyOutcome::Invalid),
            Err(e) => Err(e),
        }
    }

    /// Moves an owned item to the trade pile and lists it around `sell_price`.
    pub async fn relist_item(&self, item_id: u64, sell_price: u32) -> Result<()> {
        let (start, buy_now) = listing_prices(sell_price);
        if self.dry_run {
            info!("[dry run] Would list {item_id} at {start}/{buy_now}");
            return Ok(());
        }

        self.http.move_to_trade_pile(item_id).await?;
        sleep(PILE_SETTLE).await;
        self.http
            .list_item(&Listing::new(item_id, start, buy_now))
            .await?;

        info!("Listed {item_id} at {start}/{buy_now}");
        Ok(())
    }

    /// Puts expired trade pile items back on the market.
    pub async fn relist_expired(&self) -> Result<()> {
        if self.dry_run {
            info!("[dry run] Would relist expired items");
            return Ok(());
        }
        self.http.relist_expired().await?;
        info!("Relisted expired items");
        Ok(())
    }

    /// Lists every unassigned item (optionally of one rating) at `sell_price`.
    pub async fn relist_purchased(&self, sell_price: u32, rating: Option<i32>) -> Result<usize> {
        let items = self.http.purchased_items().await?;
        let items: Vec<&ItemData> = items
            .iter()
            .filter(|item| rating.map_or(true, |r| item.rating == r))
            .collect();

        let mut listed = 0;
        for (i, item) in items.iter().enumerate() {
            match self.relist_item(item.id, sell_price).await {
                Ok(()) => listed += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!("Failed to relist {}: {e}", item.id),
            }
            if i + 1 < items.len() {
                sleep(BETWEEN_RELISTS.next()).await;
            }
        }

        Ok(listed)
    }

    /// Logs `e` and waits as needed. Returns `false` when the loop should stop.
    pub async fn recover(&self, e: Error) -> bool {
        let flow = triage(&e, &mut rand::thread_rng());
        match flow {
            Flow::Stop => {
                error!("{e}");
                if matches!(e, Error::SessionExpired) {
                    self.alerts.session_expired().await;
                }
                false
            }
            Flow::CoolDown(wait) => {
                warn!("{e}. Cooling down for {}s", wait.as_secs());
                sleep(wait).await;
                true
            }
            Flow::Continue => {
                error!("{e}");
                true
            }
        }
    }
}
