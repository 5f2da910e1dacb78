mod config;
mod follow;
mod journal;
mod scanner;
mod scheduler;
mod sniper;
mod trader;
mod volume;
mod worker;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use fcmarket::price_feed::DEFAULT_FEED_URL;
use fcmarket::reference::parse_price;
use fcmarket::{
    GatewayReporter, HttpClient, PriceFeed, ReferenceBook, Session, TradePileSummary,
};
use log::{info, warn};
use scanner::Scanner;
use scheduler::Scheduler;
use sniper::Sniper;
use trader::Trader;

#[derive(Parser)]
#[command(name = "bot")]
#[command(about = "Transfer market trading bot")]
struct Cli {
    /// Search and log, but never bid or list
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the market and publish the best deals as targets
    Scan {
        /// Run a single scan and exit
        #[arg(long)]
        once: bool,

        /// Minutes between scans
        #[arg(short, long, default_value_t = 5)]
        interval: u32,
    },

    /// Buy the targets published by `scan`
    Follow,

    /// Snipe one rating against its reference prices
    Snipe {
        rating: i32,

        #[arg(short, long, default_value_t = 500)]
        cycles: u32,
    },

    /// Sweep ratings 83-90 for listings far below the reference price
    Anomaly,

    /// Buy fodder overnight and sell it in the evening
    Volume {
        #[arg(long, num_args = 1.., default_values_t = volume::DEFAULT_RATINGS)]
        ratings: Vec<i32>,

        /// Cards to buy before the buy phase stops for the session
        #[arg(long, default_value_t = 50)]
        max_cards: usize,

        /// Hours from UTC used to pick the phase
        #[arg(long, env = "UTC_OFFSET_HOURS", default_value_t = 0, allow_negative_numbers = true)]
        utc_offset: i8,
    },

    /// Snipe a single player
    Worker {
        #[arg(long, env = "TARGET_PLAYER_ID", default_value_t = 239_085)]
        player_id: u64,

        #[arg(long, env = "MAX_BUY_PRICE", default_value_t = 15_000)]
        max_buy: u32,
    },

    /// Save a session token copied from the web app
    Token {
        token: String,

        #[arg(long)]
        nucleus_id: Option<String>,
    },

    /// Check that the saved session works
    Check,

    /// Relist expired cards and report what sold
    Pile,

    /// Build the reference file from the price site's cheapest-by-rating page
    Prices {
        /// Credits kept below break-even
        #[arg(long, default_value_t = 200)]
        margin: u32,

        #[arg(long, env = "PRICE_FEED_URL", default_value = DEFAULT_FEED_URL)]
        url: String,
    },

    /// Build the reference file from `rating=price` pairs, e.g. `84=2.5K`
    Targets {
        #[arg(required = true)]
        prices: Vec<String>,

        /// Credits kept below break-even
        #[arg(long, default_value_t = 200)]
        margin: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    common::setup_env();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    config.dry_run |= cli.dry_run;

    match cli.command {
        Commands::Scan { once, interval } => scan(&config, once, interval).await,
        Commands::Follow => follow(&config).await,
        Commands::Snipe { rating, cycles } => snipe(&config, rating, cycles).await,
        Commands::Anomaly => anomaly(&config).await,
        Commands::Volume {
            ratings,
            max_cards,
            utc_offset,
        } => volume(&config, &ratings, max_cards, utc_offset).await,
        Commands::Worker { player_id, max_buy } => worker(&config, player_id, max_buy).await,
        Commands::Token { token, nucleus_id } => save_token(&config, &token, nucleus_id),
        Commands::Check => check(&config).await,
        Commands::Pile => pile(&config).await,
        Commands::Prices { margin, url } => prices(&config, &url, margin).await,
        Commands::Targets { prices, margin } => targets(&config, &prices, margin),
    }
}

fn load_session(config: &Config) -> Result<Session> {
    let session = Session::load(&config.session_file)
        .context("No usable session, run `bot token <TOKEN>` first")?;
    info!("Session {}", session.masked_token());
    Ok(session)
}

fn load_reference(config: &Config) -> Result<ReferenceBook> {
    match ReferenceBook::load(&config.reference_file)? {
        Some(book) => {
            info!(
                "Loaded {} reference prices from {}",
                book.len(),
                config.reference_file.display()
            );
            Ok(book)
        }
        None => {
            warn!(
                "No reference file at {}, using built-in prices",
                config.reference_file.display()
            );
            Ok(ReferenceBook::default())
        }
    }
}

async fn start_trader(
    config: &Config,
    mode: &str,
    scans_per_hour: Option<usize>,
    buys_per_hour: usize,
) -> Result<Trader> {
    let session = load_session(config)?;
    let trader = Trader::new(config, &session, scans_per_hour, buys_per_hour, config.dry_run)?;

    match trader.refresh_credits().await {
        Ok(credits) => info!("Credits: {credits}"),
        Err(e) if e.is_fatal() => {
            trader.alerts.session_expired().await;
            return Err(e.into());
        }
        Err(e) => warn!("Couldn't read credits: {e}"),
    }

    if trader.alerts.is_enabled() {
        trader.alerts.bot_started(mode, config.dry_run).await;
    }
    Ok(trader)
}

async fn scan(config: &Config, once: bool, interval: u32) -> Result<()> {
    let session = load_session(config)?;
    let http = HttpClient::new(&session, config.client_options(Some(scanner::SCANS_PER_HOUR)))?;
    let mut scanner = Scanner::new(http, config);

    if once {
        scanner.run_scan().await?;
        return Ok(());
    }

    Scheduler::new(scanner).await?.start(interval.max(1)).await
}

async fn follow(config: &Config) -> Result<()> {
    let trader = start_trader(config, "follow", None, follow::BUYS_PER_HOUR).await?;
    follow::Follower::new(trader, config.targets_file.clone())
        .run()
        .await
}

async fn snipe(config: &Config, rating: i32, cycles: u32) -> Result<()> {
    let book = load_reference(config)?;
    let Some(reference) = book.get_or_fallback(rating) else {
        bail!("No reference price for rating {rating}");
    };

    let trader = start_trader(
        config,
        "snipe",
        Some(sniper::SNIPE_SCANS_PER_HOUR),
        sniper::SNIPE_BUYS_PER_HOUR,
    )
    .await?;
    Sniper::new(trader, config.tax_rate)
        .run_snipe(rating, reference, cycles)
        .await
}

async fn anomaly(config: &Config) -> Result<()> {
    let book = load_reference(config)?;
    let trader = start_trader(config, "anomaly", None, sniper::SNIPE_BUYS_PER_HOUR).await?;
    Sniper::new(trader, config.tax_rate).run_anomaly(book).await
}

async fn volume(config: &Config, ratings: &[i32], max_cards: usize, utc_offset: i8) -> Result<()> {
    let book = load_reference(config)?;
    let trader = start_trader(config, "volume", None, volume::BUYS_PER_HOUR).await?;
    volume::VolumeTrader::new(trader, &book, ratings, max_cards, utc_offset, config.tax_rate)
        .run()
        .await
}

async fn worker(config: &Config, player_id: u64, max_buy: u32) -> Result<()> {
    let session = load_session(config)?;
    let trader = Trader::new(config, &session, None, worker::BUYS_PER_HOUR, config.dry_run)?;
    let gateway = GatewayReporter::new(config.gateway_url.clone());

    worker::Worker::new(trader, gateway, config.worker_id.clone(), player_id, max_buy)
        .run(config.skip_validation)
        .await
}

fn save_token(config: &Config, token: &str, nucleus_id: Option<String>) -> Result<()> {
    let session = Session::new(token, nucleus_id)?;
    session.save(&config.session_file)?;
    info!(
        "Saved session {} to {}",
        session.masked_token(),
        config.session_file.display()
    );
    Ok(())
}

async fn check(config: &Config) -> Result<()> {
    let session = load_session(config)?;
    let http = HttpClient::new(&session, config.client_options(None))?;

    http.validate().await.context("Session rejected")?;
    info!("Session is valid");
    info!("Credits: {}", http.credits().await?);
    info!("Trade pile: {} items", http.trade_pile().await?.len());
    Ok(())
}

async fn pile(config: &Config) -> Result<()> {
    let session = load_session(config)?;
    let trader = Trader::new(config, &session, None, 0, config.dry_run)?;

    let summary = TradePileSummary::of(&trader.http.trade_pile().await?, config.tax_rate);
    info!(
        "Trade pile: {} on sale, {} sold for {} after tax, {} expired",
        summary.active, summary.sold, summary.sold_value, summary.expired
    );

    if summary.expired > 0 {
        trader.relist_expired().await?;
    }
    Ok(())
}

async fn prices(config: &Config, url: &str, margin: u32) -> Result<()> {
    let book = PriceFeed::new(url)?
        .reference_book(margin, config.tax_rate)
        .await
        .with_context(|| {
            format!("Couldn't read prices from {url}, use `bot targets 84=2.5K ...` instead")
        })?;
    save_book(config, &book)
}

/// Parses `rating=price` pairs such as `84=2.5K`.
fn parse_pairs(pairs: &[String]) -> Result<Vec<(i32, u32)>> {
    pairs
        .iter()
        .map(|pair| -> Result<(i32, u32)> {
            let (rating, price) = pair
                .split_once('=')
                .with_context(|| format!("Expected rating=price, got {pair}"))?;
            let rating: i32 = rating
                .trim()
                .parse()
                .with_context(|| format!("Invalid rating in {pair}"))?;
            match parse_price(price) {
                0 => bail!("Invalid price in {pair}"),
                price => Ok((rating, price)),
            }
        })
        .collect()
}

fn targets(config: &Config, pairs: &[String], margin: u32) -> Result<()> {
    let book = ReferenceBook::from_market_prices(parse_pairs(pairs)?, margin, config.tax_rate);
    save_book(config, &book)
}

fn save_book(config: &Config, book: &ReferenceBook) -> Result<()> {
    if book.is_empty() {
        bail!("None of the prices leave a profit after tax and margin");
    }

    for (rating, price) in book.iter() {
        info!(
            "{rating}: buy <= {}, sell at {}, profit {}",
            price.max_buy, price.sell_price, price.min_profit
        );
    }
    book.save(&config.reference_file)?;
    info!("Saved {} ratings to {}", book.len(), config.reference_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rating_price_pairs() {
        let pairs = vec!["84=2.5K".to_string(), " 85 =4,200".to_string()];
        assert_eq!(parse_pairs(&pairs).unwrap(), vec![(84, 2_500), (85, 4_200)]);

        assert!(parse_pairs(&["84".to_string()]).is_err());
        assert!(parse_pairs(&["x=1000".to_string()]).is_err());
        assert!(parse_pairs(&["84=abc".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_modes() {
        let cli = Cli::try_parse_from(["bot", "snipe", "84", "--cycles", "10", "--dry-run"]).unwrap();
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Commands::Snipe { rating: 84, cycles: 10 }));

        let cli = Cli::try_parse_from(["bot", "scan", "--once"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { once: true, interval: 5 }));

        let cli = Cli::try_parse_from(["bot", "prices", "--margin", "300"]).unwrap();
        assert!(matches!(cli.command, Commands::Prices { margin: 300, ref url } if url == DEFAULT_FEED_URL));

        let cli = Cli::try_parse_from(["bot", "volume", "--ratings", "85", "86", "--utc-offset", "-5"]).unwrap();
        match cli.command {
            Commands::Volume { ratings, max_cards, utc_offset } => {
                assert_eq!(ratings, vec![85, 86]);
                assert_eq!(max_cards, 50);
                assert_eq!(utc_offset, -5);
            }
            _ => panic!("expected volume"),
        }
        assert!(matches!(Cli::try_parse_from(["bot", "pile"]).unwrap().command, Commands::Pile));

        assert!(Cli::try_parse_from(["bot", "targets"]).is_err());
    }
}
