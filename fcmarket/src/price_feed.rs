//! Cheapest-by-rating prices scraped from the public price site, turned into
//! reference prices.
use crate::reference::{parse_price, ReferenceBook};
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://www.futbin.com/home-tab/cheapest-by-rating";
pub const FEED_RATINGS: RangeInclusive<i32> = 83..=92;

const PC_COLUMNS: &str = ".stc-player-column.hide-not-pc";
const ALL_COLUMNS: &str = ".stc-player-column";
const RATING: &str = ".stc-rating";
const PRICE: &str = ".platform-price-wrapper-small";
const FEED_TIMEOUT: Duration = Duration::from_secs(15);
const FEED_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::PriceFeed(format!("bad selector {css}: {e:?}")))
}

fn text_of(element: ElementRef) -> String {
    element.text().map(str::trim).collect()
}

fn rating_of(column: ElementRef, rating: &Selector) -> Option<i32> {
    let text = text_of(column.select(rating).next()?);
    text.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()
}

/// Lowest price per rating in [`FEED_RATINGS`]. Only PC columns are read,
/// unless the page has none.
pub fn parse_cheapest_by_rating(html: &str) -> Result<BTreeMap<i32, u32>> {
    let document = Html::parse_document(html);
    let rating = selector(RATING)?;
    let price = selector(PRICE)?;

    let mut columns: Vec<ElementRef> = document.select(&selector(PC_COLUMNS)?).collect();
    if columns.is_empty() {
        log::warn!("No PC price columns found, reading every column");
        columns = document.select(&selector(ALL_COLUMNS)?).collect();
    }

    let mut prices = BTreeMap::new();
    for column in columns {
        let Some(card_rating) = rating_of(column, &rating) else {
            continue;
        };
        if !FEED_RATINGS.contains(&card_rating) {
            continue;
        }

        let cheapest = column
            .select(&price)
            .map(|el| parse_price(&text_of(el)))
            .filter(|&p| p > 0)
            .min();
        if let Some(cheapest) = cheapest {
            prices
                .entry(card_rating)
                .and_modify(|p: &mut u32| *p = (*p).min(cheapest))
                .or_insert(cheapest);
        }
    }

    Ok(prices)
}

pub struct PriceFeed {
    client: reqwest::Client,
    url: String,
}

impl PriceFeed {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(FEED_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.futbin.com/"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(FEED_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Market price per rating. An empty page is an error.
    pub async fn fetch(&self) -> Result<BTreeMap<i32, u32>> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status, response.text().await.unwrap_or_default()));
        }

        let prices = parse_cheapest_by_rating(&response.text().await?)?;
        if prices.is_empty() {
            return Err(Error::PriceFeed(format!("no prices found at {}", self.url)));
        }
        Ok(prices)
    }

    pub async fn reference_book(&self, margin: u32, tax: f64) -> Result<ReferenceBook> {
        let prices = self.fetch().await?;
        for (rating, price) in &prices {
            log::info!("Rating {rating}: cheapest {price}");
        }

        let mut book = ReferenceBook::from_market_prices(prices, margin, tax);
        book.source = Some("futbin_pc".into());
        Ok(book)
    }
}
