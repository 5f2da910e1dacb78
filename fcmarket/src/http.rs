use crate::endpoint::Endpoint;
use crate::rate_limiter::RateLimiter;
use crate::schema::{
    AuctionInfo, BidRequest, BidResponse, Credits, ItemData, ItemList, Listing, PileRequest,
    SearchQuery, SearchResponse,
};
use crate::session::Session;
use crate::{Error, Result};
use dashmap::DashMap;
use futures::Stream;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://utas.mob.v5.prd.futc-ext.gcp.ea.com/ut/game/fc26";
const HEADER_SESSION: &str = "X-UT-SID";
const HEADER_FC_SESSION: &str = "X-FC-SID";
const TRANSPORT_RETRY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Exponential backoff with jitter for 429/5xx responses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_secs: f64,
    pub cap_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_secs: 2.0,
            cap_secs: 32.0,
        }
    }
}

impl RetryPolicy {
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exp = self.base_secs * 2f64.powi(attempt.min(30) as i32);
        let wait = (exp + rng.gen_range(0.0..1.0)).min(self.cap_secs);
        Duration::from_secs_f64(wait.max(0.0))
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Minimum spacing between any two requests.
    pub request_gap: Duration,
    pub retry: RetryPolicy,
    /// Optional per-hour budget for market searches.
    pub searches_per_hour: Option<usize>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_gap: Duration::from_millis(1_000),
            retry: RetryPolicy::default(),
            searches_per_hour: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StatusClass {
    Success,
    Retry,
    Fail,
}

fn classify(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Retry
    } else {
        StatusClass::Fail
    }
}

fn status_error(endpoint: Endpoint, status: StatusCode, body: String) -> Error {
    match status.as_u16() {
        401 => Error::SessionExpired,
        461 => Error::ItemUnavailable(endpoint),
        478 => Error::InvalidTrade,
        _ => Error::Status(status, body),
    }
}

fn exhausted(endpoint: Endpoint, status: StatusCode) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited(endpoint)
    } else {
        Error::RetriesExhausted(endpoint)
    }
}

fn session_headers(session: &Session) -> Result<HeaderMap> {
    let token = HeaderValue::from_str(&session.token)?;
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_SESSION, token.clone());
    headers.insert(HEADER_FC_SESSION, token);
    headers.insert(USER_AGENT, HeaderValue::from_str(&session.user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    request_gap: Duration,
    /// Prevents a task from making a request before another has finished
    lock: Arc<Mutex<()>>,
    request_ok: Arc<Mutex<Instant>>,
    budgets: Arc<DashMap<Endpoint, RateLimiter>>,
}

impl HttpClient {
    pub fn new(session: &Session, options: ClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(session_headers(session)?)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        // fail early on a malformed base URL
        Url::parse(&options.base_url)?;

        let budgets = DashMap::new();
        if let Some(limit) = options.searches_per_hour {
            budgets.insert(Endpoint::TransferMarket, RateLimiter::per_hour(limit));
        }

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            retry: options.retry,
            request_gap: options.request_gap,
            lock: Arc::new(Mutex::new(())),
            request_ok: Arc::new(Mutex::new(Instant::now())),
            budgets: Arc::new(budgets),
        })
    }

    /// Searches used and allowed in the current hour, when a budget is set.
    pub fn search_budget(&self) -> Option<(usize, usize)> {
        self.budgets.get(&Endpoint::TransferMarket).map(|limiter| {
            (
                limiter.used(std::time::Instant::now()),
                limiter.limit(),
            )
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{path}", self.base_url))?)
    }

    async fn wait_for_slot(&self) {
        let mut request_ok = self.request_ok.lock().await;
        sleep_until(*request_ok).await;
        *request_ok = Instant::now() + self.request_gap;
    }

    fn check_budget(&self, endpoint: Endpoint) -> Result<()> {
        let wait = self
            .budgets
            .get_mut(&endpoint)
            .and_then(|mut limiter| limiter.check_and_update(std::time::Instant::now()));

        match wait {
            Some(wait) => Err(Error::BudgetExhausted(endpoint, wait)),
            None => Ok(()),
        }
    }

    async fn process_request(
        &self,
        builder: RequestBuilder,
        endpoint: Endpoint,
    ) -> Result<Response> {
        let _lock = self.lock.lock().await;
        self.check_budget(endpoint)?;

        let mut attempt = 0;
        loop {
            self.wait_for_slot().await;

            let request = builder
                .try_clone()
                .ok_or_else(|| Error::InvalidInput(format!("request to {endpoint} can't be retried")))?;

            let wait = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    match classify(status) {
                        StatusClass::Success => return Ok(response),
                        StatusClass::Fail => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(status_error(endpoint, status, body));
                        }
                        StatusClass::Retry if attempt + 1 >= self.retry.max_retries => {
                            return Err(exhausted(endpoint, status));
                        }
                        StatusClass::Retry => {
                            let wait = self.retry.backoff(attempt, &mut rand::thread_rng());
                            log::warn!(
                                "{endpoint} returned {status}, backing off {:.1}s",
                                wait.as_secs_f64()
                            );
                            wait
                        }
                    }
                }
                Err(e) if attempt + 1 >= self.retry.max_retries => return Err(e.into()),
                Err(e) => {
                    log::warn!(
                        "Request to {endpoint} failed: {e}. Retrying in {}s",
                        TRANSPORT_RETRY.as_secs()
                    );
                    TRANSPORT_RETRY
                }
            };

            sleep(wait).await;
            attempt += 1;
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        endpoint: Endpoint,
    ) -> Result<T> {
        let response = self.process_request(builder, endpoint).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return serde_json::from_str("{}").map_err(|_| Error::Deserialize(text));
        }
        serde_json::from_str(&text).map_err(|_| Error::Deserialize(text))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T> {
        let builder = self.client.get(self.url(&endpoint.to_string())?);
        self.request(builder, endpoint).await
    }

    async fn send_json<B: Serialize>(
        &self,
        builder: RequestBuilder,
        endpoint: Endpoint,
        body: &B,
    ) -> Result<()> {
        self.process_request(builder.json(body), endpoint).await?;
        Ok(())
    }

    /// Checks that the session token is accepted.
    pub async fn validate(&self) -> Result<()> {
        let builder = self.client.get(self.url(&Endpoint::MassInfo.to_string())?);
        self.process_request(builder, Endpoint::MassInfo).await?;
        Ok(())
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<AuctionInfo>> {
        let mut url = self.url(&Endpoint::TransferMarket.to_string())?;
        url.set_query(Some(&serde_qs::to_string(query)?));

        let response: SearchResponse = self
            .request(self.client.get(url), Endpoint::TransferMarket)
            .await?;
        Ok(response.auction_info)
    }

    /// Pages of results for `query`, stopping at the first short page,
    /// the first error, or after `pages` pages.
    pub fn search_pages(
        &self,
        query: SearchQuery,
        pages: u32,
    ) -> impl Stream<Item = Result<Vec<AuctionInfo>>> + '_ {
        async_stream::stream! {
            for page in 0..pages {
                match self.search(&query.page(page)).await {
                    Ok(items) => {
                        let last = (items.len() as u32) < query.num;
                        yield Ok(items);
                        if last {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    pub async fn bid(&self, trade_id: u64, price: u32) -> Result<BidResponse> {
        let url = self.url(&format!("{}/{trade_id}/bid", Endpoint::Trade))?;
        let builder = self.client.put(url).json(&BidRequest { bid: price });
        self.request(builder, Endpoint::Trade).await
    }

    pub async fn purchased_items(&self) -> Result<Vec<ItemData>> {
        Ok(self
            .get::<ItemList>(Endpoint::PurchasedItems)
            .await?
            .item_data)
    }

    pub async fn move_to_trade_pile(&self, item_id: u64) -> Result<()> {
        let builder = self.client.put(self.url(&Endpoint::Item.to_string())?);
        self.send_json(builder, Endpoint::Item, &PileRequest::to_trade_pile(item_id))
            .await
    }

    pub async fn list_item(&self, listing: &Listing) -> Result<()> {
        let builder = self
            .client
            .post(self.url(&Endpoint::AuctionHouse.to_string())?);
        self.send_json(builder, Endpoint::AuctionHouse, listing).await
    }

    /// Relists every expired item on the trade pile at its previous prices.
    pub async fn relist_expired(&self) -> Result<()> {
        let builder = self.client.put(self.url(&Endpoint::Relist.to_string())?);
        self.process_request(builder, Endpoint::Relist).await?;
        Ok(())
    }

    pub async fn trade_pile(&self) -> Result<Vec<AuctionInfo>> {
        Ok(self
            .get::<SearchResponse>(Endpoint::TradePile)
            .await?
            .auction_info)
    }

    pub async fn credits(&self) -> Result<u64> {
        Ok(self.get::<Credits>(Endpoint::Credits).await?.credits)
    }
}
