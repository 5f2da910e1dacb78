//! This library provides functionality for trading on the game's transfer market.
//! It includes the HTTP client and wire schema, the cached session, pricing
//! rules, reference prices and their price-site feed, price history and the
//! pacing/budget helpers the trading loops are built on.
mod endpoint;
mod error;
mod http;
pub mod notify;
pub mod pacing;
pub mod price_feed;
pub mod price_history;
pub mod pricing;
mod rate_limiter;
pub mod reference;
pub mod schema;
mod session;
#[cfg(test)]
mod test_server;
mod trade_cache;

pub use endpoint::Endpoint;
pub use error::Error;
pub use http::{ClientOptions, HttpClient, RetryPolicy, DEFAULT_BASE_URL};
pub use notify::{AlertClient, GatewayReporter};
pub use pacing::Pacing;
pub use price_feed::PriceFeed;
pub use price_history::{PriceHistory, PriceKey};
pub use pricing::{Confidence, DealRules};
pub use rate_limiter::{RateLimiter, HOUR};
pub use reference::{ReferenceBook, ReferencePrice};
pub use schema::{AuctionInfo, ItemData, Listing, SearchQuery, TradePileSummary};
pub use session::{Session, DEFAULT_USER_AGENT};
pub use trade_cache::TradeCache;

pub type Result<T> = std::result::Result<T, Error>;
