use crate::endpoint::Endpoint;
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Couldn't convert query to string: {0}")]
    HttpQuery(#[from] serde_qs::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable not found: {0}")]
    EnvVar(#[from] env::VarError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Session expired, a new token is required")]
    SessionExpired,

    #[error("Rate limited on {0}")]
    RateLimited(Endpoint),

    #[error("Item unavailable on {0} (sold, outbid or pile full)")]
    ItemUnavailable(Endpoint),

    #[error("Invalid trade")]
    InvalidTrade,

    #[error("Response error:\nStatusCode: {0}\nText: {1}")]
    Status(reqwest::StatusCode, String),

    #[error("Hourly budget for {0} used up, next slot in {1:?}")]
    BudgetExhausted(Endpoint, std::time::Duration),

    #[error("Gave up on {0} after repeated failures")]
    RetriesExhausted(Endpoint),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Price feed: {0}")]
    PriceFeed(String),

    #[error("Failed to deserialize response: {0}")]
    Deserialize(String),
}

impl Error {
    /// Errors after which continuing with the same token is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SessionExpired | Error::InvalidSession(_))
    }
}
