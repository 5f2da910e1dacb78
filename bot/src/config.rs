use common::{env_flag, env_or};
use fcmarket::{ClientOptions, DealRules, RetryPolicy, DEFAULT_BASE_URL};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub session_file: PathBuf,
    pub base_url: String,
    pub reference_file: PathBuf,
    pub targets_file: PathBuf,
    pub price_cache_file: PathBuf,
    pub trade_log_file: PathBuf,
    pub discord_webhook: Option<String>,
    pub gateway_url: Option<String>,
    pub worker_id: String,
    pub dry_run: bool,
    pub skip_validation: bool,
    pub tax_rate: f64,
    pub max_buys_per_hour: Option<usize>,
    pub max_scans_per_hour: Option<usize>,
    pub request_gap: Duration,
    pub retry: RetryPolicy,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn optional_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    optional(key).and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = RetryPolicy::default();

        Self {
            session_file: env_or("SESSION_FILE", "active_session.json".into()),
            base_url: env_or("EA_BASE_URL", DEFAULT_BASE_URL.to_string()),
            reference_file: env_or("REFERENCE_FILE", "fodder_targets.json".into()),
            targets_file: env_or("TARGETS_FILE", "active_targets.json".into()),
            price_cache_file: env_or("PRICE_CACHE_FILE", "price_cache.json".into()),
            trade_log_file: env_or("TRADE_LOG_FILE", "trade_log.json".into()),
            discord_webhook: optional("DISCORD_WEBHOOK_URL"),
            gateway_url: optional("GATEWAY_URL"),
            worker_id: env_or("WORKER_ID", "worker-1".to_string()),
            dry_run: env_flag("DRY_RUN"),
            skip_validation: env_flag("EA_VALIDATION_SKIP"),
            tax_rate: env_or("TAX_RATE", fcmarket::pricing::DEFAULT_TAX_RATE),
            max_buys_per_hour: optional_parsed("MAX_BUYS_PER_HOUR"),
            max_scans_per_hour: optional_parsed("MAX_SCANS_PER_HOUR"),
            request_gap: Duration::from_millis(env_or("REQUEST_GAP_MS", 1_000)),
            retry: RetryPolicy {
                max_retries: env_or("MAX_RETRIES", defaults.max_retries),
                base_secs: env_or("BACKOFF_BASE_SECS", defaults.base_secs),
                cap_secs: env_or("BACKOFF_CAP_SECS", defaults.cap_secs),
            },
        }
    }

    /// Client settings with a per-mode default search budget unless
    /// `MAX_SCANS_PER_HOUR` overrides it.
    pub fn client_options(&self, default_scans_per_hour: Option<usize>) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            request_gap: self.request_gap,
            retry: self.retry,
            searches_per_hour: self.max_scans_per_hour.or(default_scans_per_hour),
        }
    }

    pub fn buys_per_hour(&self, default: usize) -> usize {
        self.max_buys_per_hour.unwrap_or(default)
    }

    pub fn deal_rules(&self) -> DealRules {
        DealRules {
            tax: self.tax_rate,
            ..DealRules::default()
        }
    }
}
