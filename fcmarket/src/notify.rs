//! Outbound notifications: Discord embeds for people, a metrics gateway for
//! dashboards. Both are optional and best-effort; a failed post is logged
//! and otherwise ignored.
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

const GATEWAY_TIMEOUT: Duration = Duration::from_millis(500);
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

const COLOR_INFO: u32 = 0x3498db;
const COLOR_SUCCESS: u32 = 0x2ecc71;
const COLOR_ALERT: u32 = 0xe74c3c;

#[derive(Clone)]
pub struct AlertClient {
    client: reqwest::Client,
    webhook: Option<String>,
}

impl AlertClient {
    pub fn new(webhook: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook: webhook.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some()
    }

    async fn send(&self, embed: Value) {
        let Some(url) = &self.webhook else {
            return;
        };

        let body = json!({ "embeds": [embed] });
        match self.client.post(url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                log::warn!("Discord webhook returned {}", response.status())
            }
            Ok(_) => {}
            Err(e) => log::warn!("Discord webhook failed: {e}"),
        }
    }

    pub async fn bot_started(&self, mode: &str, dry_run: bool) {
        let suffix = if dry_run { " (dry run)" } else { "" };
        self.send(embed(
            "Bot started",
            &format!("Mode: {mode}{suffix}"),
            COLOR_INFO,
        ))
        .await;
    }

    pub async fn snipe(&self, snipe: &SnipeAlert) {
        self.send(snipe_embed(snipe)).await;
    }

    pub async fn session_expired(&self) {
        self.send(embed(
            "Session expired",
            "The token was rejected. Run `bot token <TOKEN>` with a fresh one.",
            COLOR_ALERT,
        ))
        .await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnipeAlert {
    pub name: String,
    pub rating: i32,
    pub buy_price: u32,
    pub reference_price: u32,
    pub estimated_profit: i64,
}

fn embed(title: &str, description: &str, color: u32) -> Value {
    json!({
        "title": title,
        "description": description,
        "color": color,
    })
}

fn snipe_embed(snipe: &SnipeAlert) -> Value {
    json!({
        "title": format!("Sniped {} ({})", snipe.name, snipe.rating),
        "color": COLOR_SUCCESS,
        "fields": [
            { "name": "Bought", "value": snipe.buy_price.to_string(), "inline": true },
            { "name": "Reference", "value": snipe.reference_price.to_string(), "inline": true },
            { "name": "Est. profit", "value": snipe.estimated_profit.to_string(), "inline": true },
        ],
    })
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub worker_id: String,
    pub player_id: u64,
    pub price: u32,
    pub trade_id: u64,
    pub expires: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TradeReport {
    pub worker_id: String,
    pub trade_id: u64,
    pub action: String,
    pub price: u32,
    pub result: String,
    pub latency_ms: u64,
}

/// Posts scan and trade events to the metrics gateway without waiting on it.
#[derive(Clone)]
pub struct GatewayReporter {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl GatewayReporter {
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) {
        let Some(base) = &self.base_url else {
            return;
        };
        let body = match serde_json::to_value(body) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Couldn't encode gateway report: {e}");
                return;
            }
        };

        let request = self.client.post(format!("{base}{path}")).json(&body);
        tokio::spawn(async move {
            if let Err(e) = request.send().await {
                log::debug!("Gateway report dropped: {e}");
            }
        });
    }

    pub fn scan(&self, report: &ScanReport) {
        self.post("/ingest/scan", report);
    }

    pub fn trade(&self, report: &TradeReport) {
        self.post("/ingest/trade", report);
    }
}
