use derive_more::Display;
use serde::{Deserialize, Serialize};

pub const PAGE_SIZE: u32 = 21;
pub const GOLD_RARE: i32 = 1;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub asset_id: Option<u64>,
    #[serde(default)]
    pub resource_id: Option<u64>,
    #[serde(default)]
    pub rating: i32,
    #[serde(default = "default_rareflag")]
    pub rareflag: i32,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

fn default_rareflag() -> i32 {
    GOLD_RARE
}

impl ItemData {
    /// The card definition this item belongs to.
    pub fn definition_id(&self) -> Option<u64> {
        self.asset_id.or(self.resource_id).filter(|&id| id != 0)
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (None, Some(last)) => last.clone(),
            _ => "Unknown".to_string(),
        }
    }

    pub fn is_gold_rare(&self) -> bool {
        self.rareflag == GOLD_RARE
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionInfo {
    #[serde(default)]
    pub trade_id: u64,
    #[serde(default)]
    pub buy_now_price: u32,
    #[serde(default)]
    pub current_bid: u32,
    #[serde(default)]
    pub starting_bid: u32,
    /// Seconds until the listing expires.
    #[serde(default)]
    pub expires: i64,
    /// `active`, `closed` (sold) or `expired` on the trade pile.
    #[serde(default)]
    pub trade_state: Option<String>,
    #[serde(default)]
    pub item_data: ItemData,
}

/// Trade pile contents by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradePileSummary {
    pub active: usize,
    pub sold: usize,
    pub expired: usize,
    /// Sum of the winning bids on sold items, after tax.
    pub sold_value: u64,
}

impl TradePileSummary {
    pub fn of(pile: &[AuctionInfo], tax: f64) -> Self {
        let mut summary = Self::default();
        let mut gross = 0u64;
        for auction in pile {
            match auction.trade_state.as_deref() {
                Some("active") => summary.active += 1,
                Some("closed") => {
                    summary.sold += 1;
                    gross += auction.current_bid as u64;
                }
                Some("expired") => summary.expired += 1,
                _ => {}
            }
        }
        summary.sold_value = (gross as f64 * (1.0 - tax) + 1e-9).floor() as u64;
        summary
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub auction_info: Vec<AuctionInfo>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidResponse {
    #[serde(default)]
    pub credits: Option<u64>,
    #[serde(default)]
    pub auction_info: Vec<AuctionInfo>,
}

impl BidResponse {
    /// Id of the item we now own, when the API returns it.
    pub fn item_id(&self) -> Option<u64> {
        self.auction_info
            .first()
            .map(|a| a.item_data.id)
            .filter(|&id| id != 0)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemList {
    #[serde(default)]
    pub item_data: Vec<ItemData>,
}

#[derive(Deserialize, Debug)]
pub struct Credits {
    pub credits: u64,
}

/// Search parameters for `/transfermarket`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raretype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minr: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxr: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxb: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_def_id: Option<u64>,
    pub num: u32,
    pub start: u32,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    #[display("player")]
    Player,
    #[display("training")]
    Training,
}

impl SearchQuery {
    pub fn players() -> Self {
        Self {
            kind: ItemKind::Player,
            num: PAGE_SIZE,
            ..Default::default()
        }
    }

    pub fn training(category: &str) -> Self {
        Self {
            kind: ItemKind::Training,
            cat: Some(category.to_string()),
            num: PAGE_SIZE,
            ..Default::default()
        }
    }

    /// Gold rare players of exactly `rating`.
    pub fn gold_rare(rating: i32) -> Self {
        Self::players().gold().rare().rating(rating, rating)
    }

    pub fn gold(mut self) -> Self {
        self.lev = Some("gold".into());
        self
    }

    pub fn rare(mut self) -> Self {
        self.raretype = Some(GOLD_RARE.to_string());
        self
    }

    pub fn rating(mut self, min: i32, max: i32) -> Self {
        self.minr = Some(min);
        self.maxr = Some(max);
        self
    }

    pub fn bid_range(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.minb = min;
        self.maxb = max;
        self
    }

    pub fn max_buy(mut self, max: u32) -> Self {
        self.maxb = Some(max);
        self
    }

    pub fn definition(mut self, masked_def_id: u64) -> Self {
        self.masked_def_id = Some(masked_def_id);
        self
    }

    pub fn page(&self, page: u32) -> Self {
        Self {
            start: page * self.num,
            ..self.clone()
        }
    }
}

#[derive(Serialize, Debug)]
pub struct BidRequest {
    pub bid: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PileRequest {
    pub item_data: Vec<PileMove>,
}

#[derive(Serialize, Debug)]
pub struct PileMove {
    pub id: u64,
    pub pile: Pile,
}

#[derive(Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Pile {
    Trade,
}

impl PileRequest {
    pub fn to_trade_pile(item_id: u64) -> Self {
        Self {
            item_data: vec![PileMove {
                id: item_id,
                pile: Pile::Trade,
            }],
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(into = "u32")]
pub enum ListingDuration {
    #[default]
    OneHour,
    ThreeHours,
    SixHours,
    TwelveHours,
    OneDay,
    ThreeDays,
}

impl From<ListingDuration> for u32 {
    fn from(duration: ListingDuration) -> u32 {
        match duration {
            ListingDuration::OneHour => 3_600,
            ListingDuration::ThreeHours => 10_800,
            ListingDuration::SixHours => 21_600,
            ListingDuration::TwelveHours => 43_200,
            ListingDuration::OneDay => 86_400,
            ListingDuration::ThreeDays => 259_200,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub item_data: ListedItem,
    pub starting_bid: u32,
    pub duration: ListingDuration,
    pub buy_now_price: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ListedItem {
    pub id: u64,
}

impl Listing {
    pub fn new(item_id: u64, starting_bid: u32, buy_now_price: u32) -> Self {
        Self {
            item_data: ListedItem { id: item_id },
            starting_bid,
            duration: ListingDuration::default(),
            buy_now_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_search_response() {
        let body = json!({
            "auctionInfo": [
                {
                    "tradeId": 531245871234u64,
                    "buyNowPrice": 2900,
                    "currentBid": 0,
                    "startingBid": 2700,
                    "expires": 3421,
                    "tradeState": "active",
                    "itemData": {
                        "id": 139812394871u64,
                        "assetId": 231747,
                        "resourceId": 50563203,
                        "rating": 85,
                        "rareflag": 1,
                        "lastName": "Mbappé",
                        "firstName": "Kylian"
                    }
                },
                { "tradeId": 1, "itemData": { "id": 2 } }
            ]
        });

        let response: SearchResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.auction_info.len(), 2);

        let first = &response.auction_info[0];
        assert_eq!(first.trade_id, 531245871234);
        assert_eq!(first.buy_now_price, 2900);
        assert_eq!(first.item_data.definition_id(), Some(231747));
        assert_eq!(first.item_data.display_name(), "Kylian Mbappé");

        assert_eq!(first.trade_state.as_deref(), Some("active"));

        let sparse = &response.auction_info[1];
        assert_eq!(sparse.buy_now_price, 0);
        assert_eq!(sparse.trade_state, None);
        assert!(sparse.item_data.is_gold_rare());
        assert_eq!(sparse.item_data.definition_id(), None);
        assert_eq!(sparse.item_data.display_name(), "Unknown");
    }

    #[test]
    fn summarizes_trade_pile_states() {
        let pile: SearchResponse = serde_json::from_value(json!({
            "auctionInfo": [
                { "tradeId": 1, "tradeState": "active", "currentBid": 0 },
                { "tradeId": 2, "tradeState": "closed", "currentBid": 2500 },
                { "tradeId": 3, "tradeState": "closed", "currentBid": 1300 },
                { "tradeId": 4, "tradeState": "expired" },
                { "tradeId": 5 }
            ]
        }))
        .unwrap();

        let summary = TradePileSummary::of(&pile.auction_info, 0.05);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.sold, 2);
        assert_eq!(summary.expired, 1);
        // (2500 + 1300) * 0.95
        assert_eq!(summary.sold_value, 3_610);
    }

    #[test]
    fn empty_body_is_an_empty_page() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(response.auction_info.is_empty());
    }

    #[test]
    fn search_query_serializes_only_set_fields() {
        let query = SearchQuery::gold_rare(84).max_buy(1900).page(2);
        let qs = serde_qs::to_string(&query).unwrap();

        assert_eq!(
            qs,
            "type=player&raretype=1&lev=gold&minr=84&maxr=84&maxb=1900&num=21&start=42"
        );
    }

    #[test]
    fn item_kind_displays_as_sent() {
        assert_eq!(ItemKind::Player.to_string(), "player");
        assert_eq!(SearchQuery::training("playStyle").kind.to_string(), "training");
    }

    #[test]
    fn definition_query_uses_masked_def_id() {
        let qs = serde_qs::to_string(&SearchQuery::players().definition(239085).max_buy(15000))
            .unwrap();
        assert_eq!(qs, "type=player&maxb=15000&maskedDefId=239085&num=21&start=0");
    }

    #[test]
    fn listing_payload_shape() {
        let listing = Listing::new(77, 2700, 3000);
        assert_eq!(
            serde_json::to_value(&listing).unwrap(),
            json!({
                "itemData": { "id": 77 },
                "startingBid": 2700,
                "duration": 3600,
                "buyNowPrice": 3000
            })
        );
    }

    #[test]
    fn pile_payload_shape() {
        assert_eq!(
            serde_json::to_value(PileRequest::to_trade_pile(5)).unwrap(),
            json!({ "itemData": [{ "id": 5, "pile": "trade" }] })
        );
    }

    #[test]
    fn bid_response_item_id() {
        let response: BidResponse = serde_json::from_value(json!({
            "credits": 12000,
            "auctionInfo": [{ "tradeId": 9, "itemData": { "id": 31 } }]
        }))
        .unwrap();
        assert_eq!(response.item_id(), Some(31));
        assert_eq!(response.credits, Some(12000));

        let empty: BidResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.item_id(), None);
    }
}
