use strum_macros::{Display, EnumString};

/// Enum for all endpoints of the transfer-market API
#[derive(EnumString, Display, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    #[strum(serialize = "/transfermarket")]
    TransferMarket,
    #[strum(serialize = "/trade")]
    Trade,
    #[strum(serialize = "/purchased/items")]
    PurchasedItems,
    #[strum(serialize = "/item")]
    Item,
    #[strum(serialize = "/auctionhouse")]
    AuctionHouse,
    #[strum(serialize = "/auctionhouse/relist")]
    Relist,
    #[strum(serialize = "/tradepile")]
    TradePile,
    #[strum(serialize = "/user/credits")]
    Credits,
    #[strum(serialize = "/user/massInfo")]
    MassInfo,
}
