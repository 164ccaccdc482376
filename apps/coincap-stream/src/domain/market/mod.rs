//! Market Data Types
//!
//! Wire-compatible schemas for CoinCap payloads, shared by the streaming
//! channels (`trades`, `global`) and the REST endpoints.
//!
//! CoinCap is inconsistent about numeric encoding: the same field may arrive
//! as a JSON number in one message and as a string in the next. Every numeric
//! field is therefore a [`Decimal`], whose deserializer accepts both forms.
//! Fields are optional because the service also sends `null` for values it
//! has not computed yet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Coin Summary
// =============================================================================

/// Per-coin summary row, as returned by `/front` and embedded in trade messages.
///
/// # Wire Format (JSON)
/// ```json
/// {"long":"Bitcoin","short":"BTC","price":6231.2,"mktcap":"105902744617",
///  "cap24hrChange":-2.06,"perc":-2.06,"supply":16995712,"shapeshift":true,
///  "usdVolume":3412904731,"volume":3412904731,"vwapData":6225.11}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Front {
    /// Full coin name.
    #[serde(default)]
    pub long: String,

    /// Ticker symbol.
    #[serde(default)]
    pub short: String,

    /// Whether the coin is tradable on ShapeShift.
    #[serde(default)]
    pub shapeshift: bool,

    /// Price in USD.
    #[serde(default)]
    pub price: Option<Decimal>,

    /// Market cap change over 24 hours, in percent.
    #[serde(default, alias = "cap24HrChange")]
    pub cap24hr_change: Option<Decimal>,

    /// Market capitalisation in USD.
    #[serde(default)]
    pub mktcap: Option<Decimal>,

    /// Price change percentage.
    #[serde(default)]
    pub perc: Option<Decimal>,

    /// Circulating supply.
    #[serde(default)]
    pub supply: Option<Decimal>,

    /// 24 hour volume in USD.
    #[serde(default, alias = "USDVolume")]
    pub usd_volume: Option<Decimal>,

    /// 24 hour volume.
    #[serde(default)]
    pub volume: Option<Decimal>,

    /// Volume-weighted average price in USD.
    #[serde(default)]
    pub vwap_data: Option<Decimal>,

    /// Volume-weighted average price in BTC.
    #[serde(default, rename = "vwapDataBTC")]
    pub vwap_data_btc: Option<Decimal>,
}

// =============================================================================
// Trades
// =============================================================================

/// Exchange-reported details of a single fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrade {
    /// Exchange trade identifier.
    #[serde(default, alias = "ID")]
    pub id: Option<String>,

    /// Exchange timestamp.
    #[serde(default, rename = "timestamp", alias = "TimeStamp", alias = "timeStamp")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Filled quantity.
    #[serde(default, alias = "Quantity")]
    pub quantity: Option<Decimal>,

    /// Fill price.
    #[serde(default, alias = "Price")]
    pub price: Option<Decimal>,

    /// Quantity times price.
    #[serde(default, alias = "Total")]
    pub total: Option<Decimal>,

    /// Fill type reported by the exchange.
    #[serde(default, rename = "fillType", alias = "FillType")]
    pub fill_type: Option<String>,

    /// Order side/type reported by the exchange.
    #[serde(default, rename = "orderType", alias = "OrderType")]
    pub order_type: Option<String>,
}

/// Trade payload carried by the `trades` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeData {
    /// Exchange identifier (e.g. `bitfinex`).
    #[serde(default)]
    pub exchange_id: String,

    /// Market identifier on that exchange (e.g. `BTC_USD`).
    #[serde(default)]
    pub market_id: String,

    /// Trade price.
    #[serde(default)]
    pub price: Option<Decimal>,

    /// Raw exchange fill, when the exchange provides one.
    #[serde(default)]
    pub raw: Option<RawTrade>,

    /// Trade time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp_ms: i64,

    /// Trade volume.
    #[serde(default)]
    pub volume: Option<Decimal>,
}

impl TradeData {
    /// Trade time as a UTC timestamp, if `timestamp_ms` is in range.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Coin update that accompanies every trade on the `trades` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Exchange identifier.
    #[serde(default)]
    pub exchange_id: String,

    /// Market identifier.
    #[serde(default)]
    pub market_id: String,

    /// Coin ticker.
    #[serde(default)]
    pub coin: String,

    /// Updated coin summary.
    #[serde(default)]
    pub msg: Front,
}

/// A decoded message from the `trades` channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Coin update.
    pub msg: TradeMessage,
    /// Trade details.
    pub data: TradeData,
}

// =============================================================================
// Global Snapshot
// =============================================================================

/// Market-wide snapshot. Pushed on the `global` channel and returned by `/global`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Global {
    /// Bitcoin price in USD.
    #[serde(default)]
    pub btc_price: Option<Decimal>,

    /// Bitcoin market cap.
    #[serde(default)]
    pub btc_cap: Option<Decimal>,

    /// Market cap of all coins except Bitcoin.
    #[serde(default)]
    pub alt_cap: Option<Decimal>,

    /// Bitcoin dominance, in percent.
    #[serde(default)]
    pub dom: Option<Decimal>,

    /// Number of reachable Bitcoin nodes.
    #[serde(default)]
    pub bitnodes_count: Option<Decimal>,

    /// Total market cap.
    #[serde(default)]
    pub total_cap: Option<Decimal>,

    /// 24 hour altcoin volume.
    #[serde(default)]
    pub volume_alt: Option<Decimal>,

    /// 24 hour Bitcoin volume.
    #[serde(default)]
    pub volume_btc: Option<Decimal>,

    /// 24 hour total volume.
    #[serde(default)]
    pub volume_total: Option<Decimal>,
}

// =============================================================================
// REST-only Types
// =============================================================================

/// Symbol mapping returned by `/map`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Coin name.
    #[serde(default)]
    pub name: String,
    /// Primary symbol.
    #[serde(default)]
    pub symbol: String,
    /// Alternate symbols.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Coin detail page returned by `/page/{symbol}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Market-wide fields included with every page.
    #[serde(flatten)]
    pub global: Global,

    /// Coin ticker.
    #[serde(default)]
    pub id: String,

    /// Asset type.
    #[serde(default, rename = "type")]
    pub kind: String,

    /// Internal document identifier.
    #[serde(default, rename = "_id")]
    pub internal_id: String,

    /// Human readable name.
    #[serde(default)]
    pub display_name: String,

    /// Listing status.
    #[serde(default)]
    pub status: String,

    /// Price in USD.
    #[serde(default)]
    pub price_usd: Option<Decimal>,

    /// Price in EUR.
    #[serde(default)]
    pub price_eur: Option<Decimal>,

    /// Price in BTC.
    #[serde(default)]
    pub price_btc: Option<Decimal>,

    /// Price in ETH.
    #[serde(default)]
    pub price_eth: Option<Decimal>,

    /// Price in ZEC.
    #[serde(default)]
    pub price_zec: Option<Decimal>,

    /// Price in LTC.
    #[serde(default)]
    pub price_ltc: Option<Decimal>,

    /// Market capitalisation.
    #[serde(default)]
    pub market_cap: Option<Decimal>,

    /// Market cap change over 24 hours.
    #[serde(default, rename = "cap24hrChange")]
    pub cap24h_change: Option<Decimal>,

    /// Circulating supply.
    #[serde(default)]
    pub supply: Option<Decimal>,

    /// 24 hour volume.
    #[serde(default)]
    pub volume: Option<Decimal>,

    /// Last price.
    #[serde(default)]
    pub price: Option<Decimal>,

    /// 24 hour volume-weighted average price.
    #[serde(default, rename = "vwap_h24")]
    pub vwap_24h: Option<Decimal>,
}

/// A `[timestamp_ms, value]` sample in a history series.
pub type HistoryPoint = (i64, Decimal);

/// Historical series returned by `/history/...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Price samples.
    #[serde(default)]
    pub price: Vec<HistoryPoint>,
    /// Market cap samples.
    #[serde(default)]
    pub market_cap: Vec<HistoryPoint>,
    /// Volume samples.
    #[serde(default)]
    pub volume: Vec<HistoryPoint>,
}

/// Window for `/history` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryInterval {
    /// Entire history of the coin.
    #[default]
    All,
    /// Last day.
    OneDay,
    /// Last 7 days.
    SevenDays,
    /// Last 30 days.
    ThirtyDays,
    /// Last 90 days.
    NinetyDays,
    /// Last 180 days.
    OneHundredEightyDays,
    /// Last 365 days.
    ThreeHundredSixtyFiveDays,
}

impl HistoryInterval {
    /// Path segment for this interval (empty for [`HistoryInterval::All`]).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "",
            Self::OneDay => "1day",
            Self::SevenDays => "7day",
            Self::ThirtyDays => "30day",
            Self::NinetyDays => "90day",
            Self::OneHundredEightyDays => "180day",
            Self::ThreeHundredSixtyFiveDays => "365day",
        }
    }

    /// Build the request path for `symbol`.
    #[must_use]
    pub fn path_for(&self, symbol: &str) -> String {
        match self {
            Self::All => format!("history/{symbol}"),
            other => format!("history/{}/{symbol}", other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn front_accepts_numbers_and_strings() {
        let json = r#"{
            "long":"Bitcoin","short":"BTC","shapeshift":true,
            "price":6231.2,"mktcap":"105902744617","cap24hrChange":-2.06,
            "perc":"-2.06","supply":16995712,"usdVolume":3412904731,
            "volume":"3412904731","vwapData":null
        }"#;

        let front: Front = serde_json::from_str(json).unwrap();
        assert_eq!(front.short, "BTC");
        assert!(front.shapeshift);
        assert_eq!(front.price, Some(Decimal::from_str("6231.2").unwrap()));
        assert_eq!(front.mktcap, Some(Decimal::from(105_902_744_617_i64)));
        assert_eq!(front.perc, Some(Decimal::from_str("-2.06").unwrap()));
        assert_eq!(front.vwap_data, None);
        assert_eq!(front.vwap_data_btc, None);
    }

    #[test]
    fn trade_data_timestamp_conversion() {
        let data = TradeData {
            timestamp_ms: 1_514_764_800_000,
            ..Default::default()
        };
        let ts = data.timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2018-01-01T00:00:00+00:00");
    }

    #[test]
    fn global_uses_camel_case_keys() {
        let json = r#"{"btcPrice":"6231.2","altCap":1.5e11,"dom":51.3,"volumeTotal":12000000000}"#;

        let global: Global = serde_json::from_str(json).unwrap();
        assert_eq!(global.btc_price, Some(Decimal::from_str("6231.2").unwrap()));
        assert!(global.alt_cap.is_some());
        assert_eq!(global.volume_total, Some(Decimal::from(12_000_000_000_i64)));
        assert_eq!(global.btc_cap, None);
    }

    #[test]
    fn page_flattens_global_fields() {
        let json = r#"{
            "id":"ETH","display_name":"Ethereum","_id":"179bd7dc","type":"cmc",
            "price_usd":301.2,"cap24hrChange":"1.5","vwap_h24":300.9,
            "btcPrice":6231.2
        }"#;

        let page: Page = serde_json::from_str(json).unwrap();
        assert_eq!(page.id, "ETH");
        assert_eq!(page.internal_id, "179bd7dc");
        assert_eq!(page.kind, "cmc");
        assert_eq!(page.cap24h_change, Some(Decimal::from_str("1.5").unwrap()));
        assert!(page.vwap_24h.is_some());
        assert!(page.global.btc_price.is_some());
    }

    #[test]
    fn history_decodes_sample_pairs() {
        let json = r#"{"price":[[1500000000000,2500.5]],"market_cap":[[1500000000000,"41000000000"]],"volume":[]}"#;

        let history: History = serde_json::from_str(json).unwrap();
        assert_eq!(history.price.len(), 1);
        assert_eq!(history.price[0].0, 1_500_000_000_000);
        assert_eq!(history.market_cap[0].1, Decimal::from(41_000_000_000_i64));
        assert!(history.volume.is_empty());
    }

    #[test]
    fn history_interval_paths() {
        assert_eq!(HistoryInterval::All.path_for("BTC"), "history/BTC");
        assert_eq!(HistoryInterval::OneDay.path_for("BTC"), "history/1day/BTC");
        assert_eq!(
            HistoryInterval::ThreeHundredSixtyFiveDays.path_for("ETH"),
            "history/365day/ETH"
        );
    }
}
