//! Envelope Decoders
//!
//! Decoders for the named Socket.IO channels CoinCap pushes.
//!
//! # `trades`
//!
//! ```json
//! {"coin":"BTC","message":{"coin":"BTC","exchange_id":"bitfinex","market_id":"BTC_USD","msg":{...}},
//!  "trade":{"data":{"exchange_id":"bitfinex","market_id":"BTC_USD","price":6231.2,"timestamp_ms":1514764800000,...}}}
//! ```
//!
//! # `global`
//!
//! The payload is a bare [`Global`] snapshot.

use serde::Deserialize;

use crate::application::ports::DecodeError;
use crate::domain::market::{Global, Trade, TradeData, TradeMessage};

/// Channel carrying per-trade coin updates.
pub const TRADES_CHANNEL: &str = "trades";

/// Channel carrying market-wide snapshots.
pub const GLOBAL_CHANNEL: &str = "global";

#[derive(Debug, Deserialize)]
struct TradeEnvelope {
    #[serde(alias = "Message")]
    message: TradeMessage,
    #[serde(default, alias = "Trade")]
    trade: TradeBody,
}

#[derive(Debug, Default, Deserialize)]
struct TradeBody {
    #[serde(default, alias = "Data")]
    data: TradeData,
}

/// Decode a `trades` payload.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not a trade envelope.
pub fn decode_trade(raw: &str) -> Result<Trade, DecodeError> {
    let envelope: TradeEnvelope = serde_json::from_str(raw)?;
    Ok(Trade {
        msg: envelope.message,
        data: envelope.trade.data,
    })
}

/// Decode a `global` payload.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not a JSON object.
pub fn decode_global(raw: &str) -> Result<Global, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(DecodeError::Unexpected(format!(
            "expected global snapshot object, got {value}"
        )));
    }
    Ok(serde_json::from_value(value)?)
}
