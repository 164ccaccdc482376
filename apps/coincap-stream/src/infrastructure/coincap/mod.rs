//! CoinCap Adapters
//!
//! Concrete implementations for the CoinCap service:
//!
//! - **Streaming**: Engine.IO v3 / Socket.IO over WebSocket (`socketio`,
//!   `heartbeat`, `session`) with decoders for the `trades` and `global`
//!   channels
//! - **REST**: JSON endpoints with retry (`http`, `backoff`)
//! - **Client**: [`CoincapClient`] bundling both

pub mod backoff;
pub mod client;
pub mod decoders;
pub mod heartbeat;
pub mod http;
pub mod session;
pub mod socketio;

pub use backoff::{RetryConfig, RetryPolicy};
pub use client::CoincapClient;
pub use decoders::{GLOBAL_CHANNEL, TRADES_CHANNEL, decode_global, decode_trade};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use http::{ApiClient, ApiError};
pub use session::{SessionSettings, SocketIoSession, SocketIoTransport};
pub use socketio::{CodecError, EnginePacket, Handshake, SocketIoCodec, SocketPacket};
