#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::cast_precision_loss,
        clippy::items_after_statements
    )
)]

//! CoinCap Stream - Market Data Subscriptions
//!
//! A client for CoinCap's push-based market data feed and its REST API.
//! The core is a subscription controller that keeps one live Socket.IO
//! session per subscription, forwards decoded messages to a bounded sink, and
//! reacts to caller control signals (`Continue`, `Reset`, `Stop`).
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Data types with no I/O
//!   - `market`: Trade, global and REST schemas
//!   - `subscription`: Control signal and subscription identity
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport/Session traits, handler types, error taxonomy
//!   - `services`: The subscription controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `coincap`: Socket.IO transport, decoders, REST client
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus counters
//!   - `telemetry`: Tracing setup
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐  decode   ┌────────────┐
//! CoinCap WS ───────►│   Session    │──────────►│ sink (mpsc)│──► consumer
//!                    │ reader task  │           └────────────┘
//!                    └──────┬───────┘
//!                           │ disconnect / error
//!                           ▼
//!                    ┌──────────────┐◄── control (mpsc) ◄── consumer
//!                    │  Subscriber  │
//!                    └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{
    Front, Global, History, HistoryInterval, HistoryPoint, Mapping, Page, RawTrade, Trade,
    TradeData, TradeMessage,
};
pub use domain::subscription::{Control, SessionExit, SubscriptionId};

// Ports and controller
pub use application::ports::{
    DecodeError, EnvelopeDecoder, EventHandler, FailureHandler, HandlerKind, RawPayload, Session,
    Transport, TransportError, TransportFailure,
};
pub use application::services::{SubscribeError, Subscriber};

// CoinCap adapters
pub use infrastructure::coincap::{
    ApiClient, ApiError, CoincapClient, GLOBAL_CHANNEL, SocketIoTransport, TRADES_CHANNEL,
    decode_global, decode_trade,
};

// Infrastructure config
pub use infrastructure::config::{ApiSettings, ClientConfig, ConfigError, StreamSettings};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
