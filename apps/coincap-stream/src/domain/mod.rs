//! Domain Layer - Market data schemas and subscription control types.
//!
//! Pure types with serialization support and no I/O.

/// CoinCap market data types (trades, global snapshots, REST replies).
pub mod market;

/// Control signals and identity for streaming subscriptions.
pub mod subscription;
