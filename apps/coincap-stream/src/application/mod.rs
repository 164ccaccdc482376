//! Application Layer - Port definitions and the subscription controller.
//!
//! This layer defines the interfaces (ports) the controller depends on and
//! the reconnect loop that drives them.

/// Port interfaces for transports, sessions and decoders.
pub mod ports;

/// The subscription controller.
pub mod services;
