//! Configuration Module
//!
//! Configuration loading for the client and the binary.

mod settings;

pub use settings::{
    ApiSettings, ClientConfig, ConfigError, DEFAULT_API_BASE_URL, DEFAULT_STREAM_ENDPOINT,
    StreamSettings,
};
