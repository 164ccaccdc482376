//! Application Services
//!
//! - `Subscriber`: runs one streaming subscription to completion

mod subscriber;

pub use subscriber::{SubscribeError, Subscriber};
