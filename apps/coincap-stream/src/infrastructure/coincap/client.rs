//! CoinCap Client
//!
//! Bundles the REST client with a streaming [`Subscriber`] wired to the
//! Socket.IO transport and the built-in channel decoders.

use tokio::sync::mpsc;

use super::decoders::{GLOBAL_CHANNEL, TRADES_CHANNEL, decode_global, decode_trade};
use super::http::{ApiClient, ApiError};
use super::session::{SessionSettings, SocketIoTransport};
use crate::application::ports::{EnvelopeDecoder, Transport};
use crate::application::services::{SubscribeError, Subscriber};
use crate::domain::market::{Global, Trade};
use crate::domain::subscription::Control;
use crate::infrastructure::config::ClientConfig;

/// CoinCap REST and streaming client.
#[derive(Debug)]
pub struct CoincapClient<Tr = SocketIoTransport> {
    api: ApiClient,
    subscriber: Subscriber<Tr>,
}

impl CoincapClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport =
            SocketIoTransport::new(SessionSettings::from_stream_settings(&config.stream));
        Ok(Self::with_transport(
            ApiClient::new(&config.api)?,
            transport,
            config.stream.url(),
        ))
    }
}

impl<Tr: Transport> CoincapClient<Tr> {
    /// Create a client over a custom transport.
    #[must_use]
    pub fn with_transport(api: ApiClient, transport: Tr, url: impl Into<String>) -> Self {
        Self {
            api,
            subscriber: Subscriber::new(transport, url),
        }
    }

    /// REST endpoints.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Streaming subscriber.
    #[must_use]
    pub const fn subscriber(&self) -> &Subscriber<Tr> {
        &self.subscriber
    }

    /// Stream the `trades` channel into `sink`.
    ///
    /// # Errors
    ///
    /// See [`Subscriber::subscribe`].
    pub async fn subscribe_trades(
        &self,
        sink: mpsc::Sender<Trade>,
        control: mpsc::Receiver<Control>,
    ) -> Result<(), SubscribeError> {
        self.subscriber
            .subscribe(TRADES_CHANNEL, decode_trade, sink, control)
            .await
    }

    /// Stream the `global` channel into `sink`.
    ///
    /// # Errors
    ///
    /// See [`Subscriber::subscribe`].
    pub async fn subscribe_global(
        &self,
        sink: mpsc::Sender<Global>,
        control: mpsc::Receiver<Control>,
    ) -> Result<(), SubscribeError> {
        self.subscriber
            .subscribe(GLOBAL_CHANNEL, decode_global, sink, control)
            .await
    }

    /// Stream any named channel with a caller-supplied decoder.
    ///
    /// # Errors
    ///
    /// See [`Subscriber::subscribe`].
    pub async fn subscribe<T, D>(
        &self,
        channel: &str,
        decoder: D,
        sink: mpsc::Sender<T>,
        control: mpsc::Receiver<Control>,
    ) -> Result<(), SubscribeError>
    where
        T: Send + 'static,
        D: EnvelopeDecoder<T>,
    {
        self.subscriber.subscribe(channel, decoder, sink, control).await
    }
}
