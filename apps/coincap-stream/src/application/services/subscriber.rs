//! Subscription Controller
//!
//! Runs one streaming subscription: opens a session, wires the decoder into
//! the consumer sink, then waits for either a transport failure or a control
//! signal. A [`Control::Reset`] closes the session and opens a fresh one
//! within the same call; everything else ends the call.
//!
//! # Execution Paths
//!
//! ```text
//!   transport reader task            subscribe() task
//!   ─────────────────────            ────────────────
//!   event ─► decode ─► sink.send     select! {
//!   disconnect/error ─► failure_tx ──►   failure_rx.recv()
//!                                        control.recv()
//!                                    }
//! ```
//!
//! Decoded payloads never pass through the controller, so a consumer that
//! stops draining the sink can stall the transport but never the
//! controller's reaction to `Stop` or `Reset`.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::application::ports::{
    DecodeError, EnvelopeDecoder, EventHandler, FailureHandler, RawPayload, Session, Transport,
    TransportError, TransportFailure,
};
use crate::domain::subscription::{Control, SessionExit, SubscriptionId};
use crate::infrastructure::metrics;

/// Disconnect and error may both fire for one broken connection.
const FAILURE_CHANNEL_CAPACITY: usize = 2;

// =============================================================================
// Error Type
// =============================================================================

/// Terminal error of a subscription.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// A session could not be opened or its handlers could not be registered.
    #[error("failed to open stream session: {0}")]
    Connect(#[from] TransportError),

    /// A live session failed.
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

impl SubscribeError {
    /// Whether the subscription never got a live session on its last attempt.
    #[must_use]
    pub const fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// Drives streaming subscriptions over a [`Transport`].
///
/// Each call to [`Subscriber::subscribe`] owns its own connection; nothing is
/// shared between concurrent subscriptions.
#[derive(Debug)]
pub struct Subscriber<Tr> {
    transport: Tr,
    url: String,
}

impl<Tr: Transport> Subscriber<Tr> {
    /// Create a subscriber that dials `url` through `transport`.
    #[must_use]
    pub fn new(transport: Tr, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    /// Event source address used for every session.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &Tr {
        &self.transport
    }

    /// Subscribe to `channel` and forward decoded messages to `sink`.
    ///
    /// The returned future completes only when the subscription ends, so run
    /// it on its own task:
    ///
    /// - [`Control::Stop`], or dropping every sender of `control`, closes the
    ///   session and returns `Ok(())`.
    /// - [`Control::Reset`] closes the session and opens a new one.
    /// - [`Control::Continue`] does nothing.
    /// - A disconnect or protocol error on the live session closes it and
    ///   returns [`SubscribeError::Transport`]. There is no automatic retry;
    ///   call `subscribe` again.
    /// - If a session cannot be opened, [`SubscribeError::Connect`] is
    ///   returned without reading `control`.
    ///
    /// Payloads that fail to decode are logged and dropped.
    ///
    /// # Backpressure
    ///
    /// Messages are handed to `sink` with a blocking send on the transport's
    /// dispatch path. If the caller stops draining `sink`, the transport stops
    /// reading. Control signals are still honoured. A stalled consumer does
    /// not trip the heartbeat: the frame being dispatched already answered any
    /// outstanding ping, and no new ping goes out until dispatch resumes.
    ///
    /// # Errors
    ///
    /// See above: [`SubscribeError::Connect`] or [`SubscribeError::Transport`].
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
        let id = SubscriptionId::new();
        let span = tracing::info_span!("subscription", %id, channel);

        self.run(channel, Arc::new(decoder), sink, control)
            .instrument(span)
            .await
    }

    async fn run<T, D>(
        &self,
        channel: &str,
        decoder: Arc<D>,
        sink: mpsc::Sender<T>,
        mut control: mpsc::Receiver<Control>,
    ) -> Result<(), SubscribeError>
    where
        T: Send + 'static,
        D: EnvelopeDecoder<T>,
    {
        let channel: Arc<str> = Arc::from(channel);

        loop {
            // Fresh per session: late failures from a closed session land in
            // a dropped receiver instead of the next session's wait.
            let (failure_tx, mut failure_rx) = mpsc::channel(FAILURE_CHANNEL_CAPACITY);

            let mut session = self
                .open_session(&channel, &decoder, &sink, &failure_tx)
                .await?;
            let session_id = session.id().to_string();
            let opened_at = Instant::now();

            tracing::info!(session = %session_id, "Stream session live");
            metrics::record_session_opened(&channel);

            let exit = wait_for_exit(&mut failure_rx, &mut control).await;

            session.close().await;
            metrics::record_session_closed(&channel, exit.reason(), opened_at.elapsed());

            match exit {
                SessionExit::Reset => {
                    tracing::info!(session = %session_id, "Reset requested, reconnecting");
                    metrics::record_reset(&channel);
                }
                SessionExit::Stopped => {
                    tracing::info!(session = %session_id, "Subscription stopped");
                    return Ok(());
                }
                SessionExit::Failed(failure) => {
                    tracing::warn!(
                        session = %session_id,
                        error = %failure,
                        "Stream session failed"
                    );
                    metrics::record_transport_failure(&channel, failure.kind());
                    return Err(failure.into());
                }
            }
        }
    }

    /// Dial a session and register all three handlers.
    ///
    /// A session that was dialled but could not be set up is closed before
    /// the error is returned.
    async fn open_session<T, D>(
        &self,
        channel: &Arc<str>,
        decoder: &Arc<D>,
        sink: &mpsc::Sender<T>,
        failures: &mpsc::Sender<TransportFailure>,
    ) -> Result<Tr::Session, SubscribeError>
    where
        T: Send + 'static,
        D: EnvelopeDecoder<T>,
    {
        tracing::debug!(url = %self.url, "Opening stream session");

        let mut session = self.transport.connect(&self.url).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to open stream session");
            SubscribeError::Connect(e)
        })?;

        let registered = session
            .on_disconnect(failure_reporter(failures.clone()))
            .and_then(|()| session.on_error(failure_reporter(failures.clone())))
            .and_then(|()| {
                session.on_event(
                    channel,
                    forwarder(Arc::clone(channel), Arc::clone(decoder), sink.clone()),
                )
            });

        if let Err(e) = registered {
            tracing::warn!(error = %e, session = %session.id(), "Failed to set up stream session");
            session.close().await;
            return Err(SubscribeError::Connect(e));
        }

        Ok(session)
    }
}

/// Block until the live session must be left.
async fn wait_for_exit(
    failures: &mut mpsc::Receiver<TransportFailure>,
    control: &mut mpsc::Receiver<Control>,
) -> SessionExit<TransportFailure> {
    loop {
        tokio::select! {
            Some(failure) = failures.recv() => return SessionExit::Failed(failure),
            received = control.recv() => match Control::from_received(received) {
                Control::Continue => tracing::trace!("Continue signal, session unchanged"),
                Control::Reset => return SessionExit::Reset,
                Control::Stop => return SessionExit::Stopped,
            },
        }
    }
}

/// Event handler: decode, then hand off to the sink.
fn forwarder<T, D>(channel: Arc<str>, decoder: Arc<D>, sink: mpsc::Sender<T>) -> EventHandler
where
    T: Send + 'static,
    D: EnvelopeDecoder<T>,
{
    Arc::new(move |raw: RawPayload| {
        let decoded: Result<T, DecodeError> = decoder.decode(&raw);
        let channel = Arc::clone(&channel);
        let sink = sink.clone();

        async move {
            match decoded {
                Ok(message) => {
                    if sink.send(message).await.is_ok() {
                        metrics::record_message_forwarded(&channel);
                    } else {
                        tracing::debug!("Consumer sink closed, message discarded");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable payload");
                    metrics::record_decode_failure(&channel);
                }
            }
        }
        .boxed()
    })
}

/// Disconnect/error handler: post to the failure channel without blocking.
fn failure_reporter(failures: mpsc::Sender<TransportFailure>) -> FailureHandler {
    Arc::new(move |failure: TransportFailure| {
        if let Err(e) = failures.try_send(failure) {
            tracing::trace!(error = %e, "Failure already reported");
        }
    })
}
