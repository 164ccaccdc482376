//! Port Interfaces
//!
//! Contracts between the subscription controller and the outside world,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`]: dials one push-based event source connection
//! - [`Session`]: one live connection with handler registration
//! - [`EnvelopeDecoder`]: turns a raw named-event payload into a typed message
//!
//! The Socket.IO adapters in `infrastructure::coincap` implement these for
//! the real service; integration tests provide in-memory doubles.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

// =============================================================================
// Handler Types
// =============================================================================

/// Raw payload of a named event, as JSON text.
pub type RawPayload = String;

/// Handler invoked by the session for every event on a registered name.
///
/// The returned future is awaited by the session's own dispatch loop before
/// the next event is read, so a slow future slows down the transport.
pub type EventHandler = Arc<dyn Fn(RawPayload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler invoked when the session disconnects or hits a protocol error.
pub type FailureHandler = Arc<dyn Fn(TransportFailure) + Send + Sync>;

/// Handler slot names, used in registration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Named event handler.
    Event,
    /// Disconnect handler.
    Disconnect,
    /// Error handler.
    Error,
}

impl HandlerKind {
    /// Slot name for messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure to establish a session. Nothing was delivered yet.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be dialled.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The connection opened but the protocol handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A handler could not be registered on the session.
    #[error("failed to set up {kind} handler: {reason}")]
    Registration {
        /// Which handler slot failed.
        kind: HandlerKind,
        /// Why it failed.
        reason: String,
    },

    /// The session was already closed.
    #[error("session is closed")]
    Closed,
}

/// Failure of a session that was already live.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    /// The remote end went away.
    #[error("stream disconnected on session {session}: {reason}")]
    Disconnected {
        /// Session identifier.
        session: String,
        /// What ended the connection.
        reason: String,
    },

    /// The connection produced an error or an unreadable frame.
    #[error("stream error on session {session}: {reason}")]
    Protocol {
        /// Session identifier.
        session: String,
        /// Error description.
        reason: String,
    },
}

impl TransportFailure {
    /// Identifier of the session that failed.
    #[must_use]
    pub fn session(&self) -> &str {
        match self {
            Self::Disconnected { session, .. } | Self::Protocol { session, .. } => session,
        }
    }

    /// Failure label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Disconnected { .. } => "disconnected",
            Self::Protocol { .. } => "protocol",
        }
    }
}

/// A payload that could not be turned into a domain message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload was not valid JSON for the expected shape.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed but does not carry the expected content.
    #[error("unexpected payload: {0}")]
    Unexpected(String),
}

// =============================================================================
// Transport Ports
// =============================================================================

/// Dials sessions to a push-based event source.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Session type produced by this transport.
    type Session: Session + 'static;

    /// Open a new session to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Dial`] or [`TransportError::Handshake`] when
    /// the connection cannot be established.
    async fn connect(&self, url: &str) -> Result<Self::Session, TransportError>;
}

/// One live connection to the event source.
///
/// A session is used for exactly one connection and is never reopened.
/// Failures that occur before the matching handler is registered must be
/// reported as soon as it is.
#[async_trait]
pub trait Session: Send {
    /// Identifier for logs.
    fn id(&self) -> &str;

    /// Register the handler for events named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the session is closed or already has a
    /// handler for `name`.
    fn on_event(&mut self, name: &str, handler: EventHandler) -> Result<(), TransportError>;

    /// Register the handler fired when the remote end disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the session is closed.
    fn on_disconnect(&mut self, handler: FailureHandler) -> Result<(), TransportError>;

    /// Register the handler fired on protocol or socket errors.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the session is closed.
    fn on_error(&mut self, handler: FailureHandler) -> Result<(), TransportError>;

    /// Close the session. Closing twice is a no-op.
    async fn close(&mut self);
}

// =============================================================================
// Decoder Port
// =============================================================================

/// Converts a raw named-event payload into a typed message.
pub trait EnvelopeDecoder<T>: Send + Sync + 'static {
    /// Decode one payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload does not match the expected shape.
    fn decode(&self, raw: &str) -> Result<T, DecodeError>;
}

impl<T, F> EnvelopeDecoder<T> for F
where
    F: Fn(&str) -> Result<T, DecodeError> + Send + Sync + 'static,
{
    fn decode(&self, raw: &str) -> Result<T, DecodeError> {
        self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_decoders() {
        let decoder = |raw: &str| -> Result<usize, DecodeError> { Ok(raw.len()) };
        assert_eq!(EnvelopeDecoder::decode(&decoder, "abc").unwrap(), 3);
    }

    #[test]
    fn failure_accessors() {
        let failure = TransportFailure::Protocol {
            session: "abc".to_string(),
            reason: "bad frame".to_string(),
        };
        assert_eq!(failure.session(), "abc");
        assert_eq!(failure.kind(), "protocol");
        assert!(failure.to_string().contains("bad frame"));
    }

    #[test]
    fn registration_error_names_handler() {
        let err = TransportError::Registration {
            kind: HandlerKind::Disconnect,
            reason: "closed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to set up disconnect handler: closed"
        );
    }
}
