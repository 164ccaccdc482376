//! Subscription Control Types
//!
//! The caller steers a running subscription through a control channel
//! carrying [`Control`] signals. Dropping the sending half of that channel
//! is treated exactly like [`Control::Stop`].

use std::fmt;

use uuid::Uuid;

// =============================================================================
// Control Signal
// =============================================================================

/// Command sent by the caller to an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// No-op. The current session stays up.
    Continue,
    /// Close the current session and reconnect immediately.
    ///
    /// Useful when updates have stalled without the transport noticing.
    Reset,
    /// Close the current session and end the subscription successfully.
    Stop,
}

impl Control {
    /// Interpret a value received from the control channel.
    ///
    /// `None` means every sender was dropped, which maps to [`Control::Stop`].
    #[must_use]
    pub const fn from_received(received: Option<Self>) -> Self {
        match received {
            Some(signal) => signal,
            None => Self::Stop,
        }
    }

    /// Whether this signal ends the subscription.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop)
    }

    /// Signal name for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Reset => "reset",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Identifier attached to every log line of one `subscribe` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a live session was left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit<F> {
    /// The caller asked for a reconnect.
    Reset,
    /// The caller asked to stop, or dropped the control channel.
    Stopped,
    /// The transport reported a failure.
    Failed(F),
}

impl<F> SessionExit<F> {
    /// Reason label for logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Stopped => "stop",
            Self::Failed(_) => "failure",
        }
    }
}
