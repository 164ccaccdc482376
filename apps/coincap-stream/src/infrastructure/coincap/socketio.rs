//! Socket.IO Frame Codec
//!
//! Encoding and decoding of the Engine.IO v3 / Socket.IO text frames CoinCap
//! speaks over its WebSocket endpoint.
//!
//! # Frame Format
//!
//! Every WebSocket text frame starts with an Engine.IO packet type digit.
//! Message packets (`4`) carry a Socket.IO packet whose first digit is the
//! Socket.IO packet type:
//!
//! ```text
//! 0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":60000}
//! 40                      connected to the default namespace
//! 42["trades",{...}]      event "trades" with one argument
//! 44"not authorized"      namespace error
//! 2 / 3                   ping / pong
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame was empty.
    #[error("empty frame")]
    Empty,

    /// Unknown Engine.IO packet type.
    #[error("unknown engine packet type: {0}")]
    UnknownEnginePacket(char),

    /// Unknown Socket.IO packet type.
    #[error("unknown socket packet type: {0}")]
    UnknownSocketPacket(char),

    /// JSON body could not be parsed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event packet without an event name.
    #[error("invalid event packet: {0}")]
    InvalidEvent(String),
}

// =============================================================================
// Packets
// =============================================================================

/// Engine.IO open handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Session identifier assigned by the server.
    pub sid: String,
    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// How often the client should ping, in milliseconds.
    pub ping_interval: u64,
    /// How long the server waits for a ping, in milliseconds.
    pub ping_timeout: u64,
}

impl Handshake {
    /// Ping interval as a duration.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// Ping timeout as a duration.
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPacket {
    /// Namespace connected.
    Connect {
        /// Namespace, `/` by default.
        namespace: String,
    },
    /// Namespace disconnected by the server.
    Disconnect {
        /// Namespace, `/` by default.
        namespace: String,
    },
    /// Named event.
    Event {
        /// Namespace, `/` by default.
        namespace: String,
        /// Event name (first array element).
        name: String,
        /// First event argument as JSON text, `null` if absent.
        payload: String,
    },
    /// Acknowledgement of a client event. Not used by this client.
    Ack,
    /// Namespace error.
    Error {
        /// Namespace, `/` by default.
        namespace: String,
        /// Error body as sent by the server.
        message: String,
    },
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// Open handshake.
    Open(Handshake),
    /// Server closed the Engine.IO session.
    Close,
    /// Ping with optional probe data.
    Ping(String),
    /// Pong with optional probe data.
    Pong(String),
    /// Socket.IO packet.
    Message(SocketPacket),
    /// Transport upgrade.
    Upgrade,
    /// No-op.
    Noop,
}

// =============================================================================
// Codec
// =============================================================================

/// Text codec for Engine.IO v3 frames.
#[derive(Debug, Default, Clone)]
pub struct SocketIoCodec;

impl SocketIoCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one WebSocket text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for empty frames, unknown packet types, or malformed
    /// JSON bodies.
    pub fn decode(&self, text: &str) -> Result<EnginePacket, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(body)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => Ok(EnginePacket::Message(self.decode_socket_packet(body)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(CodecError::UnknownEnginePacket(other)),
        }
    }

    fn decode_socket_packet(&self, text: &str) -> Result<SocketPacket, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let (namespace, rest) = split_namespace(chars.as_str());

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let (name, payload) = decode_event_body(skip_ack_id(rest))?;
                Ok(SocketPacket::Event {
                    namespace,
                    name,
                    payload,
                })
            }
            '3' => Ok(SocketPacket::Ack),
            '4' => Ok(SocketPacket::Error {
                namespace,
                message: rest.to_string(),
            }),
            other => Err(CodecError::UnknownSocketPacket(other)),
        }
    }

    /// Encode a client ping.
    #[must_use]
    pub const fn ping(&self) -> &'static str {
        "2"
    }

    /// Encode a pong answering a server ping.
    #[must_use]
    pub fn pong(&self, probe: &str) -> String {
        format!("3{probe}")
    }

    /// Encode a client-side Engine.IO close.
    #[must_use]
    pub const fn close(&self) -> &'static str {
        "1"
    }
}

/// Split an optional `/namespace,` prefix from a Socket.IO body.
fn split_namespace(text: &str) -> (String, &str) {
    if text.starts_with('/') {
        match text.split_once(',') {
            Some((namespace, rest)) => (namespace.to_string(), rest),
            None => (text.to_string(), ""),
        }
    } else {
        ("/".to_string(), text)
    }
}

/// Skip the numeric ack id that may precede an event array.
fn skip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event_body(text: &str) -> Result<(String, String), CodecError> {
    let args: Vec<serde_json::Value> = serde_json::from_str(text)?;
    let mut args = args.into_iter();

    let name = match args.next() {
        Some(serde_json::Value::String(name)) => name,
        Some(other) => return Err(CodecError::InvalidEvent(format!("non-string name {other}"))),
        None => return Err(CodecError::InvalidEvent("empty argument list".to_string())),
    };

    let payload = args
        .next()
        .map_or_else(|| "null".to_string(), |value| value.to_string());

    Ok((name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_open_handshake() {
        let codec = SocketIoCodec::new();
        let frame = r#"0{"sid":"abc123","upgrades":[],"pingInterval":25000,"pingTimeout":60000}"#;

        match codec.decode(frame).unwrap() {
            EnginePacket::Open(handshake) => {
                assert_eq!(handshake.sid, "abc123");
                assert_eq!(handshake.ping_interval(), Duration::from_secs(25));
                assert_eq!(handshake.ping_timeout(), Duration::from_secs(60));
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn decode_event_with_payload() {
        let codec = SocketIoCodec::new();
        let frame = r#"42["trades",{"coin":"BTC","price":6231.2}]"#;

        match codec.decode(frame).unwrap() {
            EnginePacket::Message(SocketPacket::Event {
                namespace,
                name,
                payload,
            }) => {
                assert_eq!(namespace, "/");
                assert_eq!(name, "trades");
                let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
                assert_eq!(value["coin"], "BTC");
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn decode_event_with_namespace_and_ack_id() {
        let codec = SocketIoCodec::new();
        let frame = r#"42/feed,17["global",{"dom":51.3}]"#;

        match codec.decode(frame).unwrap() {
            EnginePacket::Message(SocketPacket::Event {
                namespace, name, ..
            }) => {
                assert_eq!(namespace, "/feed");
                assert_eq!(name, "global");
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn decode_event_without_arguments() {
        let codec = SocketIoCodec::new();

        match codec.decode(r#"42["heartbeat"]"#).unwrap() {
            EnginePacket::Message(SocketPacket::Event { payload, .. }) => {
                assert_eq!(payload, "null");
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn decode_control_packets() {
        let codec = SocketIoCodec::new();
        assert_eq!(codec.decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(
            codec.decode("3probe").unwrap(),
            EnginePacket::Pong("probe".to_string())
        );
        assert_eq!(codec.decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(codec.decode("6").unwrap(), EnginePacket::Noop);
        assert_eq!(
            codec.decode("40").unwrap(),
            EnginePacket::Message(SocketPacket::Connect {
                namespace: "/".to_string()
            })
        );
        assert_eq!(
            codec.decode("41").unwrap(),
            EnginePacket::Message(SocketPacket::Disconnect {
                namespace: "/".to_string()
            })
        );
    }

    #[test]
    fn decode_error_packet() {
        let codec = SocketIoCodec::new();
        match codec.decode(r#"44"not authorized""#).unwrap() {
            EnginePacket::Message(SocketPacket::Error { message, .. }) => {
                assert_eq!(message, r#""not authorized""#);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = SocketIoCodec::new();
        assert!(matches!(codec.decode(""), Err(CodecError::Empty)));
        assert!(matches!(
            codec.decode("9"),
            Err(CodecError::UnknownEnginePacket('9'))
        ));
        assert!(matches!(codec.decode("42[1,2]"), Err(CodecError::InvalidEvent(_))));
        assert!(matches!(codec.decode("42[oops"), Err(CodecError::Json(_))));
    }

    #[test]
    fn encode_control_frames() {
        let codec = SocketIoCodec::new();
        assert_eq!(codec.ping(), "2");
        assert_eq!(codec.pong("probe"), "3probe");
        assert_eq!(codec.close(), "1");
    }
}
