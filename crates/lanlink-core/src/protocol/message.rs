//! Text codec for LAN-Link discovery and keepalive messages.
//!
//! Wire format: one JSON object per datagram (or per line on the stream
//! channel), never containing a raw line break:
//!
//! ```text
//! {"msg":"ping"}
//! {"msg":"heartbeat"}
//! {"ip":"10.0.0.2","port":"5000"}
//! ```
//!
//! A payload with a `msg` field is a keepalive; a payload without one is an
//! endpoint announcement carrying the `ip` and `port` of a peer's stream
//! listener.
//!
//! # Lenient decoding
//!
//! Discovery runs over broadcast, so anything on the segment may land on the
//! port.  Decoding therefore accepts as much as it reasonably can:
//!
//! - Missing `ip` / `port` fields decode as empty strings.
//! - Field values need not be strings: `"port":5000` and `"ip":10` are
//!   read as their JSON text.
//! - Unknown fields are ignored.
//! - An unrecognised `msg` value decodes to [`DiscoveryMessage::Unknown`].
//!
//! Only payloads that are not a JSON object at all produce a [`ProtocolError`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::endpoint::Endpoint;

/// `msg` value of a stream keepalive.
pub const PING: &str = "ping";

/// `msg` value of a datagram keepalive.
pub const HEARTBEAT: &str = "heartbeat";

/// Misspelt keepalive value emitted by older peers; decoded as [`HEARTBEAT`].
const LEGACY_HEARTBEAT: &str = "heartbreak";

/// Errors that can occur while decoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload contained no text.
    #[error("payload is empty")]
    Empty,

    /// The payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The payload is not valid JSON, or a known field has the wrong type.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is valid JSON but not a key-value object.
    #[error("payload is not a key-value object")]
    NotAnObject,
}

/// A decoded discovery or keepalive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// Stream channel keepalive.
    Ping,
    /// Datagram channel keepalive (also used to answer pings on a stream).
    Heartbeat,
    /// A peer announcing where its stream listener can be reached.
    ///
    /// Fields are kept as the raw strings from the wire; use
    /// [`DiscoveryMessage::endpoint`] to validate them.
    Announce { ip: String, port: String },
    /// A `msg` value this version does not understand.
    Unknown(String),
}

/// Field layout shared by every message kind.
#[derive(Debug, Default, Deserialize)]
struct WireFields {
    #[serde(default, deserialize_with = "lenient_text")]
    msg: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    port: Option<String>,
}

/// Accepts any JSON value for a text field: strings as-is, `null` as absent,
/// anything else (`5000`, `true`, ...) in its JSON rendering.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl DiscoveryMessage {
    /// Builds an announcement for `endpoint`.
    pub fn announce(endpoint: &Endpoint) -> Self {
        Self::Announce {
            ip: endpoint.host().to_string(),
            port: endpoint.port().to_string(),
        }
    }

    /// Encodes the message as a single-line JSON object.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanlink_core::DiscoveryMessage;
    ///
    /// assert_eq!(DiscoveryMessage::Ping.encode(), r#"{"msg":"ping"}"#);
    /// ```
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Ping => json!({ "msg": PING }),
            Self::Heartbeat => json!({ "msg": HEARTBEAT }),
            Self::Announce { ip, port } => json!({ "ip": ip, "port": port }),
            Self::Unknown(msg) => json!({ "msg": msg }),
        };
        value.to_string()
    }

    /// Decodes a message from text.  Surrounding whitespace (including the
    /// trailing newline of a stream line) is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the text is empty, is not JSON, or is
    /// JSON but not an object.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        let fields = WireFields::deserialize(value)?;

        Ok(match fields.msg.as_deref() {
            Some(PING) => Self::Ping,
            Some(HEARTBEAT) | Some(LEGACY_HEARTBEAT) => Self::Heartbeat,
            Some(other) => Self::Unknown(other.to_string()),
            None => Self::Announce {
                ip: fields.ip.unwrap_or_default(),
                port: fields.port.unwrap_or_default(),
            },
        })
    }

    /// Decodes a message from raw datagram bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidUtf8`] for non-UTF-8 input, otherwise
    /// the same errors as [`DiscoveryMessage::decode`].
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(std::str::from_utf8(bytes)?)
    }

    /// Returns `true` for the two keepalive kinds.
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Self::Ping | Self::Heartbeat)
    }

    /// Validates an announcement into an [`Endpoint`].
    ///
    /// Returns `None` for non-announcement kinds, and `Some(Err(..))` when the
    /// announcement's address or port is missing or unusable.
    pub fn endpoint(&self) -> Option<Result<Endpoint, crate::EndpointError>> {
        match self {
            Self::Announce { ip, port } => Some(Endpoint::parse(ip, port)),
            _ => None,
        }
    }

    /// Short name of the message kind, for log lines.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Ping => PING,
            Self::Heartbeat => HEARTBEAT,
            Self::Announce { .. } => "announce",
            Self::Unknown(msg) => msg,
        }
    }
}

impl FromStr for DiscoveryMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for DiscoveryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ping_is_compact_single_line() {
        // Arrange / Act
        let text = DiscoveryMessage::Ping.encode();

        // Assert
        assert_eq!(text, r#"{"msg":"ping"}"#);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_encode_heartbeat_uses_heartbeat_kind() {
        assert_eq!(DiscoveryMessage::Heartbeat.encode(), r#"{"msg":"heartbeat"}"#);
    }

    #[test]
    fn test_decode_announcement_with_string_port() {
        // Arrange
        let text = r#"{"ip":"10.0.0.2","port":"5000"}"#;

        // Act
        let msg = DiscoveryMessage::decode(text).unwrap();

        // Assert
        assert_eq!(
            msg,
            DiscoveryMessage::Announce {
                ip: "10.0.0.2".to_string(),
                port: "5000".to_string()
            }
        );
    }

    #[test]
    fn test_decode_announcement_with_numeric_port() {
        let msg = DiscoveryMessage::decode(r#"{"ip":"10.0.0.2","port":5000}"#).unwrap();
        assert_eq!(
            msg,
            DiscoveryMessage::Announce {
                ip: "10.0.0.2".to_string(),
                port: "5000".to_string()
            }
        );
    }

    #[test]
    fn test_decode_missing_fields_default_to_empty() {
        // Arrange / Act
        let msg = DiscoveryMessage::decode(r#"{"ip":"10.0.0.2"}"#).unwrap();

        // Assert
        assert_eq!(
            msg,
            DiscoveryMessage::Announce {
                ip: "10.0.0.2".to_string(),
                port: String::new()
            }
        );
    }

    #[test]
    fn test_decode_non_string_ip_is_coerced_to_text() {
        // Arrange
        let text = r#"{"ip":10,"port":5000}"#;

        // Act
        let msg = DiscoveryMessage::decode(text).unwrap();

        // Assert
        assert_eq!(
            msg,
            DiscoveryMessage::Announce {
                ip: "10".to_string(),
                port: "5000".to_string()
            }
        );
    }

    #[test]
    fn test_decode_null_fields_are_absent() {
        let msg = DiscoveryMessage::decode(r#"{"msg":null,"ip":"10.0.0.2","port":null}"#).unwrap();
        assert_eq!(
            msg,
            DiscoveryMessage::Announce {
                ip: "10.0.0.2".to_string(),
                port: String::new()
            }
        );
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let msg = DiscoveryMessage::decode(r#"{"msg":"ping","imei":"123","v":7}"#).unwrap();
        assert_eq!(msg, DiscoveryMessage::Ping);
    }

    #[test]
    fn test_decode_legacy_heartbeat_spelling() {
        let msg = DiscoveryMessage::decode(r#"{"msg":"heartbreak"}"#).unwrap();
        assert_eq!(msg, DiscoveryMessage::Heartbeat);
    }

    #[test]
    fn test_decode_unrecognised_msg_is_unknown() {
        let msg = DiscoveryMessage::decode(r#"{"msg":"hello"}"#).unwrap();
        assert_eq!(msg, DiscoveryMessage::Unknown("hello".to_string()));
        assert!(msg.endpoint().is_none());
    }

    #[test]
    fn test_decode_trims_trailing_newline() {
        let msg = DiscoveryMessage::decode("{\"msg\":\"ping\"}\r\n").unwrap();
        assert_eq!(msg, DiscoveryMessage::Ping);
    }

    #[test]
    fn test_decode_empty_payload_is_error() {
        assert!(matches!(
            DiscoveryMessage::decode("  \n"),
            Err(ProtocolError::Empty)
        ));
    }

    #[test]
    fn test_decode_non_json_is_malformed() {
        assert!(matches!(
            DiscoveryMessage::decode("ip=10.0.0.2;port=5000"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_json_array_is_not_an_object() {
        assert!(matches!(
            DiscoveryMessage::decode(r#"[null,"10.0.0.2","5000"]"#),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            DiscoveryMessage::decode_bytes(&[0xFF, 0xFE, 0x7B]),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_endpoint_from_announcement() {
        // Arrange
        let msg = DiscoveryMessage::Announce {
            ip: "192.168.43.1".to_string(),
            port: "8989".to_string(),
        };

        // Act
        let endpoint = msg.endpoint().unwrap().unwrap();

        // Assert
        assert_eq!(endpoint.host(), "192.168.43.1");
        assert_eq!(endpoint.port(), 8989);
    }

    #[test]
    fn test_endpoint_from_keepalive_is_none() {
        assert!(DiscoveryMessage::Ping.endpoint().is_none());
        assert!(DiscoveryMessage::Heartbeat.endpoint().is_none());
    }

    #[test]
    fn test_is_keepalive() {
        assert!(DiscoveryMessage::Ping.is_keepalive());
        assert!(DiscoveryMessage::Heartbeat.is_keepalive());
        assert!(!DiscoveryMessage::Unknown("x".into()).is_keepalive());
    }
}
