//! Peer message and its wire encoding
//!
//! Exactly one message travels per TCP connection: the sender connects,
//! writes a single JSON object and closes. The object is self-delimiting, so
//! the receiver simply reads to end-of-stream and decodes.

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::peers::NodeId;

/// Largest payload a receiver will accept for one message
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// The only payload exchanged between peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// Id of the sending node
    #[serde(rename = "pid")]
    pub sender_id: NodeId,
    /// Sender's clock value after counting the send as an event
    pub clock: u64,
}

impl Message {
    pub fn new(sender_id: NodeId, clock: u64) -> Self {
        Self { sender_id, clock }
    }

    /// Encode for transmission
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode one message from the full contents of a connection
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let text = std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidFormat {
            reason: format!("payload is not UTF-8: {}", e),
        })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }

        let message: Message = serde_json::from_str(text)?;
        // The receiver must be able to move past the carried value
        if message.clock == u64::MAX {
            return Err(ProtocolError::InvalidFormat {
                reason: format!("clock {} cannot be advanced", message.clock),
            });
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let msg = Message::new(3, 41);
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_wire_field_names() {
        let json: serde_json::Value = serde_json::from_slice(&Message::new(1, 2).encode().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "pid": 1, "clock": 2 }));
    }

    #[test]
    fn test_decode_tolerates_surrounding_whitespace() {
        let msg = Message::decode(b"  {\"pid\": 2, \"clock\": 9}\n").unwrap();
        assert_eq!(msg, Message::new(2, 9));
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(Message::decode(b""), Err(ProtocolError::EmptyPayload)));
        assert!(matches!(Message::decode(b" \n"), Err(ProtocolError::EmptyPayload)));
    }

    #[test]
    fn test_malformed_payloads() {
        let cases: &[&[u8]] = &[
            b"not json",
            b"{\"pid\": 1}",
            b"{\"pid\": 1, \"clock\": -4}",
            b"{\"pid\": \"one\", \"clock\": 4}",
            b"{\"pid\": 1, \"clock\": 4, \"extra\": true}",
        ];

        for case in cases {
            assert!(
                matches!(Message::decode(case), Err(ProtocolError::SerializationError { .. })),
                "expected failure for {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_clock_at_maximum_is_rejected() {
        let payload = format!("{{\"pid\": 1, \"clock\": {}}}", u64::MAX);
        assert!(matches!(
            Message::decode(payload.as_bytes()),
            Err(ProtocolError::InvalidFormat { .. })
        ));

        let payload = format!("{{\"pid\": 1, \"clock\": {}}}", u64::MAX - 1);
        assert_eq!(
            Message::decode(payload.as_bytes()).unwrap(),
            Message::new(1, u64::MAX - 1)
        );
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            Message::decode(&[0xff, 0xfe]),
            Err(ProtocolError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_oversize_payload() {
        let big = vec![b' '; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            Message::decode(&big),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
