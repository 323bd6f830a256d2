//! Small-message wire convention.
//!
//! A message is plain UTF-8 text. The exact 3-byte sequence `ACK` is
//! reserved as the acknowledgement token; anything else is content,
//! carried verbatim. There are no sequence numbers, retries, or ordering
//! guarantees beyond what the transport's reliable delivery provides.

use bytes::Bytes;

/// The reserved acknowledgement token.
pub const ACK_TOKEN: &[u8] = b"ACK";

/// A decoded small message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    /// Acknowledgement of a previously received content message.
    Ack,
    /// A content message carrying text.
    Text(String),
}

/// Decode received bytes.
///
/// Any payload byte-equal to the token is an acknowledgement, including
/// one a peer sent as ordinary content; the two are indistinguishable on
/// the wire. Non-UTF-8 content is decoded lossily.
pub fn decode(data: &[u8]) -> WirePayload {
    if data == ACK_TOKEN {
        WirePayload::Ack
    } else {
        WirePayload::Text(String::from_utf8_lossy(data).into_owned())
    }
}

/// Encode a content message.
pub fn encode_text(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// Encode an acknowledgement.
pub fn encode_ack() -> Bytes {
    Bytes::from_static(ACK_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_token_decodes_to_ack() {
        assert_eq!(decode(b"ACK"), WirePayload::Ack);
        assert_eq!(decode(&encode_ack()), WirePayload::Ack);
    }

    #[test]
    fn test_near_misses_are_text() {
        assert_eq!(decode(b"ACKS"), WirePayload::Text("ACKS".into()));
        assert_eq!(decode(b"ack"), WirePayload::Text("ack".into()));
        assert_eq!(decode(b"AC"), WirePayload::Text("AC".into()));
    }

    #[test]
    fn test_text_round_trip() {
        let encoded = encode_text("hello from the kitchen");
        assert_eq!(
            decode(&encoded),
            WirePayload::Text("hello from the kitchen".into())
        );
    }

    #[test]
    fn test_empty_payload_is_text() {
        assert_eq!(decode(b""), WirePayload::Text(String::new()));
    }

    #[test]
    fn test_invalid_utf8_decodes_lossily() {
        let payload = decode(&[0x68, 0x69, 0xFF]);
        match payload {
            WirePayload::Text(text) => assert!(text.starts_with("hi")),
            other => panic!("Expected Text, got {other:?}"),
        }
    }
}
