//! Length-prefixed msgpack wire framing (§6).
//!
//! Frame shape: `[4-byte big-endian length][msgpack body]`. The body is
//! `{type: u8, payload: map}` for every message named in the protocol
//! table. Decoding enforces the size ceilings from §6 before any
//! structure is handed to a caller.

use std::io::Write;

use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::error::{PrimitivesError, PrimitivesResult};

/// Maximum size, in bytes, of a single framed wire message.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;
/// Maximum number of entries in any msgpack map encountered while decoding.
pub const MAX_MAP_LEN: usize = 1 << 16;
/// Maximum number of elements in any msgpack array encountered while decoding.
pub const MAX_ARRAY_LEN: usize = 1 << 16;
/// Maximum length, in bytes, of any msgpack string encountered while decoding.
pub const MAX_STRING_LEN: usize = 1 << 20;
/// Maximum length, in bytes, of any msgpack binary blob encountered while decoding.
pub const MAX_BINARY_LEN: usize = 1 << 20;

/// Stable numeric message type ids (§6).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Ping = 0,
    Pong = 1,
    SearchRequest = 10,
    SearchResponse = 11,
    IndexPublish = 20,
    IndexAck = 21,
    IndexQuery = 22,
    IndexQueryResponse = 23,
    CrawlAssign = 30,
    CrawlLock = 31,
    CrawlUnlock = 32,
    CrawlAckA = 33,
    CrawlAckB = 34,
    ReplicateRequest = 40,
    ReplicateResponse = 41,
    AttestationPublish = 50,
    AttestationAck = 51,
    KeyRevocation = 60,
    KeyRevocationAck = 61,
    CreditProofRequest = 70,
    CreditProofResponse = 71,
    CreditSyncAnnounce = 72,
    CreditSyncExchange = 73,
    IndexSubmit = 80,
    IndexSubmitAck = 81,
    PexRequest = 90,
    PexResponse = 91,
    Error = 99,
    SignedEnvelope = 100,
}

impl TryFrom<u8> for MessageType {
    type Error = PrimitivesError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Ping,
            1 => Self::Pong,
            10 => Self::SearchRequest,
            11 => Self::SearchResponse,
            20 => Self::IndexPublish,
            21 => Self::IndexAck,
            22 => Self::IndexQuery,
            23 => Self::IndexQueryResponse,
            30 => Self::CrawlAssign,
            31 => Self::CrawlLock,
            32 => Self::CrawlUnlock,
            33 => Self::CrawlAckA,
            34 => Self::CrawlAckB,
            40 => Self::ReplicateRequest,
            41 => Self::ReplicateResponse,
            50 => Self::AttestationPublish,
            51 => Self::AttestationAck,
            60 => Self::KeyRevocation,
            61 => Self::KeyRevocationAck,
            70 => Self::CreditProofRequest,
            71 => Self::CreditProofResponse,
            72 => Self::CreditSyncAnnounce,
            73 => Self::CreditSyncExchange,
            80 => Self::IndexSubmit,
            81 => Self::IndexSubmitAck,
            90 => Self::PexRequest,
            91 => Self::PexResponse,
            99 => Self::Error,
            100 => Self::SignedEnvelope,
            other => return Err(PrimitivesError::UnknownMessageType(other)),
        })
    }
}

/// A decoded wire message: its type tag plus an arbitrary msgpack payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: u8,
    pub payload: Value,
}

/// Encode `body` (any `Serialize` payload) as a length-prefixed msgpack
/// frame tagged with `kind`.
pub fn encode_frame<T: Serialize>(kind: MessageType, body: &T) -> PrimitivesResult<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(body)?;
    let payload_value: Value = rmp_serde::from_slice(&payload)?;

    let message = WireMessage {
        kind: kind as u8,
        payload: payload_value,
    };

    let encoded = rmp_serde::to_vec_named(&message)?;
    if encoded.len() > MAX_MESSAGE_BYTES {
        return Err(PrimitivesError::MessageTooLarge {
            max: MAX_MESSAGE_BYTES,
            actual: encoded.len(),
        });
    }

    let mut framed = Vec::with_capacity(encoded.len() + 4);
    framed
        .write_all(&(encoded.len() as u32).to_be_bytes())
        .expect("writing to a Vec cannot fail");
    framed
        .write_all(&encoded)
        .expect("writing to a Vec cannot fail");
    Ok(framed)
}

/// Split a single frame off the front of `buf`, returning the decoded
/// message and the number of bytes consumed, or `None` if `buf` does not
/// yet contain a full frame.
pub fn decode_frame(buf: &[u8]) -> PrimitivesResult<Option<(MessageType, Value, usize)>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_MESSAGE_BYTES {
        return Err(PrimitivesError::MessageTooLarge {
            max: MAX_MESSAGE_BYTES,
            actual: len,
        });
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }

    let body = &buf[4..4 + len];
    let message: WireMessage = rmp_serde::from_slice(body)?;
    let kind = MessageType::try_from(message.kind)?;

    check_value_limits(&message.payload)?;

    Ok(Some((kind, message.payload, 4 + len)))
}

/// Recursively enforce the collection/string-size ceilings from §6 over an
/// already-decoded msgpack value tree.
fn check_value_limits(value: &Value) -> PrimitivesResult<()> {
    match value {
        Value::String(s) => {
            let raw = s.as_bytes().map_or(0, <[u8]>::len);
            if raw > MAX_STRING_LEN {
                return Err(PrimitivesError::TruncatedFrame {
                    expected: MAX_STRING_LEN,
                    actual: raw,
                });
            }
        }
        Value::Binary(bin) => {
            if bin.len() > MAX_BINARY_LEN {
                return Err(PrimitivesError::TruncatedFrame {
                    expected: MAX_BINARY_LEN,
                    actual: bin.len(),
                });
            }
        }
        Value::Array(items) => {
            if items.len() > MAX_ARRAY_LEN {
                return Err(PrimitivesError::TruncatedFrame {
                    expected: MAX_ARRAY_LEN,
                    actual: items.len(),
                });
            }
            for item in items {
                check_value_limits(item)?;
            }
        }
        Value::Map(entries) => {
            if entries.len() > MAX_MAP_LEN {
                return Err(PrimitivesError::TruncatedFrame {
                    expected: MAX_MAP_LEN,
                    actual: entries.len(),
                });
            }
            for (key, val) in entries {
                check_value_limits(key)?;
                check_value_limits(val)?;
            }
        }
        Value::Nil
        | Value::Boolean(_)
        | Value::Integer(_)
        | Value::F32(_)
        | Value::F64(_)
        | Value::Ext(_, _) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
    struct Ping {
        nonce: u64,
    }

    #[test]
    fn frame_round_trips() {
        let body = Ping { nonce: 42 };
        let framed = encode_frame(MessageType::Ping, &body).expect("encode");
        let (kind, payload, consumed) = decode_frame(&framed).expect("decode").expect("full frame");
        assert_eq!(kind, MessageType::Ping);
        assert_eq!(consumed, framed.len());
        let decoded: Ping = rmpv::ext::from_value(payload).expect("deserialize payload");
        assert_eq!(decoded, body);
    }

    #[test]
    fn partial_frame_returns_none() {
        let body = Ping { nonce: 7 };
        let framed = encode_frame(MessageType::Ping, &body).expect("encode");
        let partial = &framed[..framed.len() - 1];
        assert!(decode_frame(partial).expect("decode").is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = vec![0u8; 4];
        buf[0..4].copy_from_slice(&((MAX_MESSAGE_BYTES + 1) as u32).to_be_bytes());
        assert!(decode_frame(&buf).is_err());
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let body = Ping { nonce: 1 };
        let payload = rmp_serde::to_vec_named(&body).expect("encode payload");
        let payload_value: Value = rmp_serde::from_slice(&payload).expect("reparse payload");
        let message = WireMessage {
            kind: 250,
            payload: payload_value,
        };
        let encoded = rmp_serde::to_vec_named(&message).expect("encode message");
        let mut framed = Vec::new();
        framed.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        framed.extend_from_slice(&encoded);
        assert!(decode_frame(&framed).is_err());
    }
}
