//! Keep-alive Wire Protocol
//!
//! Datagram layout:
//! [1: message type] [4: crc32 of body, LE] [N: body]
//!
//! The keep-alive shares its UDP transport with the discovery message
//! family, so every datagram carries a type tag and only
//! `BackupKeepAlive` bodies are decoded here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Size of the type tag plus checksum
pub const HEADER_SIZE: usize = 5;

/// Largest datagram the transport will read
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// UDP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    DiscoverPing = 0x01,
    DiscoverPong = 0x02,
    DiscoverFindNode = 0x03,
    DiscoverNeighbors = 0x04,
    BackupKeepAlive = 0x05,
}

impl MessageType {
    /// Parse a type tag
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(MessageType::DiscoverPing),
            0x02 => Ok(MessageType::DiscoverPong),
            0x03 => Ok(MessageType::DiscoverFindNode),
            0x04 => Ok(MessageType::DiscoverNeighbors),
            0x05 => Ok(MessageType::BackupKeepAlive),
            other => Err(Error::UnknownMessageType(other)),
        }
    }

    /// Wire value of this type
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::DiscoverPing => write!(f, "DISCOVER_PING"),
            MessageType::DiscoverPong => write!(f, "DISCOVER_PONG"),
            MessageType::DiscoverFindNode => write!(f, "DISCOVER_FIND_NODE"),
            MessageType::DiscoverNeighbors => write!(f, "DISCOVER_NEIGHBORS"),
            MessageType::BackupKeepAlive => write!(f, "BACKUP_KEEP_ALIVE"),
        }
    }
}

/// Liveness signal exchanged between members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveMessage {
    /// Sender believes it is ACTIVE
    pub flag: bool,
    /// Sender's configured priority
    pub priority: i32,
}

impl KeepAliveMessage {
    pub fn new(flag: bool, priority: i32) -> Self {
        Self { flag, priority }
    }
}

/// A decoded datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Failover keep-alive
    KeepAlive(KeepAliveMessage),
    /// Any other message on the shared transport; the body is left opaque
    Other { kind: MessageType, payload: Bytes },
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::KeepAlive(_) => MessageType::BackupKeepAlive,
            Message::Other { kind, .. } => *kind,
        }
    }

    /// Encode into a datagram
    pub fn encode(&self) -> Result<Bytes> {
        let body: Bytes = match self {
            Message::KeepAlive(keepalive) => Bytes::from(bincode::serialize(keepalive)?),
            Message::Other { payload, .. } => payload.clone(),
        };

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
        buf.put_u8(self.message_type().as_byte());
        buf.put_u32_le(crc32fast::hash(&body));
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode a datagram
    pub fn decode(mut datagram: &[u8]) -> Result<Self> {
        if datagram.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "datagram too short: {} bytes",
                datagram.len()
            )));
        }

        let kind = MessageType::from_byte(datagram.get_u8())?;
        let expected = datagram.get_u32_le();
        let actual = crc32fast::hash(datagram);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        match kind {
            MessageType::BackupKeepAlive => {
                Ok(Message::KeepAlive(bincode::deserialize(datagram)?))
            }
            _ => Ok(Message::Other {
                kind,
                payload: Bytes::copy_from_slice(datagram),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_roundtrip() {
        let msg = Message::KeepAlive(KeepAliveMessage::new(true, -7));
        let bytes = msg.encode().unwrap();

        assert_eq!(bytes[0], 0x05);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_other_kind_keeps_payload() {
        let msg = Message::Other {
            kind: MessageType::DiscoverPing,
            payload: Bytes::from_static(b"ping"),
        };
        let bytes = msg.encode().unwrap();

        match Message::decode(&bytes).unwrap() {
            Message::Other { kind, payload } => {
                assert_eq!(kind, MessageType::DiscoverPing);
                assert_eq!(&payload[..], b"ping");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_checksum_mismatch() {
        let msg = Message::KeepAlive(KeepAliveMessage::new(false, 3));
        let mut bytes = msg.encode().unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        assert!(matches!(
            Message::decode(&bytes),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_type() {
        let mut bytes = Message::KeepAlive(KeepAliveMessage::new(false, 3))
            .encode()
            .unwrap()
            .to_vec();
        bytes[0] = 0x7f;

        assert!(matches!(
            Message::decode(&bytes),
            Err(Error::UnknownMessageType(0x7f))
        ));
    }

    #[test]
    fn test_short_datagram() {
        assert!(matches!(Message::decode(&[0x05, 0x00]), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_type_display() {
        assert_eq!(MessageType::BackupKeepAlive.to_string(), "BACKUP_KEEP_ALIVE");
        assert_eq!(MessageType::from_byte(0x03).unwrap(), MessageType::DiscoverFindNode);
    }
}
