//! Framing shared by both endpoints.
//!
//! Every datagram starts with a channel tag. Reliable datagrams carry ARQ
//! segments; unreliable datagrams carry one message directly. Each message,
//! once extracted from its channel, starts with a message tag.
//!
//! ```text
//! | channel u8 | ARQ segments ...           |   (reliable)
//! | channel u8 | message u8 | payload ...   |   (unreliable)
//! ```

use arqlink_core::error::{ErrorKind, Result};

/// Channel tag of a datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChannelTag {
    Reliable,
    Unreliable,
}

impl ChannelTag {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ChannelTag::Reliable => 1,
            ChannelTag::Unreliable => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ChannelTag::Reliable),
            2 => Ok(ChannelTag::Unreliable),
            other => Err(ErrorKind::CouldNotReadHeader(format!("unknown channel tag {}", other))),
        }
    }
}

/// Message tag inside a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MessageTag {
    /// Handshake, sent reliably by both sides.
    Hello,
    /// Keepalive, sent reliably.
    Ping,
    /// User payload on either channel.
    Data,
    /// Close notice, sent unreliably.
    Disconnect,
}

impl MessageTag {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            MessageTag::Hello => 1,
            MessageTag::Ping => 2,
            MessageTag::Data => 3,
            MessageTag::Disconnect => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageTag::Hello),
            2 => Ok(MessageTag::Ping),
            3 => Ok(MessageTag::Data),
            4 => Ok(MessageTag::Disconnect),
            other => Err(ErrorKind::CouldNotReadHeader(format!("unknown message tag {}", other))),
        }
    }
}

/// Builds a message: tag followed by payload.
pub(crate) fn encode_message(tag: MessageTag, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(1 + payload.len());
    message.push(tag.to_u8());
    message.extend_from_slice(payload);
    message
}

/// Splits a message into its tag and payload.
pub(crate) fn decode_message(message: &[u8]) -> Result<(MessageTag, &[u8])> {
    let (&tag, payload) = message.split_first().ok_or(ErrorKind::ReceivedDataToShort)?;
    Ok((MessageTag::from_u8(tag)?, payload))
}

/// Prefixes an ARQ datagram with the reliable channel tag.
pub(crate) fn reliable_datagram(segments: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(1 + segments.len());
    datagram.push(ChannelTag::Reliable.to_u8());
    datagram.extend_from_slice(segments);
    datagram
}

/// Builds a complete unreliable datagram.
pub(crate) fn unreliable_datagram(tag: MessageTag, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(2 + payload.len());
    datagram.push(ChannelTag::Unreliable.to_u8());
    datagram.push(tag.to_u8());
    datagram.extend_from_slice(payload);
    datagram
}

/// Splits a datagram into its channel and body.
pub(crate) fn split_datagram(datagram: &[u8]) -> Result<(ChannelTag, &[u8])> {
    let (&tag, body) = datagram.split_first().ok_or(ErrorKind::ReceivedDataToShort)?;
    Ok((ChannelTag::from_u8(tag)?, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreliable_datagram_layout() {
        let datagram = unreliable_datagram(MessageTag::Data, &[7, 8]);
        assert_eq!(datagram, vec![2, 3, 7, 8]);

        let (channel, body) = split_datagram(&datagram).unwrap();
        assert_eq!(channel, ChannelTag::Unreliable);
        let (tag, payload) = decode_message(body).unwrap();
        assert_eq!(tag, MessageTag::Data);
        assert_eq!(payload, &[7, 8]);
    }

    #[test]
    fn test_empty_inputs_are_too_short() {
        assert!(matches!(split_datagram(&[]), Err(ErrorKind::ReceivedDataToShort)));
        assert!(matches!(decode_message(&[]), Err(ErrorKind::ReceivedDataToShort)));
    }

    #[test]
    fn test_unknown_tags_are_rejected() {
        assert!(matches!(split_datagram(&[9, 0]), Err(ErrorKind::CouldNotReadHeader(_))));
        assert!(matches!(decode_message(&[0]), Err(ErrorKind::CouldNotReadHeader(_))));
    }
}
