//! ZeroMQ envelope helpers.
//!
//! Between the broker and a worker every message is a three-frame
//! multipart: `[identity][empty][payload]`. The identity frame is
//! prepended by the frontend ROUTER socket and must round-trip unchanged
//! so the reply finds its way back to the issuing client; the empty
//! delimiter frame is added by the client's REQ socket.

use bytes::Bytes;
use thiserror::Error;
use zeromq::ZmqMessage;

/// Transport-layer failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure.
    #[error("socket error: {0}")]
    Zmq(#[from] zeromq::ZmqError),
    /// A multipart message had too few frames to carry an envelope.
    #[error("malformed envelope: expected at least 2 frames, got {0}")]
    ShortEnvelope(usize),
}

/// A routed request or reply: the client identity plus the JSON payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Opaque routing identity assigned by the ROUTER socket.
    pub identity: Bytes,
    /// UTF-8 JSON payload.
    pub payload: Bytes,
}

impl Envelope {
    /// Split a received multipart message into identity and payload.
    ///
    /// The payload is the last frame; anything between identity and
    /// payload (the REQ delimiter) is ignored. A delimiter-less
    /// two-frame message is accepted for the benefit of bare DEALER
    /// clients.
    ///
    /// # Errors
    /// Returns an error when the message has fewer than two frames.
    pub fn parse(message: &ZmqMessage) -> Result<Self, TransportError> {
        let frames: Vec<&Bytes> = message.iter().collect();
        if frames.len() < 2 {
            return Err(TransportError::ShortEnvelope(frames.len()));
        }
        Ok(Self {
            identity: frames[0].clone(),
            payload: frames[frames.len() - 1].clone(),
        })
    }

    /// Build the three-frame reply envelope for this identity.
    #[must_use]
    pub fn reply(&self, payload: impl Into<Bytes>) -> ZmqMessage {
        let mut message = ZmqMessage::from(self.identity.to_vec());
        message.push_back(Bytes::new());
        message.push_back(payload.into());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_frames(identity: &[u8], payload: &[u8]) -> ZmqMessage {
        let mut message = ZmqMessage::from(identity.to_vec());
        message.push_back(Bytes::new());
        message.push_back(Bytes::copy_from_slice(payload));
        message
    }

    #[test]
    fn parse_extracts_identity_and_payload() {
        let message = three_frames(b"client-7", b"{\"method\":\"about\"}");
        let envelope = Envelope::parse(&message).unwrap();
        assert_eq!(&envelope.identity[..], b"client-7");
        assert_eq!(&envelope.payload[..], b"{\"method\":\"about\"}");
    }

    #[test]
    fn parse_rejects_short_messages() {
        let message = ZmqMessage::from("only-one-frame");
        assert!(matches!(
            Envelope::parse(&message),
            Err(TransportError::ShortEnvelope(1))
        ));
    }

    #[test]
    fn reply_round_trips_the_identity() {
        let request = three_frames(b"client-9", b"{}");
        let envelope = Envelope::parse(&request).unwrap();
        let reply = envelope.reply(Bytes::from_static(b"{\"success\":0}"));
        let parsed = Envelope::parse(&reply).unwrap();
        assert_eq!(&parsed.identity[..], b"client-9");
        assert_eq!(&parsed.payload[..], b"{\"success\":0}");
    }
}
