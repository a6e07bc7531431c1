//! Length-delimited frame codec for bus payloads.
//!
//! Every record travels as a `u32` big-endian length prefix followed by
//! a JSON body. The prefix lets the broker client treat payloads as
//! opaque byte records; the JSON schemas live in [`crate::messages`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Largest body a frame may carry (1 MiB).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Errors produced while framing or unframing a record.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame is truncated: expected {expected} body bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("frame length {0} exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversized(usize),

    #[error("frame is shorter than the length prefix")]
    MissingPrefix,

    #[error("body error: {0}")]
    Body(#[from] serde_json::Error),
}

/// Wrap a raw body in a length-delimited frame.
pub fn encode_frame(body: &[u8]) -> Result<Bytes, CodecError> {
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::Oversized(body.len()));
    }
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Unwrap a length-delimited frame, returning the body.
pub fn decode_frame(frame: &[u8]) -> Result<Bytes, CodecError> {
    let mut buf = frame;
    if buf.remaining() < 4 {
        return Err(CodecError::MissingPrefix);
    }
    let len = buf.get_u32() as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::Oversized(len));
    }
    if buf.remaining() < len {
        return Err(CodecError::Truncated {
            expected: len,
            got: buf.remaining(),
        });
    }
    Ok(Bytes::copy_from_slice(&buf[..len]))
}

/// Serialize a record into a framed payload.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(message)?;
    encode_frame(&body)
}

/// Deserialize a record out of a framed payload.
pub fn decode_message<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    let body = decode_frame(frame)?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ContainerMetric;

    fn sample_metric() -> ContainerMetric {
        ContainerMetric {
            timestamp: 1_700_000_000_000,
            app_id: "app-1".to_string(),
            instance_index: 2,
            cpu: 47,
            ram: 256_000_000,
            description: String::new(),
        }
    }

    #[test]
    fn message_roundtrip() {
        let metric = sample_metric();
        let frame = encode_message(&metric).unwrap();
        let decoded: ContainerMetric = decode_message(&frame).unwrap();
        assert_eq!(decoded, metric);
    }

    #[test]
    fn frame_carries_exact_length() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..4], &5u32.to_be_bytes());
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn truncated_frame_rejected() {
        let mut frame = encode_frame(b"hello").unwrap().to_vec();
        frame.truncate(frame.len() - 2);
        assert!(matches!(
            decode_frame(&frame),
            Err(CodecError::Truncated { expected: 5, got: 3 })
        ));
    }

    #[test]
    fn missing_prefix_rejected() {
        assert!(matches!(decode_frame(&[0, 1]), Err(CodecError::MissingPrefix)));
    }

    #[test]
    fn oversized_length_prefix_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        assert!(matches!(decode_frame(&frame), Err(CodecError::Oversized(_))));
    }

    #[test]
    fn garbage_body_is_a_body_error() {
        let frame = encode_frame(b"not json").unwrap();
        let result: Result<ContainerMetric, _> = decode_message(&frame);
        assert!(matches!(result, Err(CodecError::Body(_))));
    }
}
