//! Length-prefixed JSON frames.
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (LE)  | body: len bytes of JSON   |
//! +----------------+---------------------------+
//! ```
//!
//! Encoding is one-shot. Decoding of a stream goes through [`FrameDecoder`],
//! which is sans-IO: feed it whatever the socket produced and it hands back
//! complete bodies, keeping the parsed header across partial reads.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use netbridge_core::options::DEFAULT_MAX_FRAME_SIZE;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("Malformed body: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Encode `value` as one frame, rejecting bodies above the default limit.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    encode_with_limit(value, DEFAULT_MAX_FRAME_SIZE)
}

/// Encode `value` as one frame, rejecting bodies above `max` bytes.
pub fn encode_with_limit<T: Serialize + ?Sized>(value: &T, max: usize) -> Result<Bytes> {
    let body = serde_json::to_vec(value)?;
    let limit = max.min(u32::MAX as usize);
    if body.len() > limit {
        return Err(CodecError::FrameTooLarge {
            size: body.len(),
            max: limit,
        });
    }

    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32_le(body.len() as u32);
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

/// Decode exactly one complete frame.
///
/// Missing bytes and bytes past the declared length are both errors; use
/// [`FrameDecoder`] for streams.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: frame.len(),
        });
    }
    let (mut header, body) = frame.split_at(HEADER_LEN);
    let declared = header.get_u32_le() as usize;
    if declared > DEFAULT_MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: declared,
            max: DEFAULT_MAX_FRAME_SIZE,
        });
    }
    if body.len() < declared {
        return Err(CodecError::Truncated {
            expected: declared,
            actual: body.len(),
        });
    }
    if body.len() > declared {
        return Err(CodecError::TrailingBytes(body.len() - declared));
    }
    decode_payload(body)
}

/// Deserialize a frame body (no length prefix).
pub fn decode_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Stateful stream decoder.
///
/// Returns:
/// - `Ok(Some(body))` for each complete frame, in order
/// - `Ok(None)` when more bytes are needed
/// - `Err` on an oversized length; the stream is unusable afterwards
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
    pending_len: Option<usize>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameDecoder {
    #[must_use]
    pub const fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            pending_len: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Whether a header has been consumed and its body is still incomplete.
    #[inline]
    #[must_use]
    pub const fn is_mid_frame(&self) -> bool {
        self.pending_len.is_some()
    }

    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
                let len = src.get_u32_le() as usize;
                if len > self.max_frame_size {
                    return Err(CodecError::FrameTooLarge {
                        size: len,
                        max: self.max_frame_size,
                    });
                }
                self.pending_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.pending_len = None;
        Ok(Some(src.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<i64>,
    }

    fn sample(n: i64) -> Sample {
        Sample {
            name: format!("sample-{n}"),
            values: (0..n).collect(),
        }
    }

    #[test]
    fn test_header_matches_body_len() {
        let frame = encode(&sample(3)).unwrap();
        let declared = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(declared, frame.len() - HEADER_LEN);
        assert_eq!(&frame[4..], br#"{"name":"sample-3","values":[0,1,2]}"#);
    }

    #[test]
    fn test_decode_single_frame() {
        let frame = encode(&sample(5)).unwrap();
        let value: Sample = decode(&frame).unwrap();
        assert_eq!(value, sample(5));
    }

    #[test]
    fn test_decode_rejects_truncated_and_trailing() {
        let frame = encode(&sample(2)).unwrap();

        let short = decode::<Sample>(&frame[..frame.len() - 1]);
        assert!(matches!(short, Err(CodecError::Truncated { .. })));

        let mut long = frame.to_vec();
        long.extend_from_slice(b"xx");
        assert!(matches!(
            decode::<Sample>(&long),
            Err(CodecError::TrailingBytes(2))
        ));

        assert!(matches!(
            decode::<Sample>(&[1, 0]),
            Err(CodecError::Truncated { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_encode_limit() {
        let err = encode_with_limit(&sample(100), 16).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_stream_in_arbitrary_chunks() {
        let values: Vec<Sample> = (0..20).map(sample).collect();
        let mut wire = Vec::new();
        for v in &values {
            wire.extend_from_slice(&encode(v).unwrap());
        }

        for chunk_size in [1, 3, 7, 64, wire.len()] {
            let mut decoder = FrameDecoder::default();
            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();

            for chunk in wire.chunks(chunk_size) {
                buf.extend_from_slice(chunk);
                while let Some(body) = decoder.decode(&mut buf).unwrap() {
                    decoded.push(decode_payload::<Sample>(&body).unwrap());
                }
            }

            assert_eq!(decoded, values, "chunk size {chunk_size}");
            assert!(buf.is_empty());
            assert!(!decoder.is_mid_frame());
        }
    }

    #[test]
    fn test_header_split_across_reads() {
        let frame = encode(&sample(4)).unwrap();
        let mut decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&frame[..2]);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(!decoder.is_mid_frame());

        buf.extend_from_slice(&frame[2..6]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.is_mid_frame());

        buf.extend_from_slice(&frame[6..]);
        let body = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decode_payload::<Sample>(&body).unwrap(), sample(4));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut decoder = FrameDecoder::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u32_le(4096);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(CodecError::FrameTooLarge { size: 4096, max: 1024 })
        ));
    }

    #[test]
    fn test_negative_int32_length_rejected() {
        // A signed -1 length reads as u32::MAX.
        let mut decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&(-1_i32).to_le_bytes()[..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_malformed_body() {
        let mut frame = BytesMut::new();
        frame.put_u32_le(3);
        frame.extend_from_slice(b"{{{");
        assert!(matches!(
            decode::<Sample>(&frame),
            Err(CodecError::Malformed(_))
        ));
    }
}
