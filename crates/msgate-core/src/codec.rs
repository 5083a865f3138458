//! CBOR encoding and length-prefixed framing.
//!
//! WebSocket frames carry a bare CBOR envelope (the WS layer delimits
//! messages). The RelayService RPC stream is a plain TCP byte stream and uses
//! `[4-byte big-endian length][CBOR payload]` framing.

use crate::error::{GateError, GateResult};
use std::io::Cursor;

/// Largest RPC frame payload accepted by [`FrameDecoder`] (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encode a serializable value as bare CBOR.
pub fn cbor_encode<T: serde::Serialize>(value: &T) -> GateResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;
    Ok(payload)
}

/// Encode a serializable value into a length-prefixed CBOR frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> GateResult<Vec<u8>> {
    let payload = cbor_encode(value)?;

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Decode a CBOR payload (without length prefix) into a typed value.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> GateResult<T> {
    let cursor = Cursor::new(data);
    let value: T = ciborium::from_reader(cursor)?;
    Ok(value)
}

/// Streaming frame decoder: accumulates bytes and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed raw bytes and return complete raw frames (undecoded CBOR payloads).
    ///
    /// Errors if a length prefix announces more than [`MAX_FRAME_LEN`] bytes;
    /// the stream cannot be resynchronised after that.
    pub fn feed_raw(&mut self, data: &[u8]) -> GateResult<Vec<Vec<u8>>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        while self.buffer.len() >= 4 {
            let len =
                u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                    as usize;
            if len > MAX_FRAME_LEN {
                return Err(GateError::Codec(format!(
                    "frame too large: {len} bytes (max {MAX_FRAME_LEN})"
                )));
            }
            if self.buffer.len() < 4 + len {
                break;
            }

            frames.push(self.buffer[4..4 + len].to_vec());
            self.buffer.drain(..4 + len);
        }

        Ok(frames)
    }

    /// Feed bytes into the decoder and return all complete CBOR-decoded messages.
    pub fn feed<T: serde::de::DeserializeOwned>(&mut self, data: &[u8]) -> GateResult<Vec<T>> {
        self.feed_raw(data)?
            .iter()
            .map(|payload| cbor_decode(payload))
            .collect()
    }

    /// Reset internal buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes remaining in the internal buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Probe {
        user: String,
        seq: i64,
    }

    #[test]
    fn several_frames_in_one_read() {
        let msgs = vec![
            Probe { user: "a".into(), seq: 1 },
            Probe { user: "b".into(), seq: 2 },
        ];
        let mut combined = Vec::new();
        for m in &msgs {
            combined.extend(frame_encode(m).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let decoded: Vec<Probe> = decoder.feed(&combined).unwrap();
        assert_eq!(decoded, msgs);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn incremental_feed() {
        let msg = Probe { user: "u1".into(), seq: 99 };
        let frame = frame_encode(&msg).unwrap();
        let mut decoder = FrameDecoder::new();

        for i in 0..frame.len() - 1 {
            let decoded: Vec<Probe> = decoder.feed(&frame[i..i + 1]).unwrap();
            assert!(decoded.is_empty());
        }
        let decoded: Vec<Probe> = decoder.feed(&frame[frame.len() - 1..]).unwrap();
        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let bogus = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(decoder.feed_raw(&bogus).is_err());
    }

    #[test]
    fn partial_frame_stays_pending() {
        let frame = frame_encode(&Probe { user: "x".into(), seq: 0 }).unwrap();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed_raw(&frame[..3]).unwrap().is_empty());
        assert_eq!(decoder.pending(), 3);
        decoder.reset();
        assert_eq!(decoder.pending(), 0);
    }
}
