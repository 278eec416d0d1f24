//! Wire framing for the shared tunnel channel.
//!
//! Frame layout (`spec.md` §6, big-endian):
//!
//! ```text
//! offset 0: command      u8
//! offset 1: tunnel-id    u8
//! offset 2: length       u16
//! offset 4: payload      length bytes
//! ```

use crate::error::{RtunError, RtunResult};

/// Header size in bytes: command + tunnel-id + u16 length.
pub const HEADER_LEN: usize = 4;
/// Largest payload a single frame can carry (u16 length field).
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// One parsed frame off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub tunnel_id: u8,
    pub payload: Vec<u8>,
}

/// Encode a single frame. Fails if `payload` exceeds the u16 length field.
pub fn emit(command: u8, tunnel_id: u8, payload: &[u8]) -> RtunResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(RtunError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(command);
    frame.push(tunnel_id);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parse a single complete frame from the front of `buf`.
///
/// Returns `None` if `buf` does not yet contain a whole frame. Use
/// [`FrameDecoder`] to drive this incrementally over a byte stream.
pub fn parse(buf: &[u8]) -> RtunResult<Option<(Frame, usize)>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let command = buf[0];
    let tunnel_id = buf[1];
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let total = HEADER_LEN + len;
    if buf.len() < total {
        return Ok(None);
    }
    let payload = buf[HEADER_LEN..total].to_vec();
    Ok(Some((
        Frame {
            command,
            tunnel_id,
            payload,
        },
        total,
    )))
}

/// Streaming frame decoder: accumulates bytes off the channel and yields
/// complete frames in arrival order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed newly read bytes and return every frame that is now complete.
    pub fn feed(&mut self, data: &[u8]) -> RtunResult<Vec<Frame>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            match parse(&self.buffer)? {
                Some((frame, consumed)) => {
                    frames.push(frame);
                    self.buffer.drain(..consumed);
                }
                None => break,
            }
        }

        Ok(frames)
    }

    /// Bytes buffered but not yet forming a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single() {
        let frame = emit(0x04, 0x10, b"hello").unwrap();
        let (parsed, consumed) = parse(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(parsed.command, 0x04);
        assert_eq!(parsed.tunnel_id, 0x10);
        assert_eq!(parsed.payload, b"hello");
    }

    #[test]
    fn round_trip_empty_payload() {
        let frame = emit(0x05, 0x20, &[]).unwrap();
        let (parsed, consumed) = parse(&frame).unwrap().unwrap();
        assert_eq!(consumed, HEADER_LEN);
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn rejects_oversized_payload() {
        let huge = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(emit(0x04, 0, &huge).is_err());
    }

    #[test]
    fn incremental_feed() {
        let frame = emit(0x04, 0x10, b"chunked").unwrap();
        let mut decoder = FrameDecoder::new();

        for i in 0..frame.len() - 1 {
            let decoded = decoder.feed(&frame[i..i + 1]).unwrap();
            assert!(decoded.is_empty());
        }
        let decoded = decoder.feed(&frame[frame.len() - 1..]).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].payload, b"chunked");
    }

    #[test]
    fn multiple_frames_in_one_feed() {
        let mut combined = Vec::new();
        combined.extend(emit(0x04, 1, b"a").unwrap());
        combined.extend(emit(0x04, 2, b"bb").unwrap());
        combined.extend(emit(0x05, 3, &[]).unwrap());

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&combined).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].tunnel_id, 1);
        assert_eq!(frames[1].payload, b"bb");
        assert_eq!(frames[2].command, 0x05);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn pending_bytes() {
        let frame = emit(0x04, 0, b"x").unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame[..3]).unwrap();
        assert_eq!(decoder.pending(), 3);
        decoder.reset();
        assert_eq!(decoder.pending(), 0);
    }
}
