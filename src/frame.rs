//! Wire framing.
//!
//! Header is a fixed 8 bytes: `type` (1 byte), `flags` (1 byte), 4 reserved
//! bytes, then `size` (u16, big-endian) counting the whole frame including
//! header and end marker. The payload runs from byte 8 to `size - 1`; byte
//! `size - 1` is always the `0xFF` end marker.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Total header length in bytes.
pub const HEADER_SIZE: usize = 8;
/// Sentinel byte terminating every frame.
pub const END_MARKER: u8 = 0xFF;
/// `flags` bit requesting full replay on a `REGISTER_CONSUMERS` frame.
pub const REPLAY_REQUESTED: u8 = 0b0000_0001;

/// The three frame kinds the broker and its clients exchange.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    RegisterConsumers = 1,
    Publish = 2,
    Consume = 3,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(FrameType::RegisterConsumers),
            2 => Ok(FrameType::Publish),
            3 => Ok(FrameType::Consume),
            _ => Err(()),
        }
    }
}

/// An immutable, already-framed record. Constructing one validates the
/// payload fits the 16-bit size field; everything else about a `Frame` is
/// derived from its fields, never stored redundantly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    type_byte: u8,
    flags: u8,
    payload: Bytes,
}

impl Frame {
    fn new(frame_type: FrameType, flags: u8, payload: Bytes) -> Result<Self, FrameError> {
        let total = HEADER_SIZE + payload.len() + 1;
        if total > u16::MAX as usize {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            type_byte: frame_type as u8,
            flags,
            payload,
        })
    }

    /// Build a `REGISTER_CONSUMERS` frame naming the given type identifiers.
    pub fn register_consumers(
        type_identifiers: &[u8],
        replay_requested: bool,
    ) -> Result<Self, FrameError> {
        let flags = if replay_requested { REPLAY_REQUESTED } else { 0 };
        Self::new(
            FrameType::RegisterConsumers,
            flags,
            Bytes::copy_from_slice(type_identifiers),
        )
    }

    /// Build a `PUBLISH` frame. `payload` must already carry the leading
    /// event type identifier byte.
    pub fn publish(payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        Self::new(FrameType::Publish, 0, payload.into())
    }

    /// Build a `CONSUME` frame. `payload` must already carry the leading
    /// event type identifier byte.
    pub fn consume(payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        Self::new(FrameType::Consume, 0, payload.into())
    }

    /// The frame's declared type, or `None` if the type byte is not one of
    /// the three defined values (a malformed frame).
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::try_from(self.type_byte).ok()
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Whether the `REPLAY_REQUESTED` bit is set. Only meaningful on
    /// `REGISTER_CONSUMERS` frames.
    pub fn replay_requested(&self) -> bool {
        self.flags & REPLAY_REQUESTED != 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total on-wire length, including header and end marker.
    pub fn size(&self) -> u16 {
        (HEADER_SIZE + self.payload.len() + 1) as u16
    }

    /// Encode to a contiguous wire buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size() as usize);
        buf.put_u8(self.type_byte);
        buf.put_u8(self.flags);
        buf.put_u32(0); // reserved
        buf.put_u16(self.size());
        buf.extend_from_slice(&self.payload);
        buf.put_u8(END_MARKER);
        buf
    }

    /// Interpret a buffer of exactly `size` bytes, already validated
    /// structurally by [`split_frames`], as a `Frame`.
    fn decode_exact(bytes: Bytes) -> Self {
        let type_byte = bytes[0];
        let flags = bytes[1];
        let payload_len = bytes.len() - HEADER_SIZE - 1;
        let payload = bytes.slice(HEADER_SIZE..HEADER_SIZE + payload_len);
        Self {
            type_byte,
            flags,
            payload,
        }
    }
}

/// Split as many complete frames as possible out of an inbound byte buffer.
///
/// Consumed bytes are removed from `buf`; any trailing partial frame is left
/// in place for the next read. Malformed framing (a zero/garbage size field
/// or a missing end marker) never aborts the scan — it resyncs by advancing
/// one byte and trying again.
pub fn split_frames(buf: &mut BytesMut) -> Vec<Frame> {
    let mut frames = Vec::new();
    loop {
        if buf.len() < HEADER_SIZE {
            break;
        }
        let size = u16::from_be_bytes([buf[6], buf[7]]) as usize;
        if size == 0 {
            buf.advance(1);
            continue;
        }
        if buf.len() < size {
            break;
        }
        if buf[size - 1] != END_MARKER {
            buf.advance(1);
            continue;
        }
        let frame_bytes = buf.split_to(size).freeze();
        frames.push(Frame::decode_exact(frame_bytes));
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_publish_frame() {
        let frame = Frame::publish(Bytes::from_static(&[0x02, 1, 2, 3])).unwrap();
        let encoded = frame.encode();
        let mut buf = BytesMut::from(&encoded[..]);
        let mut frames = split_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        let decoded = frames.remove(0);
        assert_eq!(decoded.frame_type(), Some(FrameType::Publish));
        assert_eq!(decoded.payload(), &[0x02, 1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn register_consumers_carries_replay_flag() {
        let frame = Frame::register_consumers(&[0, 2, 5], true).unwrap();
        assert!(frame.replay_requested());
        assert_eq!(frame.payload(), &[0, 2, 5]);

        let frame = Frame::register_consumers(&[0, 2, 5], false).unwrap();
        assert!(!frame.replay_requested());
    }

    #[test]
    fn splits_concatenated_frames_with_empty_tail() {
        let f1 = Frame::publish(Bytes::from_static(&[0x00, b'A'])).unwrap();
        let f2 = Frame::consume(Bytes::from_static(&[0x02, b'B'])).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&f1.encode());
        buf.extend_from_slice(&f2.encode());

        let frames = split_frames(&mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload(), &[0x00, b'A']);
        assert_eq!(frames[1].payload(), &[0x02, b'B']);
        assert!(buf.is_empty());
    }

    #[test]
    fn stops_on_incomplete_frame_keeping_leftover_tail() {
        let frame = Frame::publish(Bytes::from_static(&[0x00, 1, 2, 3])).unwrap();
        let encoded = frame.encode();
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 2]);
        let frames = split_frames(&mut buf);
        assert!(frames.is_empty());
        assert_eq!(buf.len(), encoded.len() - 2);
    }

    #[test]
    fn resyncs_past_garbage_prefix() {
        let frame = Frame::publish(Bytes::from_static(&[0x00, 9, 9])).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
        buf.extend_from_slice(&frame.encode());

        let frames = split_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &[0x00, 9, 9]);
        assert!(buf.is_empty());
    }

    #[test]
    fn resyncs_past_zero_size_field() {
        // A bogus header claiming size 0, followed by a real frame.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        let frame = Frame::publish(Bytes::from_static(&[0x03, 7])).unwrap();
        buf.extend_from_slice(&frame.encode());

        let frames = split_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &[0x03, 7]);
    }

    #[test]
    fn unknown_type_byte_is_still_framed_but_reports_no_frame_type() {
        let frame = Frame::new(FrameType::Publish, 0, Bytes::new()).unwrap();
        let mut encoded = frame.encode();
        encoded[0] = 0x7F; // not a defined FrameType
        let mut buf = BytesMut::from(&encoded[..]);
        let frames = split_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), None);
    }

    #[test]
    fn rejects_payload_overflowing_size_field() {
        let huge = vec![0u8; u16::MAX as usize];
        let err = Frame::publish(Bytes::from(huge)).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge(u16::MAX as usize));
    }
}
