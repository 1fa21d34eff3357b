//! Length-prefixed framing over a byte stream.
//!
//! Frames are `[len: u32 BE][payload]` where the payload is a tagged message
//! from [`crate::message`]. Readers accumulate bytes into a [`BytesMut`] and
//! call [`try_parse_frame`] until it reports that more data is needed.

use crate::error::WireError;
use crate::message::{Message, MAX_FRAME_SIZE};
use bytes::{Buf, BufMut, BytesMut};

/// Frame header size: 4 bytes of big-endian payload length.
pub const HEADER_SIZE: usize = 4;

/// Encode a message into a complete frame ready for the socket.
pub fn encode_frame(message: &Message) -> Result<BytesMut, WireError> {
    let payload = message.encode()?;
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Try to extract one message from the front of the accumulation buffer.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame;
/// consumed bytes are only advanced once a full frame is present. A frame
/// whose declared length exceeds [`MAX_FRAME_SIZE`] is an error, and the
/// caller is expected to close the connection.
pub fn try_parse_frame(buf: &mut BytesMut) -> Result<Option<Message>, WireError> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    if buf.len() < HEADER_SIZE + len {
        return Ok(None);
    }

    buf.advance(HEADER_SIZE);
    let payload = buf.split_to(len);
    Message::decode(&payload).map(Some)
}
