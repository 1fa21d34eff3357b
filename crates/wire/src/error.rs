//! Wire protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame or message payload exceeds the configured maximum.
    #[error("frame size {size} exceeds maximum of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Payload was empty (a frame must carry at least the kind tag).
    #[error("empty frame payload")]
    EmptyPayload,

    /// Leading tag byte does not name a known message kind.
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    /// Tag byte and decoded message kind disagree.
    #[error("tag {tag:#04x} does not match decoded kind {kind}")]
    TagMismatch { tag: u8, kind: &'static str },

    /// Body failed bincode deserialization.
    #[error("malformed message body: {0}")]
    Decode(String),

    /// Body failed bincode serialization.
    #[error("message encoding failed: {0}")]
    Encode(String),
}
