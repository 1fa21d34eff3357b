//! Wire protocol for ringmine node-to-node and node-to-registry traffic.
//!
//! Every message travels as a length-prefixed frame:
//!
//! ```text
//! [len: u32 BE][tag: u8][body: bincode]
//! ```
//!
//! The one-byte tag identifies the message kind and is also encoded in the
//! body's enum discriminant; [`Message::decode`] verifies the two agree so a
//! corrupted or mismatched frame is rejected rather than misrouted.
//!
//! Decoding is bounded: frames above [`MAX_FRAME_SIZE`] and migration batches
//! above [`MAX_MIGRATE_BATCH`] tasks are refused to keep a misbehaving peer
//! from forcing large allocations.

pub mod error;
pub mod frame;
pub mod message;

pub use error::WireError;
pub use frame::{encode_frame, try_parse_frame, HEADER_SIZE};
pub use message::{Message, MAX_FRAME_SIZE, MAX_MIGRATE_BATCH};
