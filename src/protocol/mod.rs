//! Wire protocol for both relay transports
//!
//! - Producer side: newline-delimited JSON telemetry over a byte stream
//!   ([`frame`], [`decoder`])
//! - Subscriber side: one WebSocket text message per delivery ([`message`])

pub mod decoder;
pub mod frame;
pub mod message;

pub use decoder::FrameDecoder;
pub use frame::{decode, encode, Decoded, DEFAULT_MAX_FRAME_SIZE};
pub use message::{encode_delivery, StatusMessage};
