//! Wire protocol: length-prefixed frames carrying JSON messages.

mod frame;
mod message;

pub use frame::{
    encode_frame, read_frame, write_frame, DecodeState, FrameDecoder, HEADER_LEN,
};
pub use message::{ClientMessage, ServerMessage};
