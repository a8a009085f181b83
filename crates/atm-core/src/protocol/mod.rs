//! Protocol module containing message types and the binary envelope codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_envelope, decode_message, encode_message, BinaryCodec, Codec, CommandEnvelope,
    DecodeError, EncodeError,
};
pub use messages::*;
