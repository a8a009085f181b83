//! # atm-core
//!
//! Shared wire protocol for the ATM terminal hub: every message a terminal
//! can send or receive, and the binary codec that frames them.
//!
//! This crate has no I/O, no async runtime and no knowledge of connections.
//! The hub (`atm-hub`) consumes it through the [`Codec`] trait.
//!
//! # Architecture overview
//!
//! - **`protocol::messages`** – The closed set of events.  Requests
//!   (validate card, validate PIN, deposit, withdraw, inquiry) flow from a
//!   terminal to the hub; responses and errors flow back out.
//!
//! - **`protocol::codec`** – How those events travel as bytes.  An 8-byte
//!   envelope header names the event, and the event selects the schema used
//!   for the payload that follows.

pub mod protocol;

pub use protocol::codec::{
    decode_envelope, decode_message, encode_message, BinaryCodec, Codec, CommandEnvelope,
    DecodeError, EncodeError,
};
pub use protocol::messages::{AtmMessage, CommandKind, EventType};
