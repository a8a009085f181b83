//! Binary envelope codec for the ATM terminal protocol.
//!
//! Wire format:
//! ```text
//! [version:1][event:1][reserved:2][payload_len:4][payload:N]
//! ```
//! Total header size: 8 bytes. All multi-byte integers are big-endian.
//!
//! Decoding happens in two stages.  [`decode_envelope`] validates the header
//! and slices out the raw payload; [`CommandEnvelope::into_message`] then
//! applies the payload schema selected by the event tag.  [`decode_message`]
//! runs both stages.

use crate::protocol::messages::{
    AtmMessage, CommandKind, DepositRequest, DepositResponse, ErrorCode, ErrorMessage, EventType,
    InquiryRequest, InquiryResponse, ValidateCardRequest, ValidateCardResponse,
    ValidatePinRequest, ValidatePinResponse, WithdrawRequest, WithdrawResponse, HEADER_SIZE,
    PROTOCOL_VERSION,
};
use thiserror::Error;

/// Errors that can occur while decoding an envelope or its payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte slice is shorter than the envelope header.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The schema version byte is not one this codec understands.
    #[error("unsupported protocol version: 0x{0:02X}")]
    UnsupportedVersion(u8),

    /// The header declares more payload than the frame carries.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The frame carries bytes after the declared payload.
    #[error("{extra} trailing byte(s) after declared payload")]
    TrailingBytes { extra: usize },

    /// The payload does not match the schema of its event tag.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Errors that can occur while encoding a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// A string field exceeds the 16-bit length prefix.
    #[error("field {field} is {len} bytes, the limit is 65535")]
    FieldTooLong { field: &'static str, len: usize },

    /// The payload exceeds the 32-bit length field.
    #[error("payload of {0} bytes does not fit the envelope")]
    PayloadTooLarge(usize),

    /// An `Unknown` message was given a tag that belongs to a known event.
    #[error("event tag 0x{0:02X} is reserved for a known event")]
    ReservedEventTag(u8),
}

// ── Pluggable serializer ──────────────────────────────────────────────────────

/// The serializer seam used by the hub.
///
/// The hub only ever talks to a `Codec`; [`BinaryCodec`] is the production
/// implementation.
pub trait Codec: Send + Sync {
    /// Serializes `msg` into one complete frame.
    fn encode(&self, msg: &AtmMessage) -> Result<Vec<u8>, EncodeError>;

    /// Parses one complete frame.
    fn decode(&self, bytes: &[u8]) -> Result<AtmMessage, DecodeError>;
}

/// The binary envelope format described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn encode(&self, msg: &AtmMessage) -> Result<Vec<u8>, EncodeError> {
        encode_message(msg)
    }

    fn decode(&self, bytes: &[u8]) -> Result<AtmMessage, DecodeError> {
        decode_message(bytes)
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// A frame whose header has been validated but whose payload is still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Event tag from the header.
    pub event: u8,
    /// Raw payload bytes, exactly `payload_len` long.
    pub payload: Vec<u8>,
}

impl CommandEnvelope {
    /// The command kind this envelope would dispatch to.
    pub fn kind(&self) -> CommandKind {
        match EventType::try_from(self.event) {
            Ok(EventType::ValidateCardRequest) => CommandKind::ValidateCard,
            Ok(EventType::ValidatePinRequest) => CommandKind::ValidatePin,
            Ok(EventType::DepositRequest) => CommandKind::Deposit,
            Ok(EventType::WithdrawRequest) => CommandKind::Withdraw,
            Ok(EventType::InquiryRequest) => CommandKind::Inquiry,
            Ok(
                EventType::ValidateCardResponse
                | EventType::ValidatePinResponse
                | EventType::DepositResponse
                | EventType::WithdrawResponse
                | EventType::InquiryResponse
                | EventType::Error,
            ) => CommandKind::Unknown,
            Err(()) => CommandKind::Unknown,
        }
    }

    /// Applies the payload schema selected by the event tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the payload does not match
    /// the schema.  Unknown tags never fail: their payload is kept verbatim.
    pub fn into_message(self) -> Result<AtmMessage, DecodeError> {
        let Ok(event) = EventType::try_from(self.event) else {
            return Ok(AtmMessage::Unknown {
                event: self.event,
                data: self.payload,
            });
        };
        decode_payload(event, &self.payload)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`AtmMessage`] into a complete frame including the 8-byte header.
///
/// # Errors
///
/// Returns [`EncodeError`] for values the wire format cannot represent.
///
/// # Examples
///
/// ```rust
/// use atm_core::protocol::{decode_message, encode_message};
/// use atm_core::protocol::messages::{AtmMessage, InquiryRequest};
///
/// let msg = AtmMessage::InquiryRequest(InquiryRequest { card_number: "4000123412341234".into() });
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &AtmMessage) -> Result<Vec<u8>, EncodeError> {
    if let AtmMessage::Unknown { event, .. } = msg {
        if EventType::try_from(*event).is_ok() {
            return Err(EncodeError::ReservedEventTag(*event));
        }
    }

    let payload = encode_payload(msg)?;
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| EncodeError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.event_tag());
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Validates the header of one frame and returns its raw envelope.
///
/// # Errors
///
/// Returns [`DecodeError`] if the header is truncated, carries an unsupported
/// version, or disagrees with the frame length.
pub fn decode_envelope(bytes: &[u8]) -> Result<CommandEnvelope, DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let event = bytes[1];
    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let available = bytes.len() - HEADER_SIZE;
    if available < payload_len {
        return Err(DecodeError::PayloadLengthMismatch {
            declared: payload_len,
            available,
        });
    }
    if available > payload_len {
        return Err(DecodeError::TrailingBytes {
            extra: available - payload_len,
        });
    }

    Ok(CommandEnvelope {
        event,
        payload: bytes[HEADER_SIZE..].to_vec(),
    })
}

/// Decodes one complete frame into a typed [`AtmMessage`].
///
/// # Errors
///
/// Returns [`DecodeError`] if either the envelope or the payload is malformed.
pub fn decode_message(bytes: &[u8]) -> Result<AtmMessage, DecodeError> {
    decode_envelope(bytes)?.into_message()
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &AtmMessage) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    match msg {
        AtmMessage::ValidateCardRequest(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
        }
        AtmMessage::ValidatePinRequest(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            write_string(&mut buf, "pin", &m.pin)?;
        }
        AtmMessage::DepositRequest(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.extend_from_slice(&m.amount.to_be_bytes());
        }
        AtmMessage::WithdrawRequest(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.extend_from_slice(&m.amount.to_be_bytes());
        }
        AtmMessage::InquiryRequest(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
        }
        AtmMessage::ValidateCardResponse(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.push(u8::from(m.valid));
        }
        AtmMessage::ValidatePinResponse(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.push(u8::from(m.valid));
        }
        AtmMessage::DepositResponse(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.push(u8::from(m.accepted));
            buf.extend_from_slice(&m.balance.to_be_bytes());
        }
        AtmMessage::WithdrawResponse(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.push(u8::from(m.accepted));
            buf.extend_from_slice(&m.balance.to_be_bytes());
        }
        AtmMessage::InquiryResponse(m) => {
            write_string(&mut buf, "card_number", &m.card_number)?;
            buf.extend_from_slice(&m.balance.to_be_bytes());
        }
        AtmMessage::Error(m) => {
            buf.push(m.code as u8);
            write_string(&mut buf, "description", &m.description)?;
        }
        AtmMessage::Unknown { data, .. } => buf.extend_from_slice(data),
    }
    Ok(buf)
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(event: EventType, payload: &[u8]) -> Result<AtmMessage, DecodeError> {
    let mut r = PayloadReader::new(payload, event);
    let msg = match event {
        EventType::ValidateCardRequest => AtmMessage::ValidateCardRequest(ValidateCardRequest {
            card_number: r.string()?,
        }),
        EventType::ValidatePinRequest => AtmMessage::ValidatePinRequest(ValidatePinRequest {
            card_number: r.string()?,
            pin: r.string()?,
        }),
        EventType::DepositRequest => AtmMessage::DepositRequest(DepositRequest {
            card_number: r.string()?,
            amount: r.u64()?,
        }),
        EventType::WithdrawRequest => AtmMessage::WithdrawRequest(WithdrawRequest {
            card_number: r.string()?,
            amount: r.u64()?,
        }),
        EventType::InquiryRequest => AtmMessage::InquiryRequest(InquiryRequest {
            card_number: r.string()?,
        }),
        EventType::ValidateCardResponse => {
            AtmMessage::ValidateCardResponse(ValidateCardResponse {
                card_number: r.string()?,
                valid: r.bool()?,
            })
        }
        EventType::ValidatePinResponse => AtmMessage::ValidatePinResponse(ValidatePinResponse {
            card_number: r.string()?,
            valid: r.bool()?,
        }),
        EventType::DepositResponse => AtmMessage::DepositResponse(DepositResponse {
            card_number: r.string()?,
            accepted: r.bool()?,
            balance: r.i64()?,
        }),
        EventType::WithdrawResponse => AtmMessage::WithdrawResponse(WithdrawResponse {
            card_number: r.string()?,
            accepted: r.bool()?,
            balance: r.i64()?,
        }),
        EventType::InquiryResponse => AtmMessage::InquiryResponse(InquiryResponse {
            card_number: r.string()?,
            balance: r.i64()?,
        }),
        EventType::Error => {
            let raw = r.u8()?;
            let code = ErrorCode::try_from(raw).map_err(|_| {
                DecodeError::MalformedPayload(format!("unknown error code: 0x{raw:02X}"))
            })?;
            AtmMessage::Error(ErrorMessage {
                code,
                description: r.string()?,
            })
        }
    };
    r.finish()?;
    Ok(msg)
}

// ── Utility helpers ───────────────────────────────────────────────────────────

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_string(buf: &mut Vec<u8>, field: &'static str, s: &str) -> Result<(), EncodeError> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| EncodeError::FieldTooLong {
        field,
        len: bytes.len(),
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Sequential reader over one payload.  Every read is bounds-checked.
struct PayloadReader<'a> {
    buf: &'a [u8],
    off: usize,
    event: EventType,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8], event: EventType) -> Self {
        Self { buf, off: 0, event }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let buf = self.buf;
        if buf.len() - self.off < n {
            return Err(DecodeError::MalformedPayload(format!(
                "{:?}: need {n} bytes at offset {}, got {}",
                self.event,
                self.off,
                buf.len() - self.off
            )));
        }
        let slice = &buf[self.off..self.off + n];
        self.off += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0x00 => Ok(false),
            0x01 => Ok(true),
            other => Err(DecodeError::MalformedPayload(format!(
                "{:?}: invalid boolean byte 0x{other:02X}",
                self.event
            ))),
        }
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    /// Reads a 2-byte length prefix and then that many UTF-8 bytes.
    fn string(&mut self) -> Result<String, DecodeError> {
        let len_bytes = self.take(2)?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| DecodeError::MalformedPayload(format!("{:?}: invalid UTF-8: {e}", self.event)))
    }

    fn finish(self) -> Result<(), DecodeError> {
        let left = self.buf.len() - self.off;
        if left != 0 {
            return Err(DecodeError::MalformedPayload(format!(
                "{:?}: {left} unread byte(s) after payload",
                self.event
            )));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
