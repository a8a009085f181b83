//! All ATM terminal protocol message types.
//!
//! Requests flow from a terminal to the hub; responses and errors flow from the
//! hub back out to terminals.  Every message shares the same 8-byte envelope
//! header, see [`crate::protocol::codec`] for the byte layout.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol (schema) version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the envelope header in bytes.
pub const HEADER_SIZE: usize = 8;

// ── Event type codes ──────────────────────────────────────────────────────────

/// Every event tag this version of the protocol understands.
///
/// Tags outside this table are still valid frames; they decode to
/// [`AtmMessage::Unknown`] and are never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    // Terminal → hub (0x01–0x3F)
    ValidateCardRequest = 0x01,
    ValidatePinRequest = 0x02,
    DepositRequest = 0x03,
    WithdrawRequest = 0x04,
    InquiryRequest = 0x05,
    // Hub → terminal (0x40–0x7F)
    ValidateCardResponse = 0x41,
    ValidatePinResponse = 0x42,
    DepositResponse = 0x43,
    WithdrawResponse = 0x44,
    InquiryResponse = 0x45,
    Error = 0x7F,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(EventType::ValidateCardRequest),
            0x02 => Ok(EventType::ValidatePinRequest),
            0x03 => Ok(EventType::DepositRequest),
            0x04 => Ok(EventType::WithdrawRequest),
            0x05 => Ok(EventType::InquiryRequest),
            0x41 => Ok(EventType::ValidateCardResponse),
            0x42 => Ok(EventType::ValidatePinResponse),
            0x43 => Ok(EventType::DepositResponse),
            0x44 => Ok(EventType::WithdrawResponse),
            0x45 => Ok(EventType::InquiryResponse),
            0x7F => Ok(EventType::Error),
            _ => Err(()),
        }
    }
}

// ── Command kinds ─────────────────────────────────────────────────────────────

/// The closed set of inbound command kinds a terminal may issue.
///
/// `Unknown` covers every frame the hub does not dispatch: unrecognised tags
/// as well as hub-originated events echoed back by a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    ValidateCard,
    ValidatePin,
    Deposit,
    Withdraw,
    Inquiry,
    Unknown,
}

impl CommandKind {
    /// Upper-case name used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ValidateCard => "VALIDATE_CARD",
            CommandKind::ValidatePin => "VALIDATE_PIN",
            CommandKind::Deposit => "DEPOSIT",
            CommandKind::Withdraw => "WITHDRAW",
            CommandKind::Inquiry => "INQUIRY",
            CommandKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request payloads ──────────────────────────────────────────────────────────

/// VALIDATE_CARD_REQUEST (0x01): a card was inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCardRequest {
    /// Primary account number read from the card.
    pub card_number: String,
}

/// VALIDATE_PIN_REQUEST (0x02): the customer entered a PIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatePinRequest {
    pub card_number: String,
    /// PIN as typed on the keypad.  Never written to logs.
    pub pin: String,
}

/// DEPOSIT_REQUEST (0x03).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub card_number: String,
    /// Amount in minor currency units (cents).
    pub amount: u64,
}

/// WITHDRAW_REQUEST (0x04).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub card_number: String,
    /// Amount in minor currency units (cents).
    pub amount: u64,
}

/// INQUIRY_REQUEST (0x05): balance inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryRequest {
    pub card_number: String,
}

// ── Response payloads ─────────────────────────────────────────────────────────

/// VALIDATE_CARD_RESPONSE (0x41).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateCardResponse {
    pub card_number: String,
    pub valid: bool,
}

/// VALIDATE_PIN_RESPONSE (0x42).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatePinResponse {
    pub card_number: String,
    pub valid: bool,
}

/// DEPOSIT_RESPONSE (0x43).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositResponse {
    pub card_number: String,
    pub accepted: bool,
    /// Balance after the operation, in cents.  May be negative (overdraft).
    pub balance: i64,
}

/// WITHDRAW_RESPONSE (0x44).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub card_number: String,
    pub accepted: bool,
    /// Balance after the operation, in cents.
    pub balance: i64,
}

/// INQUIRY_RESPONSE (0x45).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryResponse {
    pub card_number: String,
    /// Current balance in cents.
    pub balance: i64,
}

/// Error codes carried by [`ErrorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    MalformedEnvelope = 0x01,
    UnsupportedCommand = 0x02,
    BackendUnavailable = 0x03,
    InternalError = 0x04,
}

impl TryFrom<u8> for ErrorCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ErrorCode::MalformedEnvelope),
            0x02 => Ok(ErrorCode::UnsupportedCommand),
            0x03 => Ok(ErrorCode::BackendUnavailable),
            0x04 => Ok(ErrorCode::InternalError),
            _ => Err(()),
        }
    }
}

/// ERROR (0x7F): error notification from the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    /// Operator-facing description; not meant for the customer screen.
    pub description: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Every message that can travel inside an envelope, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtmMessage {
    ValidateCardRequest(ValidateCardRequest),
    ValidatePinRequest(ValidatePinRequest),
    DepositRequest(DepositRequest),
    WithdrawRequest(WithdrawRequest),
    InquiryRequest(InquiryRequest),
    ValidateCardResponse(ValidateCardResponse),
    ValidatePinResponse(ValidatePinResponse),
    DepositResponse(DepositResponse),
    WithdrawResponse(WithdrawResponse),
    InquiryResponse(InquiryResponse),
    Error(ErrorMessage),
    /// A well-formed frame whose event tag this version does not know.
    Unknown { event: u8, data: Vec<u8> },
}

impl AtmMessage {
    /// Returns the raw event tag written into the envelope header.
    pub fn event_tag(&self) -> u8 {
        match self {
            AtmMessage::ValidateCardRequest(_) => EventType::ValidateCardRequest as u8,
            AtmMessage::ValidatePinRequest(_) => EventType::ValidatePinRequest as u8,
            AtmMessage::DepositRequest(_) => EventType::DepositRequest as u8,
            AtmMessage::WithdrawRequest(_) => EventType::WithdrawRequest as u8,
            AtmMessage::InquiryRequest(_) => EventType::InquiryRequest as u8,
            AtmMessage::ValidateCardResponse(_) => EventType::ValidateCardResponse as u8,
            AtmMessage::ValidatePinResponse(_) => EventType::ValidatePinResponse as u8,
            AtmMessage::DepositResponse(_) => EventType::DepositResponse as u8,
            AtmMessage::WithdrawResponse(_) => EventType::WithdrawResponse as u8,
            AtmMessage::InquiryResponse(_) => EventType::InquiryResponse as u8,
            AtmMessage::Error(_) => EventType::Error as u8,
            AtmMessage::Unknown { event, .. } => *event,
        }
    }

    /// Maps this message onto the inbound command set.
    pub fn command_kind(&self) -> CommandKind {
        match self {
            AtmMessage::ValidateCardRequest(_) => CommandKind::ValidateCard,
            AtmMessage::ValidatePinRequest(_) => CommandKind::ValidatePin,
            AtmMessage::DepositRequest(_) => CommandKind::Deposit,
            AtmMessage::WithdrawRequest(_) => CommandKind::Withdraw,
            AtmMessage::InquiryRequest(_) => CommandKind::Inquiry,
            AtmMessage::ValidateCardResponse(_)
            | AtmMessage::ValidatePinResponse(_)
            | AtmMessage::DepositResponse(_)
            | AtmMessage::WithdrawResponse(_)
            | AtmMessage::InquiryResponse(_)
            | AtmMessage::Error(_)
            | AtmMessage::Unknown { .. } => CommandKind::Unknown,
        }
    }

    /// Returns a description of the message that is safe to log.
    ///
    /// Card numbers are masked to their last four digits and PINs are
    /// omitted entirely.
    pub fn summary(&self) -> String {
        match self {
            AtmMessage::ValidateCardRequest(m) => {
                format!("ValidateCardRequest {{ card: {} }}", mask_card(&m.card_number))
            }
            AtmMessage::ValidatePinRequest(m) => {
                format!("ValidatePinRequest {{ card: {} }}", mask_card(&m.card_number))
            }
            AtmMessage::DepositRequest(m) => format!(
                "DepositRequest {{ card: {}, amount: {} }}",
                mask_card(&m.card_number),
                m.amount
            ),
            AtmMessage::WithdrawRequest(m) => format!(
                "WithdrawRequest {{ card: {}, amount: {} }}",
                mask_card(&m.card_number),
                m.amount
            ),
            AtmMessage::InquiryRequest(m) => {
                format!("InquiryRequest {{ card: {} }}", mask_card(&m.card_number))
            }
            AtmMessage::ValidateCardResponse(m) => format!(
                "ValidateCardResponse {{ card: {}, valid: {} }}",
                mask_card(&m.card_number),
                m.valid
            ),
            AtmMessage::ValidatePinResponse(m) => format!(
                "ValidatePinResponse {{ card: {}, valid: {} }}",
                mask_card(&m.card_number),
                m.valid
            ),
            AtmMessage::DepositResponse(m) => format!(
                "DepositResponse {{ card: {}, accepted: {}, balance: {} }}",
                mask_card(&m.card_number),
                m.accepted,
                m.balance
            ),
            AtmMessage::WithdrawResponse(m) => format!(
                "WithdrawResponse {{ card: {}, accepted: {}, balance: {} }}",
                mask_card(&m.card_number),
                m.accepted,
                m.balance
            ),
            AtmMessage::InquiryResponse(m) => format!(
                "InquiryResponse {{ card: {}, balance: {} }}",
                mask_card(&m.card_number),
                m.balance
            ),
            AtmMessage::Error(m) => format!("Error {{ code: {:?} }}", m.code),
            AtmMessage::Unknown { event, data } => {
                format!("Unknown {{ event: 0x{event:02X}, {} bytes }}", data.len())
            }
        }
    }
}

/// Masks all but the last four characters of a card number.
pub fn mask_card(card_number: &str) -> String {
    let chars: Vec<char> = card_number.chars().collect();
    let visible = chars.len().min(4);
    let hidden = chars.len() - visible;
    let mut masked = "*".repeat(hidden);
    masked.extend(&chars[hidden..]);
    masked
}

// ── Tests ─────────────────────────────────────────────────────────────────────
