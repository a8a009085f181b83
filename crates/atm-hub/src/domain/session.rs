//! Session identity and per-connection lifecycle state.

use std::fmt;

use uuid::Uuid;

/// Opaque identifier for one live terminal session.
///
/// Identifiers are minted by the transport when a connection opens and are
/// never reused once that connection terminates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a fresh, globally unique identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one connection.
///
/// ```text
/// Open ──(message)*──► Closed
///   └────────────────► Errored
/// ```
///
/// Both terminal states are final; nothing transitions back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Open)
    }
}

/// Close status reported by the transport, mirroring an RFC 6455 close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: u16,
    pub reason: String,
}

impl CloseStatus {
    /// 1000: normal closure.
    pub const NORMAL: u16 = 1000;
    /// 1005: a close frame arrived without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// 1006: the connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Status used when the peer vanished without a closing handshake.
    pub fn abnormal() -> Self {
        Self::new(Self::ABNORMAL, "connection dropped without close frame")
    }

    /// Status used when a close frame carried no payload.
    pub fn no_status() -> Self {
        Self::new(Self::NO_STATUS, "")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
