//! Hub configuration types.
//!
//! [`HubConfig`] is the single source of truth for runtime settings.  It is
//! built once at startup from defaults, an optional TOML file and CLI flags
//! (see `infrastructure::config_file` and `main.rs`), then shared read-only.

use std::net::SocketAddr;
use std::num::NonZeroUsize;

/// Default WebSocket listener port.
pub const DEFAULT_PORT: u16 = 8025;

/// Default capacity of each business endpoint queue.
pub const DEFAULT_QUEUE_CAPACITY: NonZeroUsize = non_zero(256);

/// Default number of frames a session may have waiting for its socket.
pub const DEFAULT_OUTBOUND_CAPACITY: NonZeroUsize = non_zero(64);

const fn non_zero(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => panic!("capacity must be non-zero"),
    }
}

/// All runtime configuration for the hub.
///
/// # Example
///
/// ```rust
/// use atm_hub::domain::HubConfig;
///
/// let cfg = HubConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8025);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// The address and port the WebSocket server binds to.
    pub bind_addr: SocketAddr,

    /// Capacity of each queue between the hub and the business backend.
    /// A full queue rejects the request instead of stalling the terminal.
    pub endpoint_queue_capacity: NonZeroUsize,

    /// Capacity of each session's outbound frame queue.  A terminal that
    /// stops reading fails further sends once its queue is full.
    pub outbound_queue_capacity: NonZeroUsize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            endpoint_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_queue_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
