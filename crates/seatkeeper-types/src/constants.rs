//! System-wide constants for the Seatkeeper escrow kernel.

/// Default capacity of an instance's facet mailbox (bounded channel).
pub const DEFAULT_FACET_MAILBOX_CAPACITY: usize = 256;

/// Default starting time of a freshly built manual timer.
pub const DEFAULT_MANUAL_TIMER_START: u64 = 0;

/// Default prefix for board identifiers.
pub const DEFAULT_BOARD_PREFIX: &str = "board";

/// Default tracing filter used by the demo binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Number of checksum digits appended to every board id.
pub const BOARD_CHECKSUM_DIGITS: usize = 2;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Seatkeeper";
