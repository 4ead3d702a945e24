//! Centralized timing policy for the heartbeat core.
//!
//! Keeping the knobs in one place makes it obvious which behaviours share a
//! window: the tick interval doubles as both the piggyback-elision horizon
//! and the outer per-send abandonment deadline.

use std::time::Duration;

/// Nominal spacing between dispatch cycles; also the elision window.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(150);
/// Transport-enforced deadline for a single batched heartbeat RPC.
pub const DEFAULT_HEARTBEAT_RPC_TIMEOUT: Duration = Duration::from_secs(3);
/// Heartbeat payloads below this size are sent uncompressed.
pub const HEARTBEAT_MIN_COMPRESSION_BYTES: usize = 512;
