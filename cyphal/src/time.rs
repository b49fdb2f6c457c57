//! Time abstractions.
//!
//! The core is clock-agnostic: every RX/TX structure is generic over an
//! `embedded_time::Clock` implementation supplied by the caller. This module
//! just fixes the concrete `Duration` representation used for timeouts, since
//! those are compared across clocks and don't need to track any particular
//! one.

use embedded_time::Clock;

/// A point in time on clock `C`.
pub type Timestamp<C> = embedded_time::Instant<C>;

/// A timeout duration, independent of any specific clock's tick rate.
pub type Duration = embedded_time::duration::Milliseconds<u32>;

/// Default reassembly bucket timeout: 1.0 s since the last frame, per the
/// transfer-layer timeout rule.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = embedded_time::duration::Milliseconds(1_000);

/// Returns the current timestamp for a clock, for callers that don't already
/// have one handy.
pub fn now<C: Clock>(clock: &C) -> Result<Timestamp<C>, embedded_time::clock::Error> {
    clock.try_now()
}
