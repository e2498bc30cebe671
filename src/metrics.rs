//! Metric helpers for `courier`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) macros. With
//! the `metrics` feature disabled every helper compiles to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "courier_connections_active";
/// Name of the gauge tracking usernames currently owned by a session.
///
/// A session displaced by a later registration under the same name stops
/// counting at once, so the gauge follows the registry's size.
pub const SESSIONS_REGISTERED: &str = "courier_sessions_registered";
/// Name of the counter tracking frames read or written.
pub const FRAMES_PROCESSED: &str = "courier_frames_processed_total";
/// Name of the counter tracking messages addressed to unknown users.
pub const ROUTE_MISSES: &str = "courier_route_misses_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "courier_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from a client.
    Inbound,
    /// Frames written to a client.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a session taking ownership of a username.
pub fn inc_registered() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_REGISTERED).increment(1.0);
}

/// Record a session losing ownership of a username, by unregistering or
/// by being displaced.
pub fn dec_registered() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_REGISTERED).decrement(1.0);
}

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a message whose recipient was not registered.
pub fn inc_route_misses() {
    #[cfg(feature = "metrics")]
    counter!(ROUTE_MISSES).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}
