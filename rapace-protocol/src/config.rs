//! Configuration knobs (spec §6.7), collected the way the teacher collects
//! its own connection limits (`conformance::protocol::Limits`): a plain
//! struct with a hand-written `Default`.

use std::time::Duration;

use crate::header::HeaderFormat;

/// Tunables shared by client dispatch, server dispatch, and the I/O pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapaceConfig {
    /// Frames with a declared payload larger than this are rejected with
    /// [`crate::error::ProtocolError::LengthOverrun`].
    pub max_frame_payload: u32,
    /// Default per-request timeout, measured from send time.
    pub reply_max_wait: Duration,
    /// Floor of the I/O pump's idle-poll backoff.
    pub io_tick_min: Duration,
    /// Ceiling of the I/O pump's idle-poll backoff.
    pub io_tick_max: Duration,
    /// Outbound buffer size, in bytes, above which new submissions are
    /// refused with *would-block*.
    pub outbound_hwm: usize,
    /// Outbound buffer size, in bytes, below which submissions resume.
    pub outbound_lwm: usize,
    /// Which RPC header encoding (spec.md §4.3 vs §4.4) this connection
    /// uses on the wire. Selected per-connection, not negotiated.
    pub header_format: HeaderFormat,
}

impl Default for RapaceConfig {
    fn default() -> Self {
        RapaceConfig {
            max_frame_payload: 1 << 20,
            reply_max_wait: Duration::from_secs(30),
            io_tick_min: Duration::from_millis(1),
            io_tick_max: Duration::from_millis(250),
            outbound_hwm: 4 << 20,
            outbound_lwm: 1 << 20,
            header_format: HeaderFormat::Long,
        }
    }
}

impl RapaceConfig {
    /// Validates the invariant `io_tick_min <= io_tick_max` and
    /// `outbound_lwm <= outbound_hwm`; both are assumed by the I/O pump's
    /// backoff and backpressure logic.
    pub fn is_valid(&self) -> bool {
        self.io_tick_min <= self.io_tick_max && self.outbound_lwm <= self.outbound_hwm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RapaceConfig::default().is_valid());
    }

    #[test]
    fn default_header_format_is_long() {
        assert_eq!(RapaceConfig::default().header_format, HeaderFormat::Long);
    }

    #[test]
    fn inverted_bounds_are_invalid() {
        let mut cfg = RapaceConfig::default();
        cfg.io_tick_min = Duration::from_secs(1);
        cfg.io_tick_max = Duration::from_millis(1);
        assert!(!cfg.is_valid());
    }
}
