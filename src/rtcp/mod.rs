//! RTCP packet inspection
//!
//! Just enough of RFC 3550/3611 to recognize an Extended Report packet in a
//! raw RTCP buffer and decode the blocks the reporting engine cares about.
//! The media engine owns RTCP transport; buffers show up here by reference
//! from its statistics events.

pub mod xr;

pub use xr::{RtcpExtendedReport, VoipMetricsBlock, XrBlock, XrBlockType};

/// RTP/RTCP protocol version
pub const RTP_VERSION: u8 = 2;

/// RTCP packet type for Extended Reports (RFC 3611)
pub const RTCP_PT_XR: u8 = 207;

/// Check whether a raw RTCP packet is an Extended Report.
///
/// A mismatch is not an error condition: callers simply skip the buffer and
/// wait for the next statistics event.
pub fn is_xr_packet(data: &[u8]) -> bool {
    data.len() >= 4 && (data[0] >> 6) == RTP_VERSION && data[1] == RTCP_PT_XR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_xr_packet() {
        // Version 2, PT 207
        assert!(is_xr_packet(&[0x80, 207, 0, 0]));

        // Wrong version
        assert!(!is_xr_packet(&[0x40, 207, 0, 0]));

        // Receiver report, not XR
        assert!(!is_xr_packet(&[0x80, 201, 0, 0]));

        // Too short to carry a header
        assert!(!is_xr_packet(&[0x80, 207]));
        assert!(!is_xr_packet(&[]));
    }
}
