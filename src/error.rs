//! Error handling for the reporting engine
//!
//! Failures here never escape the reporting path: decode problems mean a
//! metrics update is skipped, render problems abort a single publish.

use thiserror::Error;

/// Result type alias for reporting operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for RTCP-XR decoding and report rendering
#[derive(Error, Debug)]
pub enum Error {
    /// Not enough bytes to decode a wire structure
    #[error("Buffer too small: need {required} bytes, got {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// Malformed RTCP packet
    #[error("Invalid RTCP packet: {0}")]
    InvalidPacket(String),

    /// Report body kept overflowing the render buffer past the growth cap
    #[error("Report body exceeded the buffer growth limit at {limit} bytes")]
    ReportTooLarge { limit: usize },

    /// A formatting trait implementation failed for a reason other than capacity
    #[error("Report formatting failed")]
    Format,
}
