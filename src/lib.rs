//! VQ Session Reporting
//!
//! This crate implements the quality-of-service reporting side of a VoIP call
//! stack as described by RFC 6035: per-call, per-stream transport metrics are
//! collected from RTCP Extended Report VoIP Metrics blocks (RFC 3611),
//! aggregated into a session report, rendered as an `application/vq-rtcpxr`
//! text body and handed to a signaling transport for delivery to a statistics
//! collector via SIP PUBLISH.
//!
//! The crate deliberately owns no sockets and no call state machine. Call and
//! media lifecycle information arrives as snapshots ([`call::CallSnapshot`]),
//! raw RTCP buffers arrive tagged with the direction they travelled in, and
//! the rendered report leaves through the [`publish::SignalingTransport`]
//! seam. Everything in between is synchronous and confined to the caller's
//! event dispatch thread.

pub mod call;
pub mod error;
pub mod metrics;
pub mod publish;
pub mod render;
pub mod report;
pub mod rtcp;

pub use call::{CallDirection, CallSnapshot, DestinationConfig, StreamKind};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
pub use publish::{CollectorAddress, ReportPublisher, SignalingTransport};
pub use report::{CallQualityTracker, RtcpDirection, SessionReport};

/// RTP synchronization source identifier
pub type RtpSsrc = u32;
