//! Session report aggregation
//!
//! One [`SessionReport`] per call per active stream kind, owned by the call's
//! [`CallQualityTracker`] and updated in place as lifecycle events arrive:
//! identity once signaling knows it, addresses at call start and after route
//! changes, codec and timestamps at termination, metrics whenever RTCP-XR
//! blocks pass by. The tracker drops with the call log; reports never outlive
//! it.

use tracing::{debug, warn};

use crate::call::{CallDirection, CallSnapshot, StreamKind};
use crate::metrics::MetricsSnapshot;
use crate::rtcp::{self, RtcpExtendedReport};
use crate::RtpSsrc;

/// Which RTCP stream carried an XR block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcpDirection {
    /// RTCP generated by this endpoint: the block describes what we receive,
    /// so it feeds the local metrics
    Sent,

    /// RTCP received from the far end: the block describes what the remote
    /// side receives, so it feeds the remote metrics
    Received,
}

/// One endpoint of the reported RTP stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointAddr {
    pub ip: String,
    pub port: u16,
    pub ssrc: RtpSsrc,
}

/// Session identification fields of a report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportIdentity {
    pub call_id: String,
    pub local_id: String,
    pub remote_id: String,

    /// Copy of whichever of local/remote initiated the call
    pub orig_id: String,

    pub local_group: Option<String>,
    pub remote_group: Option<String>,

    pub local_addr: EndpointAddr,
    pub remote_addr: EndpointAddr,

    pub local_mac_addr: Option<String>,
    pub remote_mac_addr: Option<String>,
}

/// Quality report for one media stream of one call
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub kind: StreamKind,
    pub info: ReportIdentity,
    pub dialog_id: Option<String>,
    pub local_metrics: MetricsSnapshot,
    pub remote_metrics: MetricsSnapshot,
}

impl SessionReport {
    /// Create a report with every field unset.
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            info: ReportIdentity::default(),
            dialog_id: None,
            local_metrics: MetricsSnapshot::new(),
            remote_metrics: MetricsSnapshot::new(),
        }
    }
}

/// Per-call report aggregator
///
/// Owns the audio report and, when video was negotiated at call setup, the
/// video report. All updates are no-ops while reporting is disabled for the
/// call's destination.
#[derive(Debug, Clone, PartialEq)]
pub struct CallQualityTracker {
    reports: [Option<SessionReport>; StreamKind::COUNT],
}

impl CallQualityTracker {
    /// Create the per-stream reports for a newly established call.
    pub fn new(call: &CallSnapshot) -> Self {
        let mut reports = [None, None];
        if call.reporting_enabled() {
            reports[StreamKind::Audio.index()] = Some(SessionReport::new(StreamKind::Audio));
            if call.video_enabled {
                reports[StreamKind::Video.index()] = Some(SessionReport::new(StreamKind::Video));
            }
        }
        Self { reports }
    }

    /// The report for a stream kind, if one is active for this call
    pub fn report(&self, kind: StreamKind) -> Option<&SessionReport> {
        self.reports[kind.index()].as_ref()
    }

    fn report_mut(&mut self, kind: StreamKind) -> Option<&mut SessionReport> {
        self.reports[kind.index()].as_mut()
    }

    /// Derive identity fields from the call.
    ///
    /// Incoming call: remote is the caller (from), local the callee (to) and
    /// the originator is the remote side. Outgoing calls invert the roles.
    /// Values change as signaling progresses (the dialog id in particular),
    /// so this runs again at call end.
    pub fn update_identity(&mut self, call: &CallSnapshot) {
        if !call.reporting_enabled() {
            return;
        }

        let (local_id, remote_id) = match call.direction {
            CallDirection::Incoming => (call.to.clone(), call.from.clone()),
            CallDirection::Outgoing => (call.from.clone(), call.to.clone()),
        };
        let orig_id = match call.direction {
            CallDirection::Incoming => remote_id.clone(),
            CallDirection::Outgoing => local_id.clone(),
        };

        for report in self.reports.iter_mut().flatten() {
            report.info.call_id = call.call_id.clone();
            report.info.local_id = local_id.clone();
            report.info.remote_id = remote_id.clone();
            report.info.orig_id = orig_id.clone();
            report.info.local_group = group_tag(&call.user_agent, &call.call_id);
            report.info.remote_group = call
                .remote_user_agent
                .as_deref()
                .and_then(|ua| group_tag(ua, &call.call_id));
            report.dialog_id = call.dialog_id.clone();
        }
    }

    /// Copy current negotiated RTP addresses into the reports.
    ///
    /// Runs at call start, when the remote address may still be the proxy one,
    /// and again when a direct route is found (ICE completion). Local info is
    /// always accurate; a remote stream without an address falls back to the
    /// session-level remote address.
    pub fn update_addresses(&mut self, call: &CallSnapshot) {
        if !call.reporting_enabled() {
            return;
        }

        self.update_stream_addresses(call, StreamKind::Audio);
        if call.video_enabled {
            self.update_stream_addresses(call, StreamKind::Video);
        }
    }

    fn update_stream_addresses(&mut self, call: &CallSnapshot, kind: StreamKind) {
        let local = call.local_stream(kind).cloned();
        let remote = call.remote_stream(kind).cloned();
        let Some(report) = self.report_mut(kind) else {
            return;
        };

        if let Some(local) = local {
            report.info.local_addr.ip = local.rtp_addr;
            report.info.local_addr.port = local.rtp_port;
        }

        match remote {
            Some(remote) => {
                // The port is always present in the stream description
                report.info.remote_addr.port = remote.rtp_port;
                if !remote.rtp_addr.is_empty() {
                    report.info.remote_addr.ip = remote.rtp_addr;
                } else if let Some(addr) = &call.remote_session_addr {
                    report.info.remote_addr.ip = addr.clone();
                }
            }
            None => {
                warn!(
                    "could not find the remote {:?} stream description for call {}",
                    kind, call.call_id
                );
            }
        }
    }

    /// Record session timestamps, the negotiated codec and the RTP SSRCs.
    ///
    /// Runs at call termination. Both directions get the same wall-clock
    /// window and the same codec snapshot; asymmetric codec negotiation is
    /// not distinguished.
    pub fn update_codec_and_timestamps(&mut self, call: &CallSnapshot, kind: StreamKind) {
        if !call.reporting_enabled() {
            return;
        }

        let codec = call.codec(kind).cloned();
        let ssrc = call.ssrc(kind);
        let start = (call.start_time > 0).then_some(call.start_time);
        let stop = start.map(|s| s + call.duration_secs);

        let Some(report) = self.report_mut(kind) else {
            return;
        };

        for metrics in [&mut report.local_metrics, &mut report.remote_metrics] {
            metrics.timestamps.start = start;
            metrics.timestamps.stop = stop;

            if let Some(codec) = &codec {
                metrics.session_description.payload_type = Some(codec.payload_type);
                metrics.session_description.payload_desc = Some(codec.mime_type.clone());
                metrics.session_description.sample_rate = Some(codec.clock_rate);
                metrics.session_description.fmtp = codec.fmtp.clone();
            }
        }

        if let Some(ssrc) = ssrc {
            report.info.local_addr.ssrc = ssrc.send;
            report.info.remote_addr.ssrc = ssrc.recv;
        }
    }

    /// Decode an RTCP buffer and merge any VoIP metrics block it carries.
    ///
    /// Non-XR buffers and XR packets without a VoIP metrics block leave the
    /// snapshots untouched; this runs on every RTCP statistics event.
    pub fn ingest_xr(
        &mut self,
        call: &CallSnapshot,
        kind: StreamKind,
        direction: RtcpDirection,
        packet: &[u8],
    ) {
        if !call.reporting_enabled() {
            return;
        }
        if !rtcp::is_xr_packet(packet) {
            return;
        }

        let xr = match RtcpExtendedReport::parse(packet) {
            Ok(xr) => xr,
            Err(e) => {
                debug!("discarding undecodable XR packet for call {}: {}", call.call_id, e);
                return;
            }
        };

        let Some(report) = self.report_mut(kind) else {
            return;
        };
        let metrics = match direction {
            RtcpDirection::Sent => &mut report.local_metrics,
            RtcpDirection::Received => &mut report.remote_metrics,
        };
        if let Some(block) = xr.voip_metrics() {
            metrics.apply_voip_metrics(block);
        }
    }
}

fn group_tag(user_agent: &str, call_id: &str) -> Option<String> {
    if user_agent.is_empty() {
        None
    } else {
        Some(format!("{}-{}", user_agent, call_id))
    }
}
