//! Report publication
//!
//! Decides whether and where a terminated call's reports go: resolves the
//! configured collector address, renders each active stream report and hands
//! the bodies to the signaling transport as `vq-rtcpxr` PUBLISH content.
//! Fire-and-forget; nothing here may affect call signaling or media flow.

use tracing::{debug, warn};

use crate::call::{CallSnapshot, StreamKind};
use crate::render;
use crate::report::{CallQualityTracker, SessionReport};

/// Content type of the report body
pub const VQ_RTCPXR_CONTENT_TYPE: &str = "application/vq-rtcpxr";

/// SIP event package the report is published under
pub const VQ_RTCPXR_EVENT: &str = "vq-rtcpxr";

/// Collector address resolved from the destination configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorAddress {
    /// URI scheme, `sip` or `sips`
    pub scheme: String,

    /// Host part, possibly with a user component
    pub host: String,

    /// Explicit port, when configured
    pub port: Option<u16>,
}

impl CollectorAddress {
    /// Parse a raw collector address string, e.g. `sip:collector.example.org:5060`.
    ///
    /// A missing scheme defaults to `sip`; URI parameters are dropped.
    /// Returns `None` for strings no PUBLISH request can be addressed to.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let (scheme, rest) = match raw.split_once(':') {
            Some((s, rest))
                if s.eq_ignore_ascii_case("sip") || s.eq_ignore_ascii_case("sips") =>
            {
                (s.to_ascii_lowercase(), rest)
            }
            _ => ("sip".to_string(), raw),
        };

        let rest = rest.split(';').next().unwrap_or("");
        let (host, port) = match rest.rsplit_once(':') {
            Some((h, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
                match p.parse::<u16>() {
                    Ok(port) => (h, Some(port)),
                    Err(_) => return None,
                }
            }
            _ => (rest, None),
        };

        if host.is_empty() {
            return None;
        }
        Some(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}

/// Signaling-plane seam: delivers a rendered report as a PUBLISH body.
///
/// The transaction layer behind this may be asynchronous; from the reporting
/// engine's perspective submission is fire-and-forget and infallible.
pub trait SignalingTransport {
    fn publish(
        &mut self,
        collector: &CollectorAddress,
        event: &str,
        content_type: &str,
        body: String,
    );
}

/// Publishes a call's session reports through a [`SignalingTransport`]
pub struct ReportPublisher<T> {
    transport: T,
}

impl<T: SignalingTransport> ReportPublisher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Render and submit every active report for a terminated call.
    ///
    /// No-op when reporting is disabled for the call. A missing or unusable
    /// collector address is static misconfiguration: logged once, nothing
    /// submitted, no retry. A report that fails to render is skipped on its
    /// own; the other stream's report still goes out.
    pub fn publish_if_enabled(&mut self, call: &CallSnapshot, tracker: &CallQualityTracker) {
        if !call.reporting_enabled() {
            return;
        }

        let configured = call
            .destination
            .as_ref()
            .and_then(|d| d.statistics_collector.as_deref());
        let collector = match configured.and_then(CollectorAddress::parse) {
            Some(collector) => collector,
            None => {
                warn!(
                    "asked to submit quality statistics for call {} but no collector address is configured",
                    call.call_id
                );
                return;
            }
        };

        if let Some(report) = tracker.report(StreamKind::Audio) {
            self.publish_one(&collector, report);
        }
        if call.video_enabled {
            if let Some(report) = tracker.report(StreamKind::Video) {
                self.publish_one(&collector, report);
            }
        }
    }

    fn publish_one(&mut self, collector: &CollectorAddress, report: &SessionReport) {
        match render::render(report) {
            Ok(body) => {
                debug!(
                    "submitting {:?} VQ session report for call {} ({} bytes)",
                    report.kind,
                    report.info.call_id,
                    body.len()
                );
                self.transport
                    .publish(collector, VQ_RTCPXR_EVENT, VQ_RTCPXR_CONTENT_TYPE, body);
            }
            Err(e) => {
                warn!(
                    "failed to render {:?} VQ session report for call {}: {}",
                    report.kind, report.info.call_id, e
                );
            }
        }
    }
}
