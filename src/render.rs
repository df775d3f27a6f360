//! RFC 6035 report body rendering
//!
//! Turns a [`SessionReport`] into the line-oriented `application/vq-rtcpxr`
//! text body. Two rules dominate: a field is only ever emitted when its value
//! lies inside its documented valid range, and the output buffer grows in
//! fixed steps under an explicit retry loop with a hard cycle cap, so a
//! degenerate format request can never grow it without bound.

use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::Error;
use crate::metrics::MetricsSnapshot;
use crate::report::SessionReport;
use crate::Result;

/// Initial report buffer capacity in bytes
pub const INITIAL_CAPACITY: usize = 2048;

/// Fixed increment added on each growth cycle
const GROW_STEP: usize = 2048;

/// Hard cap on growth cycles for a single append
const MAX_GROW_CYCLES: usize = 16;

/// Formats into a fixed byte slice, flagging overflow instead of growing.
struct SliceWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
    overflow: bool,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.overflow || bytes.len() > self.buf.len() - self.written {
            // Never write a partial chunk: the caller retries this append
            // from its starting offset after growing the buffer.
            self.overflow = true;
            return Err(fmt::Error);
        }
        self.buf[self.written..self.written + bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();
        Ok(())
    }
}

/// Growable output buffer for one render call.
///
/// Appends format into the remaining capacity; when that overflows, the
/// buffer grows by [`GROW_STEP`] and the same append retries from the same
/// offset, at most [`MAX_GROW_CYCLES`] times. Bytes written by earlier
/// appends are never moved relative to each other, duplicated or dropped.
struct ReportBuffer {
    buf: Vec<u8>,
    offset: usize,
}

impl ReportBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            offset: 0,
        }
    }

    fn append<F>(&mut self, write: F) -> Result<()>
    where
        F: Fn(&mut SliceWriter<'_>) -> fmt::Result,
    {
        let start = self.offset;
        for _ in 0..=MAX_GROW_CYCLES {
            let mut writer = SliceWriter {
                buf: &mut self.buf[start..],
                written: 0,
                overflow: false,
            };
            match write(&mut writer) {
                Ok(()) => {
                    self.offset = start + writer.written;
                    return Ok(());
                }
                Err(fmt::Error) if writer.overflow => {
                    let new_size = self.buf.len() + GROW_STEP;
                    warn!(
                        "report buffer too small, growing from {} to {} bytes",
                        self.buf.len(),
                        new_size
                    );
                    self.buf.resize(new_size, 0);
                }
                Err(fmt::Error) => return Err(Error::Format),
            }
        }
        Err(Error::ReportTooLarge {
            limit: self.buf.len(),
        })
    }

    fn into_string(mut self) -> String {
        self.buf.truncate(self.offset);
        // Only complete str chunks are ever written, so this cannot lose data
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

macro_rules! append {
    ($buf:expr, $($arg:tt)*) => {
        $buf.append(|w| { use std::fmt::Write; write!(w, $($arg)*) })
    };
}

macro_rules! append_if_some {
    ($buf:expr, $fmt:literal, $opt:expr) => {
        if let Some(v) = $opt {
            append!($buf, $fmt, v)?;
        }
    };
}

macro_rules! append_if_in_range {
    ($buf:expr, $fmt:literal, $opt:expr, $inf:expr, $sup:expr) => {
        if let Some(v) = $opt {
            if ($inf..=$sup).contains(&v) {
                append!($buf, $fmt, v)?;
            }
        }
    };
}

/// Render a session report into the `application/vq-rtcpxr` body.
pub fn render(report: &SessionReport) -> Result<String> {
    render_with_capacity(report, INITIAL_CAPACITY)
}

/// Render with an explicit initial buffer capacity.
///
/// Output is identical whatever the starting capacity; an undersized buffer
/// only costs growth cycles.
pub fn render_with_capacity(report: &SessionReport, capacity: usize) -> Result<String> {
    let mut buf = ReportBuffer::with_capacity(capacity);

    append!(buf, "VQSessionReport: CallTerm\r\n")?;
    append!(buf, "CallID: {}\r\n", report.info.call_id)?;
    append!(buf, "LocalID: {}\r\n", report.info.local_id)?;
    append!(buf, "RemoteID: {}\r\n", report.info.remote_id)?;
    append!(buf, "OrigID: {}\r\n", report.info.orig_id)?;
    append_if_some!(buf, "LocalGroup: {}\r\n", report.info.local_group.as_deref());
    append_if_some!(buf, "RemoteGroup: {}\r\n", report.info.remote_group.as_deref());
    append!(
        buf,
        "LocalAddr: IP={} PORT={} SSRC={}\r\n",
        report.info.local_addr.ip,
        report.info.local_addr.port,
        report.info.local_addr.ssrc
    )?;
    append_if_some!(buf, "LocalMAC: {}\r\n", report.info.local_mac_addr.as_deref());
    append!(
        buf,
        "RemoteAddr: IP={} PORT={} SSRC={}\r\n",
        report.info.remote_addr.ip,
        report.info.remote_addr.port,
        report.info.remote_addr.ssrc
    )?;
    append_if_some!(buf, "RemoteMAC: {}\r\n", report.info.remote_mac_addr.as_deref());

    append!(buf, "LocalMetrics:\r\n")?;
    append_metrics(&mut buf, &report.local_metrics)?;
    append!(buf, "RemoteMetrics:\r\n")?;
    append_metrics(&mut buf, &report.remote_metrics)?;
    append_if_some!(buf, "DialogID: {}\r\n", report.dialog_id.as_deref());

    Ok(buf.into_string())
}

fn append_metrics(buf: &mut ReportBuffer, metrics: &MetricsSnapshot) -> Result<()> {
    let start = metrics.timestamps.start.filter(|t| *t > 0).and_then(rfc3339);
    let stop = metrics.timestamps.stop.filter(|t| *t > 0).and_then(rfc3339);
    let nlr = metrics
        .packet_loss
        .network_packet_loss_rate
        .map(|v| one_decimal(v as f32 / 256.0));
    let jdr = metrics
        .packet_loss
        .jitter_buffer_discard_rate
        .map(|v| one_decimal(v as f32 / 256.0));
    let moslq = metrics
        .quality_estimates
        .moslq
        .filter(|v| (1.0..=5.0).contains(v))
        .map(one_decimal);
    let moscq = metrics
        .quality_estimates
        .moscq
        .filter(|v| (1.0..=5.0).contains(v))
        .map(one_decimal);

    append!(buf, "Timestamps:")?;
    append_if_some!(buf, " START={}", start.as_deref());
    append_if_some!(buf, " STOP={}", stop.as_deref());

    append!(buf, "\r\nSessionDesc:")?;
    append_if_some!(buf, " PT={}", metrics.session_description.payload_type);
    append_if_some!(
        buf,
        " PD={}",
        metrics
            .session_description
            .payload_desc
            .as_deref()
            .filter(|s| !s.is_empty())
    );
    append_if_some!(buf, " SR={}", metrics.session_description.sample_rate);
    append_if_some!(buf, " FD={}", metrics.session_description.frame_duration);
    append_if_some!(
        buf,
        " FMTP=\"{}\"",
        metrics
            .session_description
            .fmtp
            .as_deref()
            .filter(|s| !s.is_empty())
    );
    append_if_in_range!(
        buf,
        " PLC={}",
        metrics.session_description.packet_loss_concealment,
        0,
        3
    );

    append!(buf, "\r\nJitterBuffer:")?;
    append_if_in_range!(buf, " JBA={}", metrics.jitter_buffer.adaptive, 0, 3);
    append_if_some!(buf, " JBN={}", metrics.jitter_buffer.nominal);
    append_if_some!(buf, " JBM={}", metrics.jitter_buffer.max);
    append_if_some!(buf, " JBX={}", metrics.jitter_buffer.abs_max);

    append!(buf, "\r\nPacketLoss:")?;
    append_if_some!(buf, " NLR={}", nlr.as_deref());
    append_if_some!(buf, " JDR={}", jdr.as_deref());

    append!(buf, "\r\nDelay:")?;
    append_if_some!(buf, " RTD={}", metrics.delay.round_trip_delay);
    append_if_some!(buf, " ESD={}", metrics.delay.end_system_delay);
    append_if_some!(buf, " SOWD={}", metrics.delay.symm_one_way_delay);
    append_if_some!(buf, " IAJ={}", metrics.delay.interarrival_jitter);
    append_if_some!(buf, " MAJ={}", metrics.delay.mean_abs_jitter);

    append!(buf, "\r\nSignal:")?;
    append_if_some!(buf, " SL={}", metrics.signal.level);
    append_if_some!(buf, " NL={}", metrics.signal.noise_level);

    append!(buf, "\r\nQualityEst:")?;
    append_if_in_range!(buf, " RLQ={}", metrics.quality_estimates.rlq, 1, 120);
    append_if_in_range!(buf, " RCQ={}", metrics.quality_estimates.rcq, 1, 120);
    append_if_some!(buf, " MOSLQ={}", moslq.as_deref());
    append_if_some!(buf, " MOSCQ={}", moscq.as_deref());
    append!(buf, "\r\n")?;

    Ok(())
}

fn rfc3339(ts: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
}

/// Format a non-negative value with exactly one decimal, rounding half up.
///
/// Built from integer parts so the separator is a `.` whatever the host
/// locale; printf-style float formatting would not guarantee that.
fn one_decimal(value: f32) -> String {
    let rounded = (value * 10.0 + 0.5).floor() / 10.0;
    let floor_part = rounded.floor() as i32;
    let decimal_part = ((rounded - floor_part as f32) * 10.0 + 0.5).floor() as i32;
    format!("{}.{}", floor_part, decimal_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::StreamKind;

    fn sample_report() -> SessionReport {
        let mut report = SessionReport::new(StreamKind::Audio);
        report.info.call_id = "abc123".to_string();
        report.info.local_id = "sip:bob@example.org".to_string();
        report.info.remote_id = "sip:alice@example.org".to_string();
        report.info.orig_id = "sip:alice@example.org".to_string();
        report.info.local_addr.ip = "192.0.2.10".to_string();
        report.info.local_addr.port = 7078;
        report.info.local_addr.ssrc = 0xAAAA;
        report.info.remote_addr.ip = "198.51.100.4".to_string();
        report.info.remote_addr.port = 16384;
        report.info.remote_addr.ssrc = 0xBBBB;
        report
    }

    #[test]
    fn test_header_lines_always_present() {
        let body = render(&SessionReport::new(StreamKind::Audio)).unwrap();
        assert!(body.starts_with("VQSessionReport: CallTerm\r\n"));
        assert!(body.contains("CallID: \r\n"));
        assert!(body.contains("LocalID: \r\n"));
        assert!(body.contains("RemoteID: \r\n"));
        assert!(body.contains("OrigID: \r\n"));
        assert!(body.contains("LocalAddr: IP= PORT=0 SSRC=0\r\n"));
        assert!(body.contains("RemoteAddr: IP= PORT=0 SSRC=0\r\n"));
        assert!(!body.contains("LocalGroup:"));
        assert!(!body.contains("RemoteGroup:"));
        assert!(!body.contains("LocalMAC:"));
        assert!(!body.contains("DialogID:"));
    }

    #[test]
    fn test_empty_metrics_emit_bare_sections() {
        let body = render(&SessionReport::new(StreamKind::Audio)).unwrap();
        assert!(body.contains("LocalMetrics:\r\nTimestamps:\r\nSessionDesc:\r\nJitterBuffer:\r\nPacketLoss:\r\nDelay:\r\nSignal:\r\nQualityEst:\r\n"));
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(one_decimal(128.0 / 256.0), "0.5");
        assert_eq!(one_decimal(0.0 / 256.0), "0.0");
        // 255/256 rounds up to 1.0, not down to 0.9
        assert_eq!(one_decimal(255.0 / 256.0), "1.0");
        assert_eq!(one_decimal(26.0 / 256.0), "0.1");
        assert_eq!(one_decimal(3.7), "3.7");
        assert_eq!(one_decimal(4.0), "4.0");
    }

    #[test]
    fn test_range_gating_and_boundaries() {
        let mut report = sample_report();
        report.local_metrics.quality_estimates.rlq = Some(200); // out of [1,120]
        report.local_metrics.quality_estimates.rcq = Some(120); // boundary
        report.local_metrics.quality_estimates.moslq = Some(3.7);
        report.local_metrics.quality_estimates.moscq = Some(5.5); // out of [1,5]
        report.local_metrics.packet_loss.network_packet_loss_rate = Some(26);
        report.local_metrics.jitter_buffer.adaptive = Some(7); // garbage, out of [0,3]

        let body = render(&report).unwrap();
        assert!(!body.contains("RLQ="));
        assert!(body.contains(" RCQ=120"));
        assert!(body.contains(" MOSLQ=3.7"));
        assert!(!body.contains("MOSCQ="));
        assert!(body.contains(" NLR=0.1"));
        assert!(!body.contains("JBA="));
    }

    #[test]
    fn test_mos_boundary_values_present() {
        let mut report = sample_report();
        report.local_metrics.quality_estimates.moslq = Some(1.0);
        report.local_metrics.quality_estimates.moscq = Some(5.0);

        let body = render(&report).unwrap();
        assert!(body.contains(" MOSLQ=1.0"));
        assert!(body.contains(" MOSCQ=5.0"));
    }

    #[test]
    fn test_timestamps_rfc3339() {
        let mut report = sample_report();
        report.local_metrics.timestamps.start = Some(1_600_000_000);
        report.local_metrics.timestamps.stop = Some(1_600_000_042);
        report.remote_metrics.timestamps.start = Some(0); // unset encoding

        let body = render(&report).unwrap();
        assert!(body.contains("Timestamps: START=2020-09-13T12:26:40Z STOP=2020-09-13T12:27:22Z\r\n"));
        // The remote snapshot keeps its bare section
        assert!(body.contains("RemoteMetrics:\r\nTimestamps:\r\n"));
    }

    #[test]
    fn test_session_desc_fields() {
        let mut report = sample_report();
        report.local_metrics.session_description.payload_type = Some(111);
        report.local_metrics.session_description.payload_desc = Some("opus".to_string());
        report.local_metrics.session_description.sample_rate = Some(48000);
        report.local_metrics.session_description.fmtp = Some("useinbandfec=1".to_string());
        report.local_metrics.session_description.packet_loss_concealment = Some(2);

        let body = render(&report).unwrap();
        assert!(body.contains("SessionDesc: PT=111 PD=opus SR=48000 FMTP=\"useinbandfec=1\" PLC=2\r\n"));
    }

    #[test]
    fn test_dialog_id_line() {
        let mut report = sample_report();
        report.dialog_id = Some("dlg-7;to-tag=abc".to_string());

        let body = render(&report).unwrap();
        assert!(body.ends_with("DialogID: dlg-7;to-tag=abc\r\n"));
    }

    #[test]
    fn test_growth_idempotence() {
        let mut report = sample_report();
        report.dialog_id = Some("x".repeat(4096)); // forces several growth cycles
        report.local_metrics.quality_estimates.moslq = Some(4.2);

        let small = render_with_capacity(&report, 16).unwrap();
        let large = render_with_capacity(&report, 64 * 1024).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_growth_cap_aborts_render() {
        let mut report = sample_report();
        // Larger than the buffer can ever grow within the cycle cap
        report.dialog_id = Some("y".repeat(256 * 1024));

        assert!(matches!(
            render_with_capacity(&report, 16),
            Err(Error::ReportTooLarge { .. })
        ));
    }

    #[test]
    fn test_locale_independent_decimal_separator() {
        // Formatting is built from integers; the separator is always '.'
        let mut report = sample_report();
        report.local_metrics.quality_estimates.moslq = Some(4.0);
        let body = render(&report).unwrap();
        assert!(body.contains(" MOSLQ=4.0"));
        assert!(!body.contains(" MOSLQ=4,0"));
    }
}
