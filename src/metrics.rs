//! Per-direction quality metrics model
//!
//! One [`MetricsSnapshot`] holds everything the report body can say about a
//! single direction (local or remote) of a single media stream. Every field
//! the wire or the call stack may fail to deliver is an explicit `Option`;
//! the sentinel encodings of RFC 3611 ("-1", 127) exist only at the decode
//! boundary, never inside the model.

use crate::rtcp::xr::VoipMetricsBlock;

/// Wire sentinel for "value not available" in one-byte XR fields
const XR_UNAVAILABLE: u8 = 127;

/// Wall-clock bounds of the reported media session, epoch seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

/// Negotiated codec and receiver configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDescription {
    /// RTP payload type number
    pub payload_type: Option<u8>,

    /// Codec description derived from the MIME subtype
    pub payload_desc: Option<String>,

    /// Codec clock rate in Hz
    pub sample_rate: Option<u32>,

    /// Frame duration in milliseconds
    pub frame_duration: Option<u32>,

    /// Negotiated format parameters
    pub fmtp: Option<String>,

    /// Packet loss concealment mode, 0-3
    pub packet_loss_concealment: Option<u8>,
}

/// Receive-side jitter buffer configuration and sizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitterBuffer {
    /// Adaptive mode, 0-3
    pub adaptive: Option<u8>,

    /// Nominal delay in milliseconds
    pub nominal: Option<u16>,

    /// Maximum delay in milliseconds
    pub max: Option<u16>,

    /// Absolute maximum delay in milliseconds
    pub abs_max: Option<u16>,
}

/// Loss and discard rates as fractions scaled by 256
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketLoss {
    pub network_packet_loss_rate: Option<u8>,
    pub jitter_buffer_discard_rate: Option<u8>,
}

/// Delay and jitter measurements in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delay {
    pub round_trip_delay: Option<u16>,
    pub end_system_delay: Option<u16>,
    pub symm_one_way_delay: Option<u16>,
    pub interarrival_jitter: Option<u16>,
    pub mean_abs_jitter: Option<u16>,
}

/// Signal and noise levels in dB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signal {
    pub level: Option<i8>,
    pub noise_level: Option<i8>,
}

/// Quality ratings: R factors (valid 1-120) and MOS scores (valid 1.0-5.0)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityEstimates {
    /// Listening-quality R factor
    pub rlq: Option<u8>,

    /// Conversational-quality R factor
    pub rcq: Option<u8>,

    /// Listening-quality MOS
    pub moslq: Option<f32>,

    /// Conversational-quality MOS
    pub moscq: Option<f32>,
}

/// Decoded receiver configuration from the packed RX config byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxConfig {
    /// Packet loss concealment mode, 0-3
    pub packet_loss_concealment: u8,

    /// Jitter buffer adaptive mode, 0-3
    pub jitter_buffer_adaptive: u8,
}

impl RxConfig {
    /// Unpack the RX config byte: PLC in the top two bits, jitter buffer
    /// adaptive mode in the next two. The packed form stays at the wire
    /// boundary only.
    pub fn unpack(config: u8) -> Self {
        Self {
            packet_loss_concealment: (config >> 6) & 0x3,
            jitter_buffer_adaptive: (config >> 4) & 0x3,
        }
    }
}

/// All quality metrics known for one direction of one media stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub timestamps: Timestamps,
    pub session_description: SessionDescription,
    pub jitter_buffer: JitterBuffer,
    pub packet_loss: PacketLoss,
    pub delay: Delay,
    pub signal: Signal,
    pub quality_estimates: QualityEstimates,
}

impl MetricsSnapshot {
    /// Create a snapshot with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a decoded VoIP metrics block into this snapshot.
    ///
    /// Each arriving block overwrites the same fields, so repeated ingestion
    /// is idempotent. MOS values travel scaled by 10 on the wire; R factor
    /// and MOS use 127 as their unavailable marker.
    pub fn apply_voip_metrics(&mut self, block: &VoipMetricsBlock) {
        self.quality_estimates.rcq = available(block.r_factor);
        self.quality_estimates.moslq = available(block.mos_lq).map(|v| v as f32 / 10.0);
        self.quality_estimates.moscq = available(block.mos_cq).map(|v| v as f32 / 10.0);

        self.jitter_buffer.nominal = Some(block.jb_nominal);
        self.jitter_buffer.max = Some(block.jb_maximum);
        self.jitter_buffer.abs_max = Some(block.jb_abs_max);

        self.packet_loss.network_packet_loss_rate = Some(block.loss_rate);
        self.packet_loss.jitter_buffer_discard_rate = Some(block.discard_rate);

        let rx = RxConfig::unpack(block.rx_config);
        self.session_description.packet_loss_concealment = Some(rx.packet_loss_concealment);
        self.jitter_buffer.adaptive = Some(rx.jitter_buffer_adaptive);
    }
}

fn available(value: u8) -> Option<u8> {
    if value == XR_UNAVAILABLE {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_config_unpack() {
        let rx = RxConfig::unpack(0b1110_0000);
        assert_eq!(rx.packet_loss_concealment, 3);
        assert_eq!(rx.jitter_buffer_adaptive, 2);

        let rx = RxConfig::unpack(0b0001_0000);
        assert_eq!(rx.packet_loss_concealment, 0);
        assert_eq!(rx.jitter_buffer_adaptive, 1);

        assert_eq!(RxConfig::unpack(0), RxConfig::unpack(0b0000_1111));
    }

    #[test]
    fn test_apply_voip_metrics() {
        let mut block = VoipMetricsBlock::new(1);
        block.r_factor = 85;
        block.mos_lq = 41;
        block.mos_cq = 127; // unavailable
        block.loss_rate = 26;
        block.discard_rate = 0;
        block.jb_nominal = 40;
        block.jb_maximum = 120;
        block.jb_abs_max = 240;
        block.rx_config = 0b1001_0000;

        let mut snapshot = MetricsSnapshot::new();
        snapshot.apply_voip_metrics(&block);

        assert_eq!(snapshot.quality_estimates.rcq, Some(85));
        assert_eq!(snapshot.quality_estimates.moslq, Some(4.1));
        assert_eq!(snapshot.quality_estimates.moscq, None);
        assert_eq!(snapshot.packet_loss.network_packet_loss_rate, Some(26));
        assert_eq!(snapshot.packet_loss.jitter_buffer_discard_rate, Some(0));
        assert_eq!(snapshot.jitter_buffer.nominal, Some(40));
        assert_eq!(snapshot.jitter_buffer.adaptive, Some(1));
        assert_eq!(snapshot.session_description.packet_loss_concealment, Some(2));

        // Untouched sections stay unset
        assert_eq!(snapshot.delay, Delay::default());
        assert_eq!(snapshot.signal, Signal::default());
        assert_eq!(snapshot.timestamps, Timestamps::default());
    }

    #[test]
    fn test_reingestion_overwrites() {
        let mut first = VoipMetricsBlock::new(1);
        first.r_factor = 70;
        let mut second = VoipMetricsBlock::new(1);
        second.r_factor = 90;

        let mut snapshot = MetricsSnapshot::new();
        snapshot.apply_voip_metrics(&first);
        snapshot.apply_voip_metrics(&second);

        assert_eq!(snapshot.quality_estimates.rcq, Some(90));
    }
}
